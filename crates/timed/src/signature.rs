//! Identity of a timed function.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a function together with the type or module that declares it.
///
/// Signatures are what the sink receives next to every measured duration,
/// and what the [`Interceptor`](crate::Interceptor) uses as its registry key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signature {
    /// Declaring type or module path, e.g. `demo::FooController`
    pub declaring_type: String,
    /// Function name without arguments
    pub function: String,
}

impl Signature {
    /// Create a new signature.
    pub fn new(declaring_type: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            function: function.into(),
        }
    }

    /// Parse a `path::to::Type::function` string.
    ///
    /// Everything before the last `::` becomes the declaring type. A bare
    /// function name yields an empty declaring type.
    pub fn parse(path: &str) -> Self {
        match path.rsplit_once("::") {
            Some((owner, function)) => Self::new(owner, function),
            None => Self::new("", path),
        }
    }

    /// The declaring type with any module path stripped.
    pub fn short_type(&self) -> &str {
        self.declaring_type
            .rsplit("::")
            .next()
            .unwrap_or(&self.declaring_type)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.declaring_type.is_empty() {
            write!(f, "{}()", self.function)
        } else {
            write!(f, "{}::{}()", self.declaring_type, self.function)
        }
    }
}

impl From<&str> for Signature {
    fn from(path: &str) -> Self {
        Self::parse(path)
    }
}
