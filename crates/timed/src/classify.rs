//! Call shape classification.
//!
//! An intercepted call is treated as suspending only when its declaration is
//! suspendable *and* its last argument is a resumption handle. Anything else
//! is synchronous. The check looks at the call site alone and runs before
//! the body does.

use crate::error::{TimedError, TimedResult};
use crate::handle::{BoxedHandle, ResumptionHandle};
use crate::marker::Declaration;
use crate::signature::Signature;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// How an intercepted call will complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallShape {
    /// Completes within the interception frame.
    Synchronous,
    /// May suspend and complete through its trailing resumption handle.
    Suspending,
}

/// One positional argument of an intercepted call.
pub enum Argument<T, E> {
    /// An ordinary value.
    Value(Value),
    /// A handle through which the caller expects the outcome.
    Resumption(BoxedHandle<T, E>),
}

impl<T, E> Argument<T, E> {
    /// An ordinary value argument.
    pub fn value(value: impl Into<Value>) -> Self {
        Argument::Value(value.into())
    }

    /// A resumption handle argument.
    pub fn resumption(handle: impl ResumptionHandle<T, E> + 'static) -> Self {
        Argument::Resumption(Box::new(handle))
    }

    /// Check whether this argument is a resumption handle.
    pub fn is_resumption(&self) -> bool {
        matches!(self, Argument::Resumption(_))
    }
}

impl<T, E> fmt::Debug for Argument<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Argument::Resumption(_) => f.write_str("Resumption(..)"),
        }
    }
}

/// A call captured by the interceptor.
#[derive(Debug)]
pub struct InterceptedCall<T, E> {
    signature: Signature,
    arguments: Vec<Argument<T, E>>,
}

impl<T, E> InterceptedCall<T, E> {
    /// Capture a call.
    pub fn new(signature: impl Into<Signature>, arguments: Vec<Argument<T, E>>) -> Self {
        Self {
            signature: signature.into(),
            arguments,
        }
    }

    /// The called function.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// All arguments in call order, including any trailing handle.
    pub fn arguments(&self) -> &[Argument<T, E>] {
        &self.arguments
    }

    /// Check whether the last argument is a resumption handle.
    pub fn has_trailing_resumption(&self) -> bool {
        self.arguments.last().is_some_and(Argument::is_resumption)
    }

    /// Split into the signature, the leading values and the trailing handle.
    ///
    /// A resumption handle anywhere but last is rejected.
    pub fn into_parts(self) -> TimedResult<(Signature, Vec<Value>, Option<BoxedHandle<T, E>>)> {
        let Self {
            signature,
            mut arguments,
        } = self;

        let trailing = match arguments.pop() {
            Some(Argument::Resumption(handle)) => Some(handle),
            Some(other) => {
                arguments.push(other);
                None
            }
            None => None,
        };

        let mut values = Vec::with_capacity(arguments.len());
        for (position, argument) in arguments.into_iter().enumerate() {
            match argument {
                Argument::Value(value) => values.push(value),
                Argument::Resumption(_) => {
                    return Err(TimedError::ShapeMismatch {
                        signature,
                        reason: format!("resumption handle at position {} is not the last argument", position),
                    })
                }
            }
        }

        Ok((signature, values, trailing))
    }
}

/// Classify a call against its declaration.
pub fn classify<T, E>(declaration: &Declaration, arguments: &[Argument<T, E>]) -> CallShape {
    let trailing_handle = arguments.last().is_some_and(Argument::is_resumption);

    if declaration.is_suspendable() && trailing_handle {
        CallShape::Suspending
    } else {
        CallShape::Synchronous
    }
}
