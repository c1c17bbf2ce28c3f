//! The timing marker.
//!
//! A function is timed if and only if it carries the marker. There are two
//! ways to attach it:
//!
//! - Statically, by declaring the function inside [`timed!`](crate::timed).
//!   Whether the synchronous or the suspension-aware wrapper is used follows
//!   from the declaration itself: `fn` or `async fn`.
//! - At registration time, by building a [`Declaration`] with
//!   [`Declaration::timed`] and registering it with an
//!   [`Interceptor`](crate::Interceptor).

use crate::signature::Signature;
use serde::{Deserialize, Serialize};

/// The marker. Carries no data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Timed;

/// How a function is declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclaredShape {
    /// Runs to completion before returning.
    Blocking,
    /// May suspend and finish later through a resumption handle.
    Suspendable,
}

/// A function declaration as seen by the interceptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Declaration {
    pub signature: Signature,
    pub shape: DeclaredShape,
    pub marker: Option<Timed>,
}

impl Declaration {
    /// Declare a blocking function, unmarked.
    pub fn blocking(signature: impl Into<Signature>) -> Self {
        Self {
            signature: signature.into(),
            shape: DeclaredShape::Blocking,
            marker: None,
        }
    }

    /// Declare a suspendable function, unmarked.
    pub fn suspendable(signature: impl Into<Signature>) -> Self {
        Self {
            signature: signature.into(),
            shape: DeclaredShape::Suspendable,
            marker: None,
        }
    }

    /// Attach the marker.
    pub fn timed(mut self) -> Self {
        self.marker = Some(Timed);
        self
    }

    /// Check whether the declaration carries the marker.
    pub fn is_timed(&self) -> bool {
        self.marker.is_some()
    }

    /// Check whether the declaration is suspendable.
    pub fn is_suspendable(&self) -> bool {
        self.shape == DeclaredShape::Suspendable
    }
}

/// Build a [`Signature`](crate::Signature) for a function in the current module.
#[macro_export]
macro_rules! signature {
    ($name:ident) => {
        $crate::Signature::new(module_path!(), stringify!($name))
    };
}

/// Declare functions whose execution time is recorded.
///
/// Plain `fn`s are wrapped with the synchronous wrapper, `async fn`s with the
/// suspension-aware one, so the choice is fixed by the declaration. Free
/// functions are identified by their module path, methods by the name of
/// `Self`. Records go to the process-wide sink
/// ([`global_sink`](crate::global_sink)).
///
/// Generic parameters and `where` clauses are not supported; wrap such
/// functions by hand with [`time_blocking`](crate::time_blocking) or
/// [`TimedFutureExt::timed`](crate::TimedFutureExt::timed).
///
/// Each parameter must be a plain `name: Type`. Binding modes such as
/// `mut n: u32`, destructuring patterns such as `(a, b): (u32, u32)`, and a
/// by-value `self` receiver do not match. Take the parameter by name and
/// rebind it in the body (`let mut n = n;`):
///
/// ```compile_fail
/// timed::timed! {
///     fn countdown(mut n: u32) -> u32 {
///         while n > 0 { n -= 1; }
///         n
///     }
/// }
/// ```
///
/// # Example
///
/// ```rust
/// use timed::timed;
///
/// struct Controller;
///
/// impl Controller {
///     timed! {
///         /// Blocking endpoint.
///         pub fn regular(&self) -> String {
///             "regular function".to_string()
///         }
///     }
///
///     timed! {
///         pub async fn suspending(&self, delay_ms: u64) -> String {
///             tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
///             "suspending function".to_string()
///         }
///     }
/// }
///
/// timed! {
///     fn parse(input: &str) -> Result<u32, std::num::ParseIntError> {
///         let value = input.trim().parse()?;
///         Ok(value)
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// assert_eq!(Controller.regular(), "regular function");
/// assert_eq!(Controller.suspending(1).await, "suspending function");
/// assert_eq!(parse(" 7 "), Ok(7));
/// # }
/// ```
#[macro_export]
macro_rules! timed {
    (
        $(#[$meta:meta])*
        $vis:vis async fn $name:ident(&mut $recv:ident $(, $arg:ident : $ty:ty)* $(,)?) $(-> $ret:ty)? $body:block
    ) => {
        $(#[$meta])*
        $vis async fn $name(&mut $recv $(, $arg: $ty)*) $(-> $ret)? {
            let signature = $crate::Signature::new(::std::any::type_name::<Self>(), stringify!($name));
            $crate::TimedFuture::new(signature, async move {
                let output $(: $ret)? = $body;
                output
            })
            .await
        }
    };
    (
        $(#[$meta:meta])*
        $vis:vis async fn $name:ident(&$recv:ident $(, $arg:ident : $ty:ty)* $(,)?) $(-> $ret:ty)? $body:block
    ) => {
        $(#[$meta])*
        $vis async fn $name(&$recv $(, $arg: $ty)*) $(-> $ret)? {
            let signature = $crate::Signature::new(::std::any::type_name::<Self>(), stringify!($name));
            $crate::TimedFuture::new(signature, async move {
                let output $(: $ret)? = $body;
                output
            })
            .await
        }
    };
    (
        $(#[$meta:meta])*
        $vis:vis async fn $name:ident($($arg:ident : $ty:ty),* $(,)?) $(-> $ret:ty)? $body:block
    ) => {
        $(#[$meta])*
        $vis async fn $name($($arg: $ty),*) $(-> $ret)? {
            $crate::TimedFuture::new($crate::signature!($name), async move {
                let output $(: $ret)? = $body;
                output
            })
            .await
        }
    };
    (
        $(#[$meta:meta])*
        $vis:vis fn $name:ident(&mut $recv:ident $(, $arg:ident : $ty:ty)* $(,)?) $(-> $ret:ty)? $body:block
    ) => {
        $(#[$meta])*
        $vis fn $name(&mut $recv $(, $arg: $ty)*) $(-> $ret)? {
            let signature = $crate::Signature::new(::std::any::type_name::<Self>(), stringify!($name));
            $crate::time_blocking(signature, move || $(-> $ret)? { $body })
        }
    };
    (
        $(#[$meta:meta])*
        $vis:vis fn $name:ident(&$recv:ident $(, $arg:ident : $ty:ty)* $(,)?) $(-> $ret:ty)? $body:block
    ) => {
        $(#[$meta])*
        $vis fn $name(&$recv $(, $arg: $ty)*) $(-> $ret)? {
            let signature = $crate::Signature::new(::std::any::type_name::<Self>(), stringify!($name));
            $crate::time_blocking(signature, move || $(-> $ret)? { $body })
        }
    };
    (
        $(#[$meta:meta])*
        $vis:vis fn $name:ident($($arg:ident : $ty:ty),* $(,)?) $(-> $ret:ty)? $body:block
    ) => {
        $(#[$meta])*
        $vis fn $name($($arg: $ty),*) $(-> $ret)? {
            $crate::time_blocking($crate::signature!($name), move || $(-> $ret)? { $body })
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declaration_marker() {
        let plain = Declaration::blocking("demo::FooController::not_timed");
        assert!(!plain.is_timed());
        assert!(!plain.is_suspendable());

        let marked = Declaration::suspendable("demo::FooService::foo").timed();
        assert!(marked.is_timed());
        assert!(marked.is_suspendable());
        assert_eq!(marked.signature, Signature::new("demo::FooService", "foo"));
    }

    #[test]
    fn test_signature_macro() {
        let sig = crate::signature!(lookup);
        assert_eq!(sig.declaring_type, module_path!());
        assert_eq!(sig.function, "lookup");
    }

    crate::timed! {
        fn countdown(n: u32) -> u32 {
            let mut n = n;
            while n > 3 {
                n -= 1;
            }
            n
        }
    }

    #[test]
    fn test_rebound_parameter() {
        assert_eq!(countdown(10), 3);
    }

    #[test]
    fn test_declaration_serialization() {
        let decl = Declaration::blocking("demo::FooController::regular").timed();
        let json = serde_json::to_string(&decl).unwrap();
        assert!(json.contains("\"shape\":\"blocking\""));

        let parsed: Declaration = serde_json::from_str(&json).unwrap();
        assert_eq!(decl, parsed);
    }
}
