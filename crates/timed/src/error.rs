//! Error types for the timing layer.
//!
//! None of these ever replace the outcome of a timed function. They describe
//! misuse of the instrumentation itself: resuming a handle twice, dispatching
//! to something that was never registered, or a sink that cannot accept a
//! record.

use crate::signature::Signature;
use thiserror::Error;

/// Errors raised by the timing layer.
#[derive(Debug, Error)]
pub enum TimedError {
    /// A proxy resumption handle was resumed after its outcome was delivered
    #[error("resumption handle for {signature} was already resumed")]
    DoubleResumption { signature: Signature },

    /// A plain continuation was resumed more than once
    #[error("continuation was already resumed")]
    AlreadyResumed,

    /// No function is registered under the signature
    #[error("no function registered for {0}")]
    UnknownFunction(Signature),

    /// The intercepted call does not fit the wrapper built for its declaration
    #[error("call to {signature} does not match its declaration: {reason}")]
    ShapeMismatch { signature: Signature, reason: String },

    /// Failed to parse a configuration document
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result type for timing operations.
pub type TimedResult<T> = Result<T, TimedError>;

/// Errors a sink may report while recording.
///
/// These are contained by the emitting wrapper and never reach the caller of
/// a timed function.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The destination cannot take records right now
    #[error("Sink unavailable: {0}")]
    Unavailable(String),

    /// A lock guarding the sink was poisoned by a panicking writer
    #[error("Sink lock poisoned")]
    Poisoned,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TimedError::DoubleResumption {
            signature: Signature::new("demo::FooService", "foo"),
        };
        assert_eq!(
            err.to_string(),
            "resumption handle for demo::FooService::foo() was already resumed"
        );

        let err = TimedError::UnknownFunction(Signature::new("", "missing"));
        assert_eq!(err.to_string(), "no function registered for missing()");

        let err = SinkError::Unavailable("disk full".to_string());
        assert_eq!(err.to_string(), "Sink unavailable: disk full");
    }

    #[test]
    fn test_config_error_conversion() {
        let json_err: Result<(), serde_json::Error> = serde_json::from_str::<()>("invalid json");
        let err: TimedError = json_err.unwrap_err().into();
        assert!(matches!(err, TimedError::Config(_)));
    }
}
