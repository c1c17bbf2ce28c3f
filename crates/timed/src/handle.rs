//! One-shot resumption handles.
//!
//! A resumption handle stands for "the rest of the caller": whoever holds it
//! delivers the final value or failure of a suspended call exactly once.

use crate::error::{TimedError, TimedResult};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Delivers the outcome of a suspended call to whoever is waiting for it.
///
/// Each handle accepts exactly one outcome. Implementations reject any
/// further resumption with an error instead of delivering it.
pub trait ResumptionHandle<T, E>: Send + Sync {
    /// Complete the call with a value.
    fn resume_with_value(&self, value: T) -> TimedResult<()>;

    /// Complete the call with a failure.
    fn resume_with_failure(&self, failure: E) -> TimedResult<()>;

    /// Complete the call with either outcome.
    fn resume(&self, outcome: Result<T, E>) -> TimedResult<()> {
        match outcome {
            Ok(value) => self.resume_with_value(value),
            Err(failure) => self.resume_with_failure(failure),
        }
    }
}

/// Owned, type-erased resumption handle.
pub type BoxedHandle<T, E> = Box<dyn ResumptionHandle<T, E>>;

type Callback<T, E> = Box<dyn FnOnce(Result<T, E>) + Send>;

/// A resumption handle backed by a callback.
///
/// Clones share the same callback, so the outcome is delivered at most once
/// no matter which clone resumes first.
pub struct Continuation<T, E> {
    callback: Arc<Mutex<Option<Callback<T, E>>>>,
}

impl<T, E> Continuation<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Create a continuation that runs `callback` with the outcome.
    pub fn new(callback: impl FnOnce(Result<T, E>) + Send + 'static) -> Self {
        Self {
            callback: Arc::new(Mutex::new(Some(Box::new(callback)))),
        }
    }

    /// Create a continuation paired with a future that resolves to its outcome.
    pub fn channel() -> (Self, Resumed<T, E>) {
        let (tx, rx) = oneshot::channel();
        let continuation = Self::new(move |outcome| {
            // The awaiting side may already be gone; nothing to deliver to.
            let _ = tx.send(outcome);
        });
        (continuation, Resumed::new(rx))
    }
}

impl<T, E> Continuation<T, E> {
    /// Check whether an outcome has been delivered.
    pub fn is_resumed(&self) -> bool {
        self.callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn deliver(&self, outcome: Result<T, E>) -> TimedResult<()> {
        let callback = self
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(TimedError::AlreadyResumed)?;
        callback(outcome);
        Ok(())
    }
}

impl<T, E> Clone for Continuation<T, E> {
    fn clone(&self) -> Self {
        Self {
            callback: Arc::clone(&self.callback),
        }
    }
}

impl<T, E> fmt::Debug for Continuation<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Continuation")
            .field("resumed", &self.is_resumed())
            .finish()
    }
}

impl<T, E> ResumptionHandle<T, E> for Continuation<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn resume_with_value(&self, value: T) -> TimedResult<()> {
        self.deliver(Ok(value))
    }

    fn resume_with_failure(&self, failure: E) -> TimedResult<()> {
        self.deliver(Err(failure))
    }
}

/// Future resolving to the outcome delivered through a [`Continuation`].
///
/// If every clone of the continuation is dropped without resuming, this
/// future never completes. A warning is logged the first time that is
/// observed; no timeout is applied.
#[derive(Debug)]
pub struct Resumed<T, E> {
    receiver: oneshot::Receiver<Result<T, E>>,
    abandoned: bool,
}

impl<T, E> Resumed<T, E> {
    fn new(receiver: oneshot::Receiver<Result<T, E>>) -> Self {
        Self {
            receiver,
            abandoned: false,
        }
    }

    /// Check whether the continuation was dropped without an outcome.
    pub fn is_abandoned(&self) -> bool {
        self.abandoned
    }
}

impl<T, E> Future for Resumed<T, E> {
    type Output = Result<T, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.abandoned {
            return Poll::Pending;
        }

        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => {
                self.abandoned = true;
                tracing::warn!(
                    target: "timed::suspend",
                    "continuation dropped without being resumed; the awaiting caller will never complete"
                );
                Poll::Pending
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Suspend until `register` arranges for the continuation to be resumed.
///
/// `register` runs immediately and typically hands the continuation to a
/// callback-based API: a timer, an I/O completion, another thread.
///
/// ```rust
/// use timed::{suspend_on, ResumptionHandle};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let answer: Result<u32, String> = suspend_on(|continuation| {
///     std::thread::spawn(move || continuation.resume_with_value(42));
/// })
/// .await;
/// assert_eq!(answer, Ok(42));
/// # }
/// ```
pub fn suspend_on<T, E, F>(register: F) -> Resumed<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
    F: FnOnce(Continuation<T, E>),
{
    let (continuation, resumed) = Continuation::channel();
    register(continuation);
    resumed
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;
    use std::time::Duration;

    #[test]
    fn test_continuation_resumes_once() {
        let (continuation, resumed) = Continuation::<u32, String>::channel();
        let other = continuation.clone();

        assert!(!continuation.is_resumed());
        continuation.resume_with_value(7).unwrap();
        assert!(other.is_resumed());

        let second = other.resume_with_failure("late".to_string());
        assert!(matches!(second, Err(TimedError::AlreadyResumed)));

        assert_eq!(resumed.now_or_never(), Some(Ok(7)));
    }

    #[test]
    fn test_continuation_callback() {
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let continuation = Continuation::<u32, String>::new(move |outcome| {
            *sink.lock().unwrap() = Some(outcome);
        });

        continuation.resume(Err("boom".to_string())).unwrap();
        assert_eq!(*seen.lock().unwrap(), Some(Err("boom".to_string())));
    }

    #[test]
    fn test_abandoned_continuation_stays_pending() {
        let (continuation, mut resumed) = Continuation::<u32, String>::channel();
        drop(continuation);

        assert!((&mut resumed).now_or_never().is_none());
        assert!(resumed.is_abandoned());
        assert!((&mut resumed).now_or_never().is_none());
    }

    #[tokio::test]
    async fn test_suspend_on_other_thread() {
        let outcome: Result<&str, String> = suspend_on(|continuation| {
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(10));
                continuation.resume_with_value("done").unwrap();
            });
        })
        .await;

        assert_eq!(outcome, Ok("done"));
    }
}
