//! Suspension-aware timing wrapper.
//!
//! A suspendable call may hand back a "suspended" marker on its first return
//! and deliver its real outcome later, from wherever it was resumed. Stopping
//! the clock at the first return would only measure time to first suspension.
//! Instead the wrapper keeps the clock running until the final outcome is
//! known:
//!
//! - In continuation-passing form ([`SuspendingTimer`]) the body receives a
//!   [`ProxyHandle`] instead of the caller's own handle. The proxy stops the
//!   timer, records, and then forwards the outcome to the caller's handle.
//! - For Rust futures ([`TimedFuture`]) the `Poll::Pending` returned by the
//!   inner future is passed straight through, and the timer stops on the
//!   poll that returns `Poll::Ready`.
//!
//! Both forms produce exactly one record per call that completes, and none
//! for a call that never completes.

use crate::config::DoubleResumptionPolicy;
use crate::error::{TimedError, TimedResult};
use crate::handle::{BoxedHandle, ResumptionHandle};
use crate::signature::Signature;
use crate::sink::{self, SharedSink};
use crate::timing::CallTimer;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

/// What a suspendable body returns from its first invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<T, E> {
    /// Finished without suspending; the handle it was given is left untouched.
    Ready(Result<T, E>),
    /// Registered to be resumed later through the handle it was given.
    Suspended,
}

impl<T, E> Step<T, E> {
    /// Finished immediately with a value.
    pub fn value(value: T) -> Self {
        Step::Ready(Ok(value))
    }

    /// Finished immediately with a failure.
    pub fn failure(failure: E) -> Self {
        Step::Ready(Err(failure))
    }

    /// Check whether the body suspended.
    pub fn is_suspended(&self) -> bool {
        matches!(self, Step::Suspended)
    }
}

/// What the wrapper reports to its own caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invocation {
    /// The caller's handle has already received the outcome.
    Completed,
    /// The caller's handle will receive the outcome later.
    Suspended,
}

struct Pending<T, E> {
    timer: Option<CallTimer>,
    original: BoxedHandle<T, E>,
}

struct ProxyInner<T, E> {
    signature: Signature,
    policy: DoubleResumptionPolicy,
    pending: Mutex<Option<Pending<T, E>>>,
}

impl<T, E> Drop for ProxyInner<T, E> {
    fn drop(&mut self) {
        let pending = self
            .pending
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(pending) = pending else {
            return;
        };

        if let Some(timer) = pending.timer {
            timer.abandon();
        }
        tracing::warn!(
            target: "timed::suspend",
            signature = %self.signature,
            "resumption handle dropped without being resumed; caller will never complete"
        );
    }
}

/// Resumption handle installed by the wrapper in place of the caller's own.
///
/// The first outcome delivered through any clone stops the timer, records
/// the duration and is forwarded to the caller's handle. Later outcomes are
/// rejected according to the configured [`DoubleResumptionPolicy`].
pub struct ProxyHandle<T, E> {
    inner: Arc<ProxyInner<T, E>>,
}

impl<T, E> ProxyHandle<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Install a proxy in front of `original`.
    ///
    /// `timer` is `None` for calls that are not being timed; the proxy then
    /// only enforces single resumption.
    pub fn new(
        signature: Signature,
        timer: Option<CallTimer>,
        original: BoxedHandle<T, E>,
        policy: DoubleResumptionPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(ProxyInner {
                signature,
                policy,
                pending: Mutex::new(Some(Pending { timer, original })),
            }),
        }
    }

    fn complete(&self, outcome: Result<T, E>) -> TimedResult<()> {
        let pending = self
            .inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(pending) = pending else {
            return self.reject();
        };

        if let Some(timer) = pending.timer {
            timer.finish();
        }
        pending.original.resume(outcome)
    }

    /// Record a body that unwound before delivering an outcome.
    fn unwound(&self) {
        let pending = self
            .inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(Pending { timer: Some(timer), .. }) = pending {
            let elapsed = timer.finish();
            tracing::debug!(
                target: "timed::suspend",
                signature = %self.inner.signature,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                "timed body panicked before resuming"
            );
        }
    }

    fn reject(&self) -> TimedResult<()> {
        let signature = &self.inner.signature;
        match self.inner.policy {
            DoubleResumptionPolicy::Report => {
                tracing::error!(
                    target: "timed::suspend",
                    signature = %signature,
                    "resumption handle resumed more than once; extra outcome discarded"
                );
                Err(TimedError::DoubleResumption {
                    signature: signature.clone(),
                })
            }
            DoubleResumptionPolicy::Panic => {
                panic!("resumption handle for {} was already resumed", signature)
            }
        }
    }
}

impl<T, E> ProxyHandle<T, E> {
    /// The signature of the call this proxy belongs to.
    pub fn signature(&self) -> &Signature {
        &self.inner.signature
    }

    /// Check whether an outcome has been delivered.
    pub fn is_resumed(&self) -> bool {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl<T, E> Clone for ProxyHandle<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, E> fmt::Debug for ProxyHandle<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyHandle")
            .field("signature", &self.inner.signature)
            .field("resumed", &self.is_resumed())
            .finish()
    }
}

impl<T, E> ResumptionHandle<T, E> for ProxyHandle<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn resume_with_value(&self, value: T) -> TimedResult<()> {
        self.complete(Ok(value))
    }

    fn resume_with_failure(&self, failure: E) -> TimedResult<()> {
        self.complete(Err(failure))
    }
}

/// Run `body` with `proxy` and settle the first return.
pub(crate) fn settle<T, E, F>(proxy: ProxyHandle<T, E>, body: F) -> TimedResult<Invocation>
where
    T: Send + 'static,
    E: Send + 'static,
    F: FnOnce(ProxyHandle<T, E>) -> Step<T, E>,
{
    // Only an unwind out of the body's own invocation is timed. A handle
    // dropped later by a panicking thread is an abandoned call.
    let step = match panic::catch_unwind(AssertUnwindSafe(|| body(proxy.clone()))) {
        Ok(step) => step,
        Err(payload) => {
            proxy.unwound();
            panic::resume_unwind(payload)
        }
    };

    match step {
        Step::Ready(outcome) => {
            proxy.complete(outcome)?;
            Ok(Invocation::Completed)
        }
        Step::Suspended => {
            tracing::trace!(
                target: "timed::suspend",
                signature = %proxy.signature(),
                "call suspended"
            );
            Ok(Invocation::Suspended)
        }
    }
}

/// Times suspendable calls written in continuation-passing form.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use timed::{Continuation, Invocation, MemorySink, ResumptionHandle, Signature, Step, SuspendingTimer};
///
/// let sink = Arc::new(MemorySink::new());
/// let timer = SuspendingTimer::new(Signature::new("docs", "fetch"), sink.clone());
/// let (caller, _resumed) = Continuation::<u32, String>::channel();
///
/// let invocation = timer
///     .invoke(Box::new(caller), |proxy| {
///         std::thread::spawn(move || proxy.resume_with_value(1));
///         Step::Suspended
///     })
///     .unwrap();
///
/// assert_eq!(invocation, Invocation::Suspended);
/// ```
#[derive(Debug, Clone)]
pub struct SuspendingTimer {
    signature: Signature,
    sink: SharedSink,
    policy: DoubleResumptionPolicy,
}

impl SuspendingTimer {
    /// Create a timer for calls to `signature`.
    pub fn new(signature: Signature, sink: SharedSink) -> Self {
        Self {
            signature,
            sink,
            policy: DoubleResumptionPolicy::default(),
        }
    }

    /// Set the double resumption policy.
    pub fn with_policy(mut self, policy: DoubleResumptionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The signature being timed.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Start the clock and invoke `body` with a proxy in front of `original`.
    ///
    /// If the body returns [`Step::Ready`], the duration is recorded and the
    /// outcome forwarded to `original` before this returns
    /// [`Invocation::Completed`]. If it returns [`Step::Suspended`], this
    /// returns [`Invocation::Suspended`] and recording happens when the body
    /// resumes the proxy.
    ///
    /// A body that both resumes the proxy and returns `Step::Ready` has
    /// resumed twice; that surfaces as [`TimedError::DoubleResumption`].
    pub fn invoke<T, E, F>(&self, original: BoxedHandle<T, E>, body: F) -> TimedResult<Invocation>
    where
        T: Send + 'static,
        E: Send + 'static,
        F: FnOnce(ProxyHandle<T, E>) -> Step<T, E>,
    {
        let timer = CallTimer::start(self.signature.clone(), self.sink.clone());
        let proxy = ProxyHandle::new(self.signature.clone(), Some(timer), original, self.policy);
        settle(proxy, body)
    }
}

/// Future wrapper that records the time from first poll to completion.
///
/// The inner future is boxed so the wrapper stays `Unpin` whatever it wraps.
/// Dropping the wrapper before the inner future completes records nothing.
///
/// # Panics
///
/// Polling again after the future has returned `Poll::Ready`, or after the
/// inner future panicked, panics.
#[must_use = "futures do nothing unless polled"]
pub struct TimedFuture<F> {
    inner: Pin<Box<F>>,
    signature: Signature,
    sink: SharedSink,
    timer: Option<CallTimer>,
    suspensions: u32,
    done: bool,
}

impl<F: Future> TimedFuture<F> {
    /// Time `future` under the process-wide sink.
    pub fn new(signature: Signature, future: F) -> Self {
        Self::with_sink(signature, sink::global_sink(), future)
    }

    /// Time `future` under `sink`.
    pub fn with_sink(signature: Signature, sink: SharedSink, future: F) -> Self {
        Self {
            inner: Box::pin(future),
            signature,
            sink,
            timer: None,
            suspensions: 0,
            done: false,
        }
    }
}

impl<F> TimedFuture<F> {
    /// The signature being timed.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Number of times the inner future has returned `Poll::Pending`.
    pub fn suspensions(&self) -> u32 {
        self.suspensions
    }

    /// Time since first poll, if polled yet.
    pub fn elapsed(&self) -> Option<Duration> {
        self.timer.as_ref().map(CallTimer::elapsed)
    }
}

impl<F: Future> Future for TimedFuture<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        assert!(!this.done, "`TimedFuture` polled after completion");

        if this.timer.is_none() {
            this.timer = Some(CallTimer::start(this.signature.clone(), this.sink.clone()));
        }

        let inner = &mut this.inner;
        let polled = panic::catch_unwind(AssertUnwindSafe(|| inner.as_mut().poll(cx)));

        match polled {
            Ok(Poll::Ready(output)) => {
                this.done = true;
                if let Some(timer) = this.timer.take() {
                    let elapsed = timer.finish();
                    tracing::trace!(
                        target: "timed::suspend",
                        signature = %this.signature,
                        suspensions = this.suspensions,
                        elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                        "timed future completed"
                    );
                }
                Poll::Ready(output)
            }
            Ok(Poll::Pending) => {
                this.suspensions += 1;
                Poll::Pending
            }
            Err(payload) => {
                this.done = true;
                if let Some(timer) = this.timer.take() {
                    timer.finish();
                }
                panic::resume_unwind(payload)
            }
        }
    }
}

impl<F> Drop for TimedFuture<F> {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            let elapsed = timer.abandon();
            tracing::debug!(
                target: "timed::suspend",
                signature = %self.signature,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                "timed future dropped before completion; nothing recorded"
            );
        }
    }
}

impl<F> fmt::Debug for TimedFuture<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimedFuture")
            .field("signature", &self.signature)
            .field("suspensions", &self.suspensions)
            .field("done", &self.done)
            .finish()
    }
}

/// Extension for timing any future.
pub trait TimedFutureExt: Future + Sized {
    /// Time this future under the process-wide sink.
    fn timed(self, signature: Signature) -> TimedFuture<Self> {
        TimedFuture::new(signature, self)
    }

    /// Time this future under `sink`.
    fn timed_with(self, signature: Signature, sink: SharedSink) -> TimedFuture<Self> {
        TimedFuture::with_sink(signature, sink, self)
    }
}

impl<F: Future> TimedFutureExt for F {}
