//! Synchronous timing wrapper

use crate::signature::Signature;
use crate::sink::{self, SharedSink, TimingRecord};
use std::time::{Duration, Instant};

/// A timer for one call, reporting to a sink when finished.
///
/// The timer starts on creation. [`finish`](CallTimer::finish) records the
/// elapsed time. If the timer is dropped unfinished, which happens when the
/// timed body panics, the elapsed time is still recorded on the way out.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use timed::{CallTimer, MemorySink, Signature};
///
/// let sink = Arc::new(MemorySink::new());
/// let timer = CallTimer::start(Signature::new("docs", "parse"), sink.clone());
/// // ... work ...
/// let elapsed = timer.finish();
///
/// assert_eq!(sink.records()[0].duration, elapsed);
/// ```
#[derive(Debug)]
pub struct CallTimer {
    signature: Signature,
    start: Instant,
    sink: SharedSink,
    finished: bool,
}

impl CallTimer {
    /// Start timing a call to `signature`.
    #[inline]
    pub fn start(signature: Signature, sink: SharedSink) -> Self {
        Self {
            signature,
            start: Instant::now(),
            sink,
            finished: false,
        }
    }

    /// Get the elapsed duration.
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Get the signature being timed.
    #[inline]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Get the start instant.
    #[inline]
    pub fn started_at(&self) -> Instant {
        self.start
    }

    /// Stop the timer, record the elapsed time and return it.
    pub fn finish(mut self) -> Duration {
        self.finished = true;
        self.report()
    }

    /// Stop the timer without recording anything.
    ///
    /// Used when the call will never deliver an outcome, such as a future
    /// that is dropped while still pending.
    pub fn abandon(mut self) -> Duration {
        self.finished = true;
        self.elapsed()
    }

    fn report(&self) -> Duration {
        let elapsed = self.elapsed();
        sink::emit(
            self.sink.as_ref(),
            &TimingRecord::new(self.signature.clone(), elapsed),
        );
        elapsed
    }
}

impl Drop for CallTimer {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        let elapsed = self.report();
        tracing::debug!(
            target: "timed",
            signature = %self.signature,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "timed call unwound before finishing"
        );
    }
}

/// Run `body` under the process-wide sink and return its result unchanged.
///
/// This is what `timed!` expands to for a plain `fn`.
#[inline]
pub fn time_blocking<R>(signature: Signature, body: impl FnOnce() -> R) -> R {
    time_blocking_with(signature, sink::global_sink(), body)
}

/// Run `body`, record how long it took, and return its result unchanged.
///
/// The record is emitted on the calling thread before this function
/// returns, on both the `Ok` and the `Err` path of a `Result`-returning
/// body, and also while unwinding from a panic.
pub fn time_blocking_with<R>(signature: Signature, sink: SharedSink, body: impl FnOnce() -> R) -> R {
    let timer = CallTimer::start(signature, sink);
    let result = body();
    timer.finish();
    result
}
