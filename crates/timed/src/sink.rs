//! Destinations for timing records.
//!
//! A sink receives one [`TimingRecord`] per completed timed call. Sinks are
//! shared between every call in flight, so implementations must accept
//! concurrent `record` calls. Nothing a sink does can affect the outcome of
//! the call being timed: [`emit`] contains both returned errors and panics.

use crate::config::{LogLevel, TimingConfig};
use crate::error::SinkError;
use crate::signature::Signature;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};
use std::time::Duration;

/// Sink handle shared between wrappers.
pub type SharedSink = Arc<dyn TimingSink>;

/// Process-wide sink used by the [`timed!`](crate::timed) marker.
static GLOBAL_SINK: OnceLock<RwLock<SharedSink>> = OnceLock::new();

fn global_slot() -> &'static RwLock<SharedSink> {
    GLOBAL_SINK.get_or_init(|| RwLock::new(Arc::new(TracingSink::default())))
}

/// Get the process-wide sink.
///
/// Defaults to a [`TracingSink`] at info level until replaced with
/// [`set_global_sink`] or [`install`].
pub fn global_sink() -> SharedSink {
    global_slot()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Replace the process-wide sink.
///
/// Calls already in flight keep the sink they started with.
pub fn set_global_sink(sink: SharedSink) {
    *global_slot().write().unwrap_or_else(PoisonError::into_inner) = sink;
}

/// Install the sink described by `config` as the process-wide sink.
pub fn install(config: &TimingConfig) {
    set_global_sink(sink_for(config));
}

/// Build the default sink for a configuration.
pub fn sink_for(config: &TimingConfig) -> SharedSink {
    if config.enabled {
        Arc::new(TracingSink::from_config(config))
    } else {
        Arc::new(NoopSink)
    }
}

/// Hand a record to a sink without letting sink failures escape.
///
/// Errors are reported at warn level and panics at error level on the
/// `timed::sink` target.
pub fn emit(sink: &dyn TimingSink, record: &TimingRecord) {
    #[cfg(feature = "telemetry")]
    deliver(sink, record);

    #[cfg(not(feature = "telemetry"))]
    let _ = (sink, record);
}

#[cfg(feature = "telemetry")]
fn deliver(sink: &dyn TimingSink, record: &TimingRecord) {
    use std::panic::{self, AssertUnwindSafe};

    match panic::catch_unwind(AssertUnwindSafe(|| sink.record(record))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::warn!(
                target: "timed::sink",
                signature = %record.signature,
                duration_ms = record.duration_ms(),
                "failed to record timing: {}",
                e
            );
        }
        Err(_) => {
            tracing::error!(
                target: "timed::sink",
                signature = %record.signature,
                duration_ms = record.duration_ms(),
                "timing sink panicked while recording"
            );
        }
    }
}

/// One measured call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingRecord {
    /// The function that was timed
    pub signature: Signature,
    /// Monotonic time from first invocation to final outcome
    pub duration: Duration,
    /// Wall-clock time at which the outcome became known
    pub recorded_at: DateTime<Utc>,
}

impl TimingRecord {
    /// Create a record stamped with the current wall-clock time.
    pub fn new(signature: Signature, duration: Duration) -> Self {
        Self {
            signature,
            duration,
            recorded_at: Utc::now(),
        }
    }

    /// Duration in milliseconds.
    pub fn duration_ms(&self) -> f64 {
        self.duration.as_secs_f64() * 1000.0
    }
}

/// A destination for timing records.
pub trait TimingSink: Send + Sync + fmt::Debug {
    /// Record one completed call.
    fn record(&self, record: &TimingRecord) -> Result<(), SinkError>;
}

/// Logs every record through `tracing`.
#[derive(Debug, Clone, Default)]
pub struct TracingSink {
    level: LogLevel,
    slow_call_threshold: Option<Duration>,
}

impl TracingSink {
    /// Create a sink logging at `level`.
    pub fn new(level: LogLevel) -> Self {
        Self {
            level,
            slow_call_threshold: None,
        }
    }

    /// Create a sink from a configuration.
    pub fn from_config(config: &TimingConfig) -> Self {
        Self {
            level: config.level,
            slow_call_threshold: config.slow_call_threshold(),
        }
    }

    /// Escalate calls at or above `threshold` to warn level.
    pub fn with_slow_call_threshold(mut self, threshold: Duration) -> Self {
        self.slow_call_threshold = Some(threshold);
        self
    }

    /// Level a record of the given duration is logged at.
    pub fn level_for(&self, duration: Duration) -> LogLevel {
        match self.slow_call_threshold {
            Some(threshold) if duration >= threshold => LogLevel::Warn,
            _ => self.level,
        }
    }
}

impl TimingSink for TracingSink {
    fn record(&self, record: &TimingRecord) -> Result<(), SinkError> {
        let signature = &record.signature;
        let duration_ms = record.duration_ms();

        match self.level_for(record.duration) {
            LogLevel::Trace => tracing::trace!(
                target: "timed",
                signature = %signature,
                duration_ms,
                "execution of {} took {:?}",
                signature,
                record.duration
            ),
            LogLevel::Debug => tracing::debug!(
                target: "timed",
                signature = %signature,
                duration_ms,
                "execution of {} took {:?}",
                signature,
                record.duration
            ),
            LogLevel::Info => tracing::info!(
                target: "timed",
                signature = %signature,
                duration_ms,
                "execution of {} took {:?}",
                signature,
                record.duration
            ),
            LogLevel::Warn => tracing::warn!(
                target: "timed",
                signature = %signature,
                duration_ms,
                "execution of {} took {:?}",
                signature,
                record.duration
            ),
            LogLevel::Error => tracing::error!(
                target: "timed",
                signature = %signature,
                duration_ms,
                "execution of {} took {:?}",
                signature,
                record.duration
            ),
        }

        Ok(())
    }
}

/// Discards every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl TimingSink for NoopSink {
    fn record(&self, _record: &TimingRecord) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Keeps the most recent records in memory.
#[derive(Debug)]
pub struct MemorySink {
    records: Mutex<VecDeque<TimingRecord>>,
    /// Maximum records kept; the oldest is dropped first
    max_records: usize,
}

impl MemorySink {
    /// Create a sink keeping up to 1000 records.
    pub fn new() -> Self {
        Self::with_max_records(1000)
    }

    /// Create a sink keeping up to `max` records.
    pub fn with_max_records(max: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(max.min(1024))),
            max_records: max.max(1),
        }
    }

    /// Snapshot of all kept records, oldest first.
    pub fn records(&self) -> Vec<TimingRecord> {
        self.lock().iter().cloned().collect()
    }

    /// Records for one signature, oldest first.
    pub fn records_for(&self, signature: &Signature) -> Vec<TimingRecord> {
        self.lock()
            .iter()
            .filter(|r| &r.signature == signature)
            .cloned()
            .collect()
    }

    /// Durations recorded for one signature, oldest first.
    pub fn durations_for(&self, signature: &Signature) -> Vec<Duration> {
        self.lock()
            .iter()
            .filter(|r| &r.signature == signature)
            .map(|r| r.duration)
            .collect()
    }

    /// Number of kept records.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if no records are kept.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop all kept records.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<TimingRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl TimingSink for MemorySink {
    fn record(&self, record: &TimingRecord) -> Result<(), SinkError> {
        let mut records = self.records.lock().map_err(|_| SinkError::Poisoned)?;

        if records.len() >= self.max_records {
            records.pop_front();
        }
        records.push_back(record.clone());

        tracing::trace!(
            target: "timed::sink",
            signature = %record.signature,
            duration_ms = record.duration_ms(),
            "timing kept in memory"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct FailingSink;

    impl TimingSink for FailingSink {
        fn record(&self, _record: &TimingRecord) -> Result<(), SinkError> {
            Err(SinkError::Unavailable("offline".to_string()))
        }
    }

    #[derive(Debug)]
    struct PanickingSink;

    impl TimingSink for PanickingSink {
        fn record(&self, _record: &TimingRecord) -> Result<(), SinkError> {
            panic!("sink exploded");
        }
    }

    fn record(function: &str, ms: u64) -> TimingRecord {
        TimingRecord::new(Signature::new("tests", function), Duration::from_millis(ms))
    }

    #[test]
    fn test_memory_sink_records() {
        let sink = MemorySink::new();
        assert!(sink.is_empty());

        emit(&sink, &record("a", 5));
        emit(&sink, &record("b", 10));
        emit(&sink, &record("a", 15));

        assert_eq!(sink.len(), 3);
        assert_eq!(
            sink.durations_for(&Signature::new("tests", "a")),
            vec![Duration::from_millis(5), Duration::from_millis(15)]
        );
        assert_eq!(sink.records_for(&Signature::new("tests", "b")).len(), 1);

        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn test_memory_sink_max_records() {
        let sink = MemorySink::with_max_records(2);

        for ms in 1..=3 {
            emit(&sink, &record("a", ms));
        }

        let kept: Vec<u128> = sink.records().iter().map(|r| r.duration.as_millis()).collect();
        assert_eq!(kept, vec![2, 3]);
    }

    #[test]
    fn test_emit_contains_sink_errors() {
        emit(&FailingSink, &record("a", 1));
        emit(&PanickingSink, &record("a", 1));
    }

    #[test]
    fn test_tracing_sink_slow_threshold() {
        let sink = TracingSink::new(LogLevel::Debug).with_slow_call_threshold(Duration::from_millis(100));

        assert_eq!(sink.level_for(Duration::from_millis(99)), LogLevel::Debug);
        assert_eq!(sink.level_for(Duration::from_millis(100)), LogLevel::Warn);
        assert!(sink.record(&record("a", 150)).is_ok());
    }

    #[test]
    fn test_sink_for_config() {
        let config = TimingConfig::new().with_level(LogLevel::Trace);
        assert!(format!("{:?}", sink_for(&config)).contains("TracingSink"));

        let disabled = TimingConfig::new().with_enabled(false);
        assert!(format!("{:?}", sink_for(&disabled)).contains("NoopSink"));
    }

    #[test]
    fn test_record_serialization() {
        let rec = record("a", 431);
        let json = serde_json::to_string(&rec).unwrap();
        assert!(json.contains("recordedAt"));

        let parsed: TimingRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(rec, parsed);
        assert!((parsed.duration_ms() - 431.0).abs() < f64::EPSILON);
    }
}
