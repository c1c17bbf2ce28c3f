//! Timing configuration

use crate::error::TimedResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Level at which [`TracingSink`](crate::TracingSink) emits timing events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

/// What happens when a proxy resumption handle is resumed a second time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DoubleResumptionPolicy {
    /// Reject the extra resumption with
    /// [`TimedError::DoubleResumption`](crate::TimedError::DoubleResumption)
    /// and log it at error level.
    #[default]
    Report,
    /// Panic in the resuming context.
    Panic,
}

/// Timing configuration.
///
/// ```rust
/// use timed::{LogLevel, TimingConfig};
///
/// let config = TimingConfig::from_json(r#"{"level": "debug", "slowCallThresholdMs": 500}"#).unwrap();
/// assert_eq!(config.level, LogLevel::Debug);
/// assert!(config.enabled);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimingConfig {
    /// Whether marked functions are timed at all.
    ///
    /// When disabled the marker is inert: bodies still run and their outcome
    /// is still delivered, but nothing is recorded.
    pub enabled: bool,

    /// Level used for ordinary timing events.
    pub level: LogLevel,

    /// Calls at or above this duration are logged at warn level.
    pub slow_call_threshold_ms: Option<u64>,

    /// Handling of a second resumption of the same handle.
    pub double_resumption: DoubleResumptionPolicy,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: LogLevel::Info,
            slow_call_threshold_ms: None,
            double_resumption: DoubleResumptionPolicy::Report,
        }
    }
}

impl TimingConfig {
    /// Create a config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON configuration document. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> TimedResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Enable or disable timing.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the log level for timing events.
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Set the slow call threshold.
    pub fn with_slow_call_threshold(mut self, threshold: Duration) -> Self {
        self.slow_call_threshold_ms = Some(threshold.as_millis() as u64);
        self
    }

    /// Set the double resumption policy.
    pub fn with_double_resumption(mut self, policy: DoubleResumptionPolicy) -> Self {
        self.double_resumption = policy;
        self
    }

    /// The slow call threshold as a duration.
    pub fn slow_call_threshold(&self) -> Option<Duration> {
        self.slow_call_threshold_ms.map(Duration::from_millis)
    }
}
