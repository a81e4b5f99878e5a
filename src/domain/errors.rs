use crate::domain::market::timeframe::Timeframe;
use thiserror::Error;

/// Errors surfaced by the signal pipeline.
///
/// Out-of-order candles are not represented here: they are dropped silently
/// and only reported through `AppendOutcome::Dropped`.
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("Invalid configuration: {reason}")]
    Configuration { reason: String },

    #[error("Market data unavailable: {reason}")]
    DataUnavailable { reason: String },

    #[error("Invalid context: no {timeframe} candles in snapshot")]
    InvalidContext { timeframe: Timeframe },

    #[error("Not ready: {missing} timeframe(s) below minimum history")]
    NotReady { missing: usize },

    #[error("Engine already running")]
    AlreadyRunning,
}

impl SignalError {
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub fn data_unavailable(reason: impl Into<String>) -> Self {
        Self::DataUnavailable {
            reason: reason.into(),
        }
    }

    /// Errors the periodic loop reports and survives.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::InvalidContext { .. } | Self::NotReady { .. })
    }
}
