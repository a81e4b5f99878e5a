//! Per-timeframe history and cadence settings.

use super::env_parse;
use crate::domain::errors::SignalError;
use crate::domain::market::timeframe::Timeframe;
use anyhow::Result;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeframeSettings {
    /// Candles required before the timeframe counts as ready
    pub min_candles: usize,
    /// Candles copied into each snapshot
    pub snapshot_depth: usize,
    /// Retention cap for the series
    pub max_history: usize,
    /// How often the feed polls its builder for a closed window
    pub poll_interval: Duration,
}

impl TimeframeSettings {
    pub fn defaults_for(timeframe: Timeframe) -> Self {
        let (min_candles, poll_secs) = match timeframe {
            Timeframe::OneMin => (100, 1),
            Timeframe::FiveMin => (80, 2),
            Timeframe::FifteenMin => (60, 5),
            Timeframe::OneHour => (40, 10),
            Timeframe::FourHour => (30, 30),
        };
        Self {
            min_candles,
            snapshot_depth: 200,
            max_history: 1000,
            poll_interval: Duration::from_secs(poll_secs),
        }
    }

    fn from_env(timeframe: Timeframe) -> Result<Self> {
        let defaults = Self::defaults_for(timeframe);
        let suffix = timeframe.to_interval_string().to_uppercase();
        Ok(Self {
            min_candles: env_parse(&format!("MIN_CANDLES_{}", suffix), defaults.min_candles)?,
            snapshot_depth: env_parse(
                &format!("SNAPSHOT_DEPTH_{}", suffix),
                defaults.snapshot_depth,
            )?,
            max_history: env_parse(&format!("MAX_HISTORY_{}", suffix), defaults.max_history)?,
            poll_interval: Duration::from_millis(env_parse(
                &format!("POLL_INTERVAL_MS_{}", suffix),
                defaults.poll_interval.as_millis() as u64,
            )?),
        })
    }

    pub fn validate(&self, timeframe: Timeframe) -> Result<(), SignalError> {
        if self.min_candles == 0 || self.snapshot_depth == 0 {
            return Err(SignalError::configuration(format!(
                "{}: min_candles and snapshot_depth must be positive",
                timeframe
            )));
        }
        if self.max_history < self.min_candles || self.max_history < self.snapshot_depth {
            return Err(SignalError::configuration(format!(
                "{}: max_history {} must cover min_candles {} and snapshot_depth {}",
                timeframe, self.max_history, self.min_candles, self.snapshot_depth
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(SignalError::configuration(format!(
                "{}: poll interval must be positive",
                timeframe
            )));
        }
        Ok(())
    }
}

/// Settings for every timeframe; missing entries fall back to the defaults.
pub fn default_timeframe_settings() -> BTreeMap<Timeframe, TimeframeSettings> {
    Timeframe::ALL
        .iter()
        .map(|&tf| (tf, TimeframeSettings::defaults_for(tf)))
        .collect()
}

pub fn timeframe_settings_from_env() -> Result<BTreeMap<Timeframe, TimeframeSettings>> {
    Timeframe::ALL
        .iter()
        .map(|&tf| Ok((tf, TimeframeSettings::from_env(tf)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finest_needs_most_history() {
        let settings = default_timeframe_settings();
        assert_eq!(settings[&Timeframe::OneMin].min_candles, 100);
        assert_eq!(settings[&Timeframe::FourHour].min_candles, 30);
        for tf in Timeframe::ALL {
            assert!(settings[&tf].validate(tf).is_ok());
        }
    }

    #[test]
    fn test_history_must_cover_snapshot() {
        let settings = TimeframeSettings {
            min_candles: 10,
            snapshot_depth: 50,
            max_history: 20,
            poll_interval: Duration::from_secs(1),
        };
        assert!(settings.validate(Timeframe::OneMin).is_err());
    }
}
