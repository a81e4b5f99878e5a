//! Configuration module for the signal engine.
//!
//! Configuration is loaded from environment variables (optionally via a `.env`
//! file), organized by concern: aggregation thresholds, per-timeframe history
//! and indicator selection. `Default` yields a complete, valid configuration.

mod aggregation_config;
mod indicator_config;
mod timeframe_config;

pub use aggregation_config::AggregationConfig;
pub use indicator_config::{IndicatorConfig, Tier, TierTable, default_indicators};
pub use timeframe_config::{TimeframeSettings, default_timeframe_settings};

use crate::domain::errors::SignalError;
use crate::domain::market::timeframe::Timeframe;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Capacities of the engine's bounded queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    pub signal_capacity: usize,
    pub diagnostics_capacity: usize,
    pub tick_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            signal_capacity: 16,
            diagnostics_capacity: 64,
            tick_capacity: 1024,
        }
    }
}

/// Retry policy for historical backfill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillConfig {
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignalConfig {
    pub symbol: String,
    /// Timeframe whose indicators drive the decision
    pub trading_timeframe: Timeframe,
    pub aggregation_interval: Duration,
    pub readiness_timeout: Duration,
    pub aggregation: AggregationConfig,
    pub timeframes: BTreeMap<Timeframe, TimeframeSettings>,
    pub indicators: Vec<IndicatorConfig>,
    pub tiers: TierTable,
    pub queues: QueueConfig,
    pub backfill: BackfillConfig,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            trading_timeframe: Timeframe::OneMin,
            aggregation_interval: Duration::from_secs(60),
            readiness_timeout: Duration::from_secs(30),
            aggregation: AggregationConfig::default(),
            timeframes: default_timeframe_settings(),
            indicators: default_indicators(),
            tiers: TierTable::default(),
            queues: QueueConfig::default(),
            backfill: BackfillConfig::default(),
        }
    }
}

impl SignalConfig {
    /// Load and validate configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let trading_timeframe = env::var("TRADING_TIMEFRAME")
            .unwrap_or_else(|_| defaults.trading_timeframe.to_string())
            .parse::<Timeframe>()
            .context("Failed to parse TRADING_TIMEFRAME")?;

        let (indicators, tiers) =
            indicator_config::indicators_from_env().context("Failed to load indicator config")?;

        let config = Self {
            symbol: env::var("SYMBOL").unwrap_or(defaults.symbol),
            trading_timeframe,
            aggregation_interval: Duration::from_secs(env_parse(
                "AGGREGATION_INTERVAL_SECS",
                defaults.aggregation_interval.as_secs(),
            )?),
            readiness_timeout: Duration::from_secs(env_parse(
                "READINESS_TIMEOUT_SECS",
                defaults.readiness_timeout.as_secs(),
            )?),
            aggregation: AggregationConfig::from_env()
                .context("Failed to load aggregation config")?,
            timeframes: timeframe_config::timeframe_settings_from_env()
                .context("Failed to load timeframe config")?,
            indicators,
            tiers,
            queues: QueueConfig {
                signal_capacity: env_parse("SIGNAL_QUEUE_CAPACITY", defaults.queues.signal_capacity)?,
                diagnostics_capacity: env_parse(
                    "DIAGNOSTICS_QUEUE_CAPACITY",
                    defaults.queues.diagnostics_capacity,
                )?,
                tick_capacity: env_parse("TICK_QUEUE_CAPACITY", defaults.queues.tick_capacity)?,
            },
            backfill: BackfillConfig {
                max_retries: env_parse("BACKFILL_MAX_RETRIES", defaults.backfill.max_retries)?,
                base_backoff: Duration::from_millis(env_parse(
                    "BACKFILL_BACKOFF_MS",
                    defaults.backfill.base_backoff.as_millis() as u64,
                )?),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn settings(&self, timeframe: Timeframe) -> TimeframeSettings {
        self.timeframes
            .get(&timeframe)
            .copied()
            .unwrap_or_else(|| TimeframeSettings::defaults_for(timeframe))
    }

    pub fn enabled_indicators(&self) -> impl Iterator<Item = &IndicatorConfig> {
        self.indicators.iter().filter(|cfg| cfg.enabled)
    }

    pub fn validate(&self) -> Result<(), SignalError> {
        if self.symbol.trim().is_empty() {
            return Err(SignalError::configuration("symbol must not be empty"));
        }
        if self.aggregation_interval.is_zero() || self.readiness_timeout.is_zero() {
            return Err(SignalError::configuration(
                "aggregation interval and readiness timeout must be positive",
            ));
        }

        self.aggregation.validate()?;

        for tf in Timeframe::ALL {
            self.settings(tf).validate(tf)?;
        }

        if self.enabled_indicators().next().is_none() {
            return Err(SignalError::configuration("at least one indicator must be enabled"));
        }
        self.tiers.validate(&self.indicators)?;

        if self.queues.signal_capacity == 0
            || self.queues.diagnostics_capacity == 0
            || self.queues.tick_capacity == 0
        {
            return Err(SignalError::configuration("queue capacities must be positive"));
        }

        Ok(())
    }
}

pub fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr + ToString,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .trim()
        .parse::<T>()
        .context(format!("Failed to parse {}", key))
}

/// Comma-separated list, `None` when the variable is unset.
pub(crate) fn env_list(key: &str) -> Option<Vec<String>> {
    env::var(key).ok().map(|raw| {
        raw.split(',')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect()
    })
}
