//! Aggregation thresholds parsed from environment variables.
//!
//! Every constant the aggregator uses lives here so it can be tuned without a
//! rebuild.

use super::{env_list, env_parse};
use crate::domain::errors::SignalError;
use anyhow::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct AggregationConfig {
    /// Directional signals below this confidence are downgraded to Hold
    pub min_confidence: f64,
    /// |bias| above this is Buy/Sell
    pub neutral_threshold: f64,
    /// |bias| at which confidence reaches `confidence_at_strong`
    pub strong_threshold: f64,

    /// |bias| strictly above this is treated as degenerate input
    pub extreme_bias_threshold: f64,
    pub extreme_bias_dampening: f64,

    /// Multiplier applied to bias when the coarser timeframe disagrees
    pub consensus_penalty: f64,
    /// Multiplier applied to confidence when the coarser timeframe agrees
    pub consensus_boost: f64,
    /// Indicator names left out of the coarser-timeframe bias
    pub consensus_excluded: Vec<String>,

    /// Confidence scaled by `1 - hold_dampening * hold_share`
    pub hold_dampening: f64,
    /// Confidence reported when no indicator is computable
    pub empty_confidence: f64,

    pub confidence_at_neutral: f64,
    pub confidence_at_strong: f64,
    pub confidence_max: f64,

    /// Fallback target/stop offsets as fractions of the current price
    pub target_pct: f64,
    pub stop_pct: f64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.0,
            neutral_threshold: 15.0,
            strong_threshold: 40.0,
            extreme_bias_threshold: 90.0,
            extreme_bias_dampening: 0.3,
            consensus_penalty: 0.5,
            consensus_boost: 1.1,
            consensus_excluded: vec!["Stochastic".to_string(), "OBV".to_string()],
            hold_dampening: 0.3,
            empty_confidence: 0.1,
            confidence_at_neutral: 0.5,
            confidence_at_strong: 0.7,
            confidence_max: 0.95,
            target_pct: 0.02,
            stop_pct: 0.01,
        }
    }
}

impl AggregationConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            min_confidence: env_parse("MIN_CONFIDENCE", defaults.min_confidence)?,
            neutral_threshold: env_parse("NEUTRAL_THRESHOLD", defaults.neutral_threshold)?,
            strong_threshold: env_parse("STRONG_THRESHOLD", defaults.strong_threshold)?,
            extreme_bias_threshold: env_parse(
                "EXTREME_BIAS_THRESHOLD",
                defaults.extreme_bias_threshold,
            )?,
            extreme_bias_dampening: env_parse(
                "EXTREME_BIAS_DAMPENING",
                defaults.extreme_bias_dampening,
            )?,
            consensus_penalty: env_parse("CONSENSUS_PENALTY", defaults.consensus_penalty)?,
            consensus_boost: env_parse("CONSENSUS_BOOST", defaults.consensus_boost)?,
            consensus_excluded: env_list("CONSENSUS_EXCLUDED")
                .unwrap_or(defaults.consensus_excluded),
            hold_dampening: env_parse("HOLD_DAMPENING", defaults.hold_dampening)?,
            empty_confidence: env_parse("EMPTY_CONFIDENCE", defaults.empty_confidence)?,
            confidence_at_neutral: env_parse(
                "CONFIDENCE_AT_NEUTRAL",
                defaults.confidence_at_neutral,
            )?,
            confidence_at_strong: env_parse("CONFIDENCE_AT_STRONG", defaults.confidence_at_strong)?,
            confidence_max: env_parse("CONFIDENCE_MAX", defaults.confidence_max)?,
            target_pct: env_parse("TARGET_PCT", defaults.target_pct)?,
            stop_pct: env_parse("STOP_PCT", defaults.stop_pct)?,
        })
    }

    pub fn validate(&self) -> Result<(), SignalError> {
        if !(self.neutral_threshold > 0.0 && self.neutral_threshold < self.strong_threshold) {
            return Err(SignalError::configuration(format!(
                "neutral threshold {} must be positive and below strong threshold {}",
                self.neutral_threshold, self.strong_threshold
            )));
        }
        if self.strong_threshold >= 100.0 {
            return Err(SignalError::configuration(format!(
                "strong threshold {} must be below 100",
                self.strong_threshold
            )));
        }
        if !(self.extreme_bias_threshold > 0.0 && self.extreme_bias_threshold <= 100.0) {
            return Err(SignalError::configuration(format!(
                "extreme bias threshold {} must be in (0, 100]",
                self.extreme_bias_threshold
            )));
        }

        let unit_fields = [
            ("min_confidence", self.min_confidence),
            ("extreme_bias_dampening", self.extreme_bias_dampening),
            ("consensus_penalty", self.consensus_penalty),
            ("hold_dampening", self.hold_dampening),
            ("empty_confidence", self.empty_confidence),
        ];
        for (name, value) in unit_fields {
            if !(0.0..=1.0).contains(&value) {
                return Err(SignalError::configuration(format!(
                    "{} = {} must be within [0, 1]",
                    name, value
                )));
            }
        }

        if !(self.consensus_boost >= 1.0 && self.consensus_boost.is_finite()) {
            return Err(SignalError::configuration(format!(
                "consensus boost {} must be finite and >= 1",
                self.consensus_boost
            )));
        }

        let ramp_ordered = 0.0 < self.confidence_at_neutral
            && self.confidence_at_neutral <= self.confidence_at_strong
            && self.confidence_at_strong <= self.confidence_max
            && self.confidence_max <= 1.0;
        if !ramp_ordered {
            return Err(SignalError::configuration(format!(
                "confidence ramp must satisfy 0 < {} <= {} <= {} <= 1",
                self.confidence_at_neutral, self.confidence_at_strong, self.confidence_max
            )));
        }

        for (name, pct) in [("target_pct", self.target_pct), ("stop_pct", self.stop_pct)] {
            if !(pct > 0.0 && pct < 1.0) {
                return Err(SignalError::configuration(format!(
                    "{} = {} must be within (0, 1)",
                    name, pct
                )));
            }
        }

        Ok(())
    }
}
