//! Indicator selection, parameters and performance tiers.

use super::env_list;
use crate::domain::errors::SignalError;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorConfig {
    pub name: String,
    pub enabled: bool,
    pub params: BTreeMap<String, f64>,
}

impl IndicatorConfig {
    pub fn new(name: &str, params: &[(&str, f64)]) -> Self {
        Self {
            name: name.to_string(),
            enabled: true,
            params: params
                .iter()
                .map(|(key, value)| (key.to_string(), *value))
                .collect(),
        }
    }

    pub fn param(&self, key: &str, default: f64) -> f64 {
        self.params.get(key).copied().unwrap_or(default)
    }

    /// Integer parameter (periods, lookbacks). Fractions are truncated;
    /// negative or NaN values become 0 and huge ones saturate, so indicator
    /// constructors range-check the result.
    pub fn period(&self, key: &str, default: usize) -> usize {
        self.params
            .get(key)
            .map(|value| *value as usize)
            .unwrap_or(default)
    }
}

pub fn default_indicators() -> Vec<IndicatorConfig> {
    vec![
        IndicatorConfig::new("MACD", &[("fast", 12.0), ("slow", 26.0), ("signal", 9.0)]),
        IndicatorConfig::new("EMA_Cross", &[("fast", 20.0), ("slow", 50.0)]),
        IndicatorConfig::new("SupportResistance", &[("lookback", 50.0), ("pivot_width", 2.0)]),
        IndicatorConfig::new("RSI", &[("period", 14.0), ("overbought", 70.0), ("oversold", 30.0)]),
        IndicatorConfig::new("Bollinger", &[("period", 20.0), ("std_dev", 2.0)]),
        IndicatorConfig::new("Stochastic", &[("period", 14.0), ("smoothing", 3.0)]),
        IndicatorConfig::new("OBV", &[("lookback", 20.0)]),
    ]
}

/// Static performance tiers, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    Elite,
    Strong,
    Solid,
    Average,
    Weak,
}

impl Tier {
    pub fn weight(&self) -> f64 {
        match self {
            Tier::Elite => 10.0,
            Tier::Strong => 8.0,
            Tier::Solid => 5.0,
            Tier::Average => 3.0,
            Tier::Weak => 1.0,
        }
    }
}

impl FromStr for Tier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "elite" | "10" => Ok(Tier::Elite),
            "strong" | "8" => Ok(Tier::Strong),
            "solid" | "5" => Ok(Tier::Solid),
            "average" | "3" => Ok(Tier::Average),
            "weak" | "1" => Ok(Tier::Weak),
            _ => bail!(
                "Invalid tier: '{}'. Valid options: elite, strong, solid, average, weak",
                s
            ),
        }
    }
}

/// Explicit indicator name -> tier mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct TierTable {
    tiers: BTreeMap<String, Tier>,
    /// Weight for names absent from the table
    pub default_weight: f64,
}

impl Default for TierTable {
    fn default() -> Self {
        Self::new([
            ("MACD", Tier::Elite),
            ("EMA_Cross", Tier::Strong),
            ("SupportResistance", Tier::Strong),
            ("RSI", Tier::Solid),
            ("Bollinger", Tier::Average),
            ("Stochastic", Tier::Weak),
            ("OBV", Tier::Weak),
        ])
    }
}

impl TierTable {
    pub fn new<'a>(entries: impl IntoIterator<Item = (&'a str, Tier)>) -> Self {
        Self {
            tiers: entries
                .into_iter()
                .map(|(name, tier)| (name.to_string(), tier))
                .collect(),
            default_weight: Tier::Average.weight(),
        }
    }

    pub fn with_tier(mut self, name: &str, tier: Tier) -> Self {
        self.tiers.insert(name.to_string(), tier);
        self
    }

    pub fn tier(&self, name: &str) -> Option<Tier> {
        self.tiers.get(name).copied()
    }

    pub fn weight(&self, name: &str) -> f64 {
        self.tier(name)
            .map(|tier| tier.weight())
            .unwrap_or(self.default_weight)
    }

    /// Every enabled indicator must have an explicit tier.
    pub fn validate(&self, indicators: &[IndicatorConfig]) -> Result<(), SignalError> {
        let missing: Vec<&str> = indicators
            .iter()
            .filter(|cfg| cfg.enabled && !self.tiers.contains_key(&cfg.name))
            .map(|cfg| cfg.name.as_str())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(SignalError::configuration(format!(
                "no performance tier configured for indicator(s): {}",
                missing.join(", ")
            )))
        }
    }
}

/// Applies `DISABLED_INDICATORS`, `INDICATOR_PARAMS` and `INDICATOR_TIERS`
/// overrides on top of the defaults.
///
/// `INDICATOR_PARAMS` uses `Name.param=value` pairs, `INDICATOR_TIERS` uses
/// `Name=tier` pairs, both comma separated.
pub fn indicators_from_env() -> Result<(Vec<IndicatorConfig>, TierTable)> {
    let mut indicators = default_indicators();
    let mut tiers = TierTable::default();

    let disabled: HashSet<String> = env_list("DISABLED_INDICATORS")
        .unwrap_or_default()
        .into_iter()
        .collect();
    for indicator in &mut indicators {
        if disabled.contains(&indicator.name) {
            indicator.enabled = false;
        }
    }

    if let Ok(raw) = env::var("INDICATOR_PARAMS") {
        for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .with_context(|| format!("INDICATOR_PARAMS entry '{}' is missing '='", pair))?;
            let (name, param) = key
                .split_once('.')
                .with_context(|| format!("INDICATOR_PARAMS key '{}' must be Name.param", key))?;
            let value: f64 = value
                .trim()
                .parse()
                .with_context(|| format!("Failed to parse INDICATOR_PARAMS value for {}", key))?;

            match indicators.iter_mut().find(|cfg| cfg.name == name.trim()) {
                Some(cfg) => {
                    cfg.params.insert(param.trim().to_string(), value);
                }
                None => bail!("INDICATOR_PARAMS references unknown indicator '{}'", name),
            }
        }
    }

    if let Ok(raw) = env::var("INDICATOR_TIERS") {
        for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, tier) = pair
                .split_once('=')
                .with_context(|| format!("INDICATOR_TIERS entry '{}' is missing '='", pair))?;
            let tier = Tier::from_str(tier.trim()).context("Failed to parse INDICATOR_TIERS")?;
            tiers = tiers.with_tier(name.trim(), tier);
        }
    }

    Ok((indicators, tiers))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_weights_descend() {
        let weights: Vec<f64> = [Tier::Elite, Tier::Strong, Tier::Solid, Tier::Average, Tier::Weak]
            .iter()
            .map(Tier::weight)
            .collect();
        assert_eq!(weights, vec![10.0, 8.0, 5.0, 3.0, 1.0]);
    }

    #[test]
    fn test_unknown_name_uses_default_weight() {
        let table = TierTable::default();
        assert_eq!(table.weight("MACD"), 10.0);
        assert_eq!(table.weight("Ichimoku"), 3.0);
    }

    #[test]
    fn test_defaults_have_tiers() {
        assert!(TierTable::default().validate(&default_indicators()).is_ok());
    }

    #[test]
    fn test_enabled_indicator_without_tier_is_rejected() {
        let mut indicators = default_indicators();
        indicators.push(IndicatorConfig::new("ElliottWave", &[]));

        let err = TierTable::default().validate(&indicators).unwrap_err();
        assert!(err.to_string().contains("ElliottWave"));

        indicators.last_mut().unwrap().enabled = false;
        assert!(TierTable::default().validate(&indicators).is_ok());
    }

    #[test]
    fn test_param_lookup() {
        let cfg = IndicatorConfig::new("RSI", &[("period", 21.0)]);
        assert_eq!(cfg.period("period", 14), 21);
        assert_eq!(cfg.param("overbought", 70.0), 70.0);
    }
}
