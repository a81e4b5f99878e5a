//! Indicator capability and the concrete indicators built on `ta`.
//!
//! The aggregator only sees `dyn Indicator`. Optional behaviour (a refined
//! finest-timeframe signal, support/resistance levels) is discovered through
//! the `as_*` capability hooks rather than by inspecting concrete types.

mod bollinger;
mod ema_cross;
mod macd;
mod obv;
mod rsi;
mod stochastic;
mod support_resistance;

pub use bollinger::BollingerIndicator;
pub use ema_cross::EmaCrossIndicator;
pub use macd::MacdIndicator;
pub use obv::ObvIndicator;
pub use rsi::RsiIndicator;
pub use stochastic::StochasticIndicator;
pub use support_resistance::SupportResistanceIndicator;

use crate::config::IndicatorConfig;
use crate::domain::errors::SignalError;
use crate::domain::market::candle::Candle;
use crate::domain::trading::signal::{IndicatorSignal, SignalStamp};
use std::sync::Arc;

pub trait Indicator: Send + Sync {
    fn name(&self) -> &str;

    /// Candles needed before `calculate` yields anything.
    fn min_periods(&self) -> usize;

    /// Raw indicator values, oldest first. Empty when history is too short.
    fn calculate(&self, candles: &[Candle]) -> Vec<f64>;

    /// Opinion from the latest computed values and the live price. Pure.
    fn signal(&self, values: &[f64], current_price: f64, stamp: SignalStamp) -> IndicatorSignal;

    fn as_refined(&self) -> Option<&dyn RefinedSignal> {
        None
    }

    fn as_level_provider(&self) -> Option<&dyn LevelProvider> {
        None
    }
}

/// Sharper variant of an indicator's signal, used on the finest timeframe only.
pub trait RefinedSignal: Send + Sync {
    fn refined_signal(
        &self,
        values: &[f64],
        current_price: f64,
        stamp: SignalStamp,
    ) -> IndicatorSignal;
}

/// Source of support/resistance levels for target and stop placement.
pub trait LevelProvider: Send + Sync {
    fn levels(&self, candles: &[Candle]) -> PriceLevels;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceLevels {
    pub supports: Vec<f64>,
    pub resistances: Vec<f64>,
}

impl PriceLevels {
    pub fn nearest_support_below(&self, price: f64) -> Option<f64> {
        self.supports
            .iter()
            .chain(self.resistances.iter())
            .copied()
            .filter(|level| *level < price)
            .max_by(f64::total_cmp)
    }

    pub fn nearest_resistance_above(&self, price: f64) -> Option<f64> {
        self.resistances
            .iter()
            .chain(self.supports.iter())
            .copied()
            .filter(|level| *level > price)
            .min_by(f64::total_cmp)
    }

    pub fn is_empty(&self) -> bool {
        self.supports.is_empty() && self.resistances.is_empty()
    }
}

/// Builds the enabled indicators, rejecting unknown names and bad parameters.
pub fn build_indicators(configs: &[IndicatorConfig]) -> Result<Vec<Arc<dyn Indicator>>, SignalError> {
    configs
        .iter()
        .filter(|cfg| cfg.enabled)
        .map(build_indicator)
        .collect()
}

pub fn build_indicator(cfg: &IndicatorConfig) -> Result<Arc<dyn Indicator>, SignalError> {
    let indicator: Arc<dyn Indicator> = match cfg.name.as_str() {
        "MACD" => Arc::new(MacdIndicator::from_config(cfg)?),
        "EMA_Cross" => Arc::new(EmaCrossIndicator::from_config(cfg)?),
        "SupportResistance" => Arc::new(SupportResistanceIndicator::from_config(cfg)?),
        "RSI" => Arc::new(RsiIndicator::from_config(cfg)?),
        "Bollinger" => Arc::new(BollingerIndicator::from_config(cfg)?),
        "Stochastic" => Arc::new(StochasticIndicator::from_config(cfg)?),
        "OBV" => Arc::new(ObvIndicator::from_config(cfg)?),
        other => {
            return Err(SignalError::configuration(format!(
                "unknown indicator '{}'",
                other
            )));
        }
    };
    Ok(indicator)
}

fn invalid_params(name: &str, err: impl std::fmt::Debug) -> SignalError {
    SignalError::configuration(format!("invalid parameters for {}: {:?}", name, err))
}

/// Longest window any indicator may ask for.
pub const MAX_PERIOD: usize = 10_000;

fn require_period(name: &str, key: &str, value: usize) -> Result<usize, SignalError> {
    if value == 0 || value > MAX_PERIOD {
        Err(SignalError::configuration(format!(
            "{}.{} must be between 1 and {}, got {}",
            name, key, MAX_PERIOD, value
        )))
    } else {
        Ok(value)
    }
}

/// OHLCV bar for indicators that need more than the close.
fn data_item(candle: &Candle) -> Option<ta::DataItem> {
    ta::DataItem::builder()
        .open(candle.open_f64())
        .high(candle.high_f64())
        .low(candle.low_f64())
        .close(candle.close_f64())
        .volume(candle.volume_f64().max(0.0))
        .build()
        .ok()
}

/// Strength from how far `value` sits beyond `threshold`, reaching 1.0 at `full`.
fn ramp(value: f64, threshold: f64, full: f64) -> f64 {
    let span = (full - threshold).abs();
    if span <= f64::EPSILON {
        return 1.0;
    }
    ((value - threshold).abs() / span).clamp(0.0, 1.0)
}
