use super::{Indicator, data_item, require_period};
use crate::config::IndicatorConfig;
use crate::domain::errors::SignalError;
use crate::domain::market::candle::Candle;
use crate::domain::trading::signal::{IndicatorSignal, SignalStamp};
use ta::Next;
use ta::indicators::OnBalanceVolume;

/// On-balance volume, read as a normalized slope over `lookback` bars.
///
/// The signal is net OBV change divided by the total absolute change in the
/// window, so it lands in [-1, 1] regardless of volume scale.
#[derive(Debug, Clone)]
pub struct ObvIndicator {
    lookback: usize,
    threshold: f64,
}

impl ObvIndicator {
    pub const NAME: &'static str = "OBV";

    pub fn from_config(cfg: &IndicatorConfig) -> Result<Self, SignalError> {
        let lookback = require_period(Self::NAME, "lookback", cfg.period("lookback", 20))?;
        let threshold = cfg.param("threshold", 0.2);
        if !(0.0..1.0).contains(&threshold) {
            return Err(SignalError::configuration(format!(
                "{}: threshold must be in [0, 1), got {}",
                Self::NAME, threshold
            )));
        }
        Ok(Self { lookback, threshold })
    }

    fn slope(&self, values: &[f64]) -> Option<f64> {
        if values.len() <= self.lookback {
            return None;
        }
        let window = &values[values.len() - 1 - self.lookback..];
        let travel: f64 = window.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
        if travel <= f64::EPSILON {
            return Some(0.0);
        }
        Some((window[window.len() - 1] - window[0]) / travel)
    }
}

impl Indicator for ObvIndicator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn min_periods(&self) -> usize {
        self.lookback + 1
    }

    fn calculate(&self, candles: &[Candle]) -> Vec<f64> {
        if candles.len() < self.min_periods() {
            return Vec::new();
        }
        let mut obv = OnBalanceVolume::new();
        candles
            .iter()
            .map(|candle| data_item(candle).map(|item| obv.next(&item)))
            .collect::<Option<Vec<f64>>>()
            .unwrap_or_default()
    }

    fn signal(&self, values: &[f64], _current_price: f64, stamp: SignalStamp) -> IndicatorSignal {
        let Some(slope) = self.slope(values) else {
            return IndicatorSignal::hold(Self::NAME, 0.0, 0.0, stamp);
        };

        if slope > self.threshold {
            IndicatorSignal::buy(Self::NAME, slope, slope, stamp)
        } else if slope < -self.threshold {
            IndicatorSignal::sell(Self::NAME, -slope, slope, stamp)
        } else {
            IndicatorSignal::hold(Self::NAME, 1.0 - slope.abs(), slope, stamp)
        }
    }
}
