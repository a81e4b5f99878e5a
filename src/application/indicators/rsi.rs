use super::{Indicator, RefinedSignal, invalid_params, ramp, require_period};
use crate::config::IndicatorConfig;
use crate::domain::errors::SignalError;
use crate::domain::market::candle::Candle;
use crate::domain::trading::signal::{Direction, IndicatorSignal, SignalStamp};
use ta::Next;
use ta::indicators::RelativeStrengthIndex;

/// Relative strength index with overbought/oversold zones.
///
/// The refined variant also reads RSI momentum: a sharp turn back toward the
/// midline from the weak side counts as a (weaker) signal even before the
/// zone is reached.
#[derive(Debug, Clone)]
pub struct RsiIndicator {
    period: usize,
    overbought: f64,
    oversold: f64,
    slope_window: usize,
    slope_threshold: f64,
}

impl RsiIndicator {
    pub const NAME: &'static str = "RSI";

    pub fn from_config(cfg: &IndicatorConfig) -> Result<Self, SignalError> {
        let period = require_period(Self::NAME, "period", cfg.period("period", 14))?;
        let overbought = cfg.param("overbought", 70.0);
        let oversold = cfg.param("oversold", 30.0);
        if !(0.0 < oversold && oversold < 50.0 && 50.0 < overbought && overbought < 100.0) {
            return Err(SignalError::configuration(format!(
                "{}: need 0 < oversold ({}) < 50 < overbought ({}) < 100",
                Self::NAME, oversold, overbought
            )));
        }
        let slope_window = require_period(Self::NAME, "slope_window", cfg.period("slope_window", 3))?;
        let slope_threshold = cfg.param("slope_threshold", 5.0);
        if !(slope_threshold > 0.0) {
            return Err(SignalError::configuration("RSI.slope_threshold must be positive"));
        }
        RelativeStrengthIndex::new(period).map_err(|e| invalid_params(Self::NAME, e))?;

        Ok(Self {
            period,
            overbought,
            oversold,
            slope_window,
            slope_threshold,
        })
    }

    fn zone_signal(&self, rsi: f64, stamp: SignalStamp) -> IndicatorSignal {
        if rsi <= self.oversold {
            IndicatorSignal::buy(Self::NAME, ramp(rsi, self.oversold, 0.0).max(0.5), rsi, stamp)
        } else if rsi >= self.overbought {
            IndicatorSignal::sell(Self::NAME, ramp(rsi, self.overbought, 100.0).max(0.5), rsi, stamp)
        } else {
            // Most confident about "nothing to do" near the midline
            let half_band = (self.overbought - self.oversold) / 2.0;
            IndicatorSignal::hold(Self::NAME, 1.0 - (rsi - 50.0).abs() / half_band, rsi, stamp)
        }
    }
}

impl Indicator for RsiIndicator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn min_periods(&self) -> usize {
        self.period + 1
    }

    fn calculate(&self, candles: &[Candle]) -> Vec<f64> {
        if candles.len() < self.min_periods() {
            return Vec::new();
        }
        let Ok(mut rsi) = RelativeStrengthIndex::new(self.period) else {
            return Vec::new();
        };

        candles
            .iter()
            .map(|candle| {
                let value = rsi.next(candle.close_f64());
                if value.is_finite() { value } else { 50.0 }
            })
            .skip(self.period)
            .collect()
    }

    fn signal(&self, values: &[f64], _current_price: f64, stamp: SignalStamp) -> IndicatorSignal {
        match values.last() {
            Some(&rsi) => self.zone_signal(rsi, stamp),
            None => IndicatorSignal::hold(Self::NAME, 0.0, 50.0, stamp),
        }
    }

    fn as_refined(&self) -> Option<&dyn RefinedSignal> {
        Some(self)
    }
}

impl RefinedSignal for RsiIndicator {
    fn refined_signal(
        &self,
        values: &[f64],
        current_price: f64,
        stamp: SignalStamp,
    ) -> IndicatorSignal {
        let base = self.signal(values, current_price, stamp);
        if base.direction != Direction::Hold || values.len() <= self.slope_window {
            return base;
        }

        let rsi = base.raw_value;
        let slope = rsi - values[values.len() - 1 - self.slope_window];
        let strength = 0.5 * ramp(slope, 0.0, 2.0 * self.slope_threshold);

        if slope >= self.slope_threshold && rsi < 50.0 {
            IndicatorSignal::buy(Self::NAME, strength, rsi, stamp)
        } else if slope <= -self.slope_threshold && rsi > 50.0 {
            IndicatorSignal::sell(Self::NAME, strength, rsi, stamp)
        } else {
            base
        }
    }
}
