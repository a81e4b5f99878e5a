use super::{Indicator, data_item, invalid_params, ramp, require_period};
use crate::config::IndicatorConfig;
use crate::domain::errors::SignalError;
use crate::domain::market::candle::Candle;
use crate::domain::trading::signal::{IndicatorSignal, SignalStamp};
use ta::Next;
use ta::indicators::SlowStochastic;

/// Slow stochastic %K on high/low/close, 0..=100.
#[derive(Debug, Clone)]
pub struct StochasticIndicator {
    period: usize,
    smoothing: usize,
    overbought: f64,
    oversold: f64,
}

impl StochasticIndicator {
    pub const NAME: &'static str = "Stochastic";

    pub fn from_config(cfg: &IndicatorConfig) -> Result<Self, SignalError> {
        let period = require_period(Self::NAME, "period", cfg.period("period", 14))?;
        let smoothing = require_period(Self::NAME, "smoothing", cfg.period("smoothing", 3))?;
        let overbought = cfg.param("overbought", 80.0);
        let oversold = cfg.param("oversold", 20.0);
        if !(0.0 <= oversold && oversold < overbought && overbought <= 100.0) {
            return Err(SignalError::configuration(format!(
                "{}: invalid zones oversold={} overbought={}",
                Self::NAME, oversold, overbought
            )));
        }
        SlowStochastic::new(period, smoothing).map_err(|e| invalid_params(Self::NAME, e))?;

        Ok(Self {
            period,
            smoothing,
            overbought,
            oversold,
        })
    }
}

impl Indicator for StochasticIndicator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn min_periods(&self) -> usize {
        self.period
    }

    fn calculate(&self, candles: &[Candle]) -> Vec<f64> {
        if candles.len() < self.min_periods() {
            return Vec::new();
        }
        let Ok(mut stoch) = SlowStochastic::new(self.period, self.smoothing) else {
            return Vec::new();
        };

        let mut values = Vec::with_capacity(candles.len());
        for candle in candles {
            // A bar the builder rejects would leave a gap in the window
            let Some(item) = data_item(candle) else {
                return Vec::new();
            };
            let k = stoch.next(&item);
            values.push(if k.is_finite() { k } else { 50.0 });
        }
        values.split_off(self.period - 1)
    }

    fn signal(&self, values: &[f64], _current_price: f64, stamp: SignalStamp) -> IndicatorSignal {
        let Some(&k) = values.last() else {
            return IndicatorSignal::hold(Self::NAME, 0.0, 50.0, stamp);
        };

        if k <= self.oversold {
            IndicatorSignal::buy(Self::NAME, ramp(k, self.oversold, 0.0).max(0.5), k, stamp)
        } else if k >= self.overbought {
            IndicatorSignal::sell(Self::NAME, ramp(k, self.overbought, 100.0).max(0.5), k, stamp)
        } else {
            IndicatorSignal::hold(Self::NAME, 0.5, k, stamp)
        }
    }
}
