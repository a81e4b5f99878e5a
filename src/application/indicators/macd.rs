use super::{Indicator, invalid_params, require_period};
use crate::config::IndicatorConfig;
use crate::domain::errors::SignalError;
use crate::domain::market::candle::Candle;
use crate::domain::trading::signal::{IndicatorSignal, SignalStamp};
use ta::Next;
use ta::indicators::MovingAverageConvergenceDivergence;

/// Histogram magnitudes below this are rounding noise.
const DEAD_ZONE: f64 = 1e-9;

/// MACD histogram. Strength is the latest bar relative to the largest recent bar.
#[derive(Debug, Clone)]
pub struct MacdIndicator {
    fast: usize,
    slow: usize,
    signal: usize,
    /// Bars used to normalize histogram magnitude
    norm_window: usize,
}

impl MacdIndicator {
    pub const NAME: &'static str = "MACD";

    pub fn from_config(cfg: &IndicatorConfig) -> Result<Self, SignalError> {
        let fast = require_period(Self::NAME, "fast", cfg.period("fast", 12))?;
        let slow = require_period(Self::NAME, "slow", cfg.period("slow", 26))?;
        let signal = require_period(Self::NAME, "signal", cfg.period("signal", 9))?;
        let norm_window = require_period(Self::NAME, "norm_window", cfg.period("norm_window", 50))?;
        if fast >= slow {
            return Err(SignalError::configuration(format!(
                "{}: fast period ({}) must be below slow period ({})",
                Self::NAME, fast, slow
            )));
        }
        MovingAverageConvergenceDivergence::new(fast, slow, signal)
            .map_err(|e| invalid_params(Self::NAME, e))?;

        Ok(Self {
            fast,
            slow,
            signal,
            norm_window,
        })
    }
}

impl Indicator for MacdIndicator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn min_periods(&self) -> usize {
        self.slow + self.signal
    }

    fn calculate(&self, candles: &[Candle]) -> Vec<f64> {
        if candles.len() < self.min_periods() {
            return Vec::new();
        }
        let Ok(mut macd) = MovingAverageConvergenceDivergence::new(self.fast, self.slow, self.signal)
        else {
            return Vec::new();
        };

        candles
            .iter()
            .map(|candle| macd.next(candle.close_f64()).histogram)
            .skip(self.min_periods() - 1)
            .collect()
    }

    fn signal(&self, values: &[f64], _current_price: f64, stamp: SignalStamp) -> IndicatorSignal {
        let Some(&histogram) = values.last() else {
            return IndicatorSignal::hold(Self::NAME, 0.0, 0.0, stamp);
        };

        let start = values.len().saturating_sub(self.norm_window);
        let peak = values[start..]
            .iter()
            .map(|v| v.abs())
            .fold(0.0_f64, f64::max);
        let strength = if peak > 0.0 { histogram.abs() / peak } else { 0.0 };

        if histogram.abs() < DEAD_ZONE {
            IndicatorSignal::hold(Self::NAME, 0.5, histogram, stamp)
        } else if histogram > 0.0 {
            IndicatorSignal::buy(Self::NAME, strength, histogram, stamp)
        } else {
            IndicatorSignal::sell(Self::NAME, strength, histogram, stamp)
        }
    }
}
