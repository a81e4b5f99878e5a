use super::{Indicator, invalid_params, require_period};
use crate::config::IndicatorConfig;
use crate::domain::errors::SignalError;
use crate::domain::market::candle::Candle;
use crate::domain::trading::signal::{IndicatorSignal, SignalStamp};
use ta::Next;
use ta::indicators::ExponentialMovingAverage;

/// Fast/slow EMA spread, expressed in percent of the slow EMA.
#[derive(Debug, Clone)]
pub struct EmaCrossIndicator {
    fast: usize,
    slow: usize,
    /// Spread (in %) at which strength saturates
    full_spread_pct: f64,
}

impl EmaCrossIndicator {
    pub const NAME: &'static str = "EMA_Cross";

    pub fn from_config(cfg: &IndicatorConfig) -> Result<Self, SignalError> {
        let fast = require_period(Self::NAME, "fast", cfg.period("fast", 20))?;
        let slow = require_period(Self::NAME, "slow", cfg.period("slow", 50))?;
        if fast >= slow {
            return Err(SignalError::configuration(format!(
                "{}: fast period ({}) must be below slow period ({})",
                Self::NAME, fast, slow
            )));
        }
        ExponentialMovingAverage::new(slow).map_err(|e| invalid_params(Self::NAME, e))?;

        let full_spread_pct = cfg.param("full_spread_pct", 1.0);
        if !(full_spread_pct > 0.0) {
            return Err(SignalError::configuration(
                "EMA_Cross.full_spread_pct must be positive",
            ));
        }

        Ok(Self {
            fast,
            slow,
            full_spread_pct,
        })
    }
}

impl Indicator for EmaCrossIndicator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn min_periods(&self) -> usize {
        self.slow
    }

    fn calculate(&self, candles: &[Candle]) -> Vec<f64> {
        if candles.len() < self.min_periods() {
            return Vec::new();
        }
        let (Ok(mut fast), Ok(mut slow)) = (
            ExponentialMovingAverage::new(self.fast),
            ExponentialMovingAverage::new(self.slow),
        ) else {
            return Vec::new();
        };

        candles
            .iter()
            .map(|candle| {
                let close = candle.close_f64();
                let f = fast.next(close);
                let s = slow.next(close);
                if s.abs() > f64::EPSILON {
                    (f - s) / s.abs() * 100.0
                } else {
                    0.0
                }
            })
            .skip(self.slow - 1)
            .collect()
    }

    fn signal(&self, values: &[f64], _current_price: f64, stamp: SignalStamp) -> IndicatorSignal {
        let Some(&spread) = values.last() else {
            return IndicatorSignal::hold(Self::NAME, 0.0, 0.0, stamp);
        };

        let mut strength = (spread.abs() / self.full_spread_pct).min(1.0);
        // A fresh cross counts for more than a stale one
        if let [.., prev, _] = values
            && prev.signum() != spread.signum()
        {
            strength = (strength + 0.5).min(1.0);
        }

        if spread > 0.0 {
            IndicatorSignal::buy(Self::NAME, strength, spread, stamp)
        } else if spread < 0.0 {
            IndicatorSignal::sell(Self::NAME, strength, spread, stamp)
        } else {
            IndicatorSignal::hold(Self::NAME, 0.5, spread, stamp)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::indicators::test_support::{falling, rising};
    use crate::domain::market::timeframe::Timeframe;
    use crate::domain::trading::signal::Direction;

    fn indicator() -> EmaCrossIndicator {
        EmaCrossIndicator::from_config(&IndicatorConfig::new(
            "EMA_Cross",
            &[("fast", 5.0), ("slow", 10.0)],
        ))
        .unwrap()
    }

    fn stamp() -> SignalStamp {
        SignalStamp {
            timeframe: Timeframe::FiveMin,
            timestamp: 0,
        }
    }

    #[test]
    fn test_short_history_yields_nothing() {
        assert!(indicator().calculate(&rising(9)).is_empty());
        assert_eq!(indicator().calculate(&rising(10)).len(), 1);
    }

    #[test]
    fn test_trend_direction() {
        let ind = indicator();
        let up = ind.calculate(&rising(40));
        assert_eq!(ind.signal(&up, 140.0, stamp()).direction, Direction::Buy);

        let down = ind.calculate(&falling(40));
        assert_eq!(ind.signal(&down, 260.0, stamp()).direction, Direction::Sell);
    }

    #[test]
    fn test_fresh_cross_boosts_strength() {
        let ind = indicator();
        let stale = ind.signal(&[0.1, 0.1], 0.0, stamp());
        let fresh = ind.signal(&[-0.1, 0.1], 0.0, stamp());
        assert!(fresh.strength > stale.strength);
    }

    #[test]
    fn test_fast_must_be_below_slow() {
        let cfg = IndicatorConfig::new("EMA_Cross", &[("fast", 50.0), ("slow", 20.0)]);
        assert!(EmaCrossIndicator::from_config(&cfg).is_err());
    }
}
