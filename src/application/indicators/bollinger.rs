use super::{Indicator, invalid_params, ramp, require_period};
use crate::config::IndicatorConfig;
use crate::domain::errors::SignalError;
use crate::domain::market::candle::Candle;
use crate::domain::trading::signal::{IndicatorSignal, SignalStamp};
use ta::Next;
use ta::indicators::BollingerBands;

/// Bollinger %B: 0 at the lower band, 1 at the upper band.
#[derive(Debug, Clone)]
pub struct BollingerIndicator {
    period: usize,
    std_dev: f64,
    lower: f64,
    upper: f64,
}

impl BollingerIndicator {
    pub const NAME: &'static str = "Bollinger";

    pub fn from_config(cfg: &IndicatorConfig) -> Result<Self, SignalError> {
        let period = require_period(Self::NAME, "period", cfg.period("period", 20))?;
        let std_dev = cfg.param("std_dev", 2.0);
        let lower = cfg.param("lower", 0.2);
        let upper = cfg.param("upper", 0.8);
        if !(std_dev > 0.0) {
            return Err(SignalError::configuration("Bollinger.std_dev must be positive"));
        }
        if lower >= upper {
            return Err(SignalError::configuration(format!(
                "{}: lower ({}) must be below upper ({})",
                Self::NAME, lower, upper
            )));
        }
        BollingerBands::new(period, std_dev).map_err(|e| invalid_params(Self::NAME, e))?;

        Ok(Self {
            period,
            std_dev,
            lower,
            upper,
        })
    }
}

impl Indicator for BollingerIndicator {
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
        let Ok(mut bands) = BollingerBands::new(self.period, self.std_dev) else {
            return Vec::new();
        };

        candles
            .iter()
            .map(|candle| {
                let close = candle.close_f64();
                let out = bands.next(close);
                let width = out.upper - out.lower;
                if width.is_finite() && width > close.abs().max(1.0) * 1e-9 {
                    (close - out.lower) / width
                } else {
                    0.5
                }
            })
            .skip(self.period - 1)
            .collect()
    }

    fn signal(&self, values: &[f64], _current_price: f64, stamp: SignalStamp) -> IndicatorSignal {
        let Some(&percent_b) = values.last() else {
            return IndicatorSignal::hold(Self::NAME, 0.0, 0.5, stamp);
        };

        if percent_b <= self.lower {
            IndicatorSignal::buy(Self::NAME, ramp(percent_b, self.lower, 0.0), percent_b, stamp)
        } else if percent_b >= self.upper {
            IndicatorSignal::sell(Self::NAME, ramp(percent_b, self.upper, 1.0), percent_b, stamp)
        } else {
            let strength = 1.0 - (percent_b - 0.5).abs() * 2.0;
            IndicatorSignal::hold(Self::NAME, strength, percent_b, stamp)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::indicators::test_support::{candles_from_closes, falling, rising};
    use crate::domain::market::timeframe::Timeframe;
    use crate::domain::trading::signal::Direction;

    fn stamp() -> SignalStamp {
        SignalStamp {
            timeframe: Timeframe::FifteenMin,
            timestamp: 0,
        }
    }

    fn indicator() -> BollingerIndicator {
        BollingerIndicator::from_config(&IndicatorConfig::new("Bollinger", &[])).unwrap()
    }

    #[test]
    fn test_band_edges() {
        let ind = indicator();
        let up = ind.calculate(&rising(30));
        assert_eq!(up.len(), 11);
        assert_eq!(ind.signal(&up, 0.0, stamp()).direction, Direction::Sell);

        let down = ind.calculate(&falling(30));
        assert_eq!(ind.signal(&down, 0.0, stamp()).direction, Direction::Buy);
    }

    #[test]
    fn test_flat_prices_sit_mid_band() {
        let ind = indicator();
        let flat = ind.calculate(&candles_from_closes(&[50.0; 25]));
        assert!(flat.iter().all(|v| (*v - 0.5).abs() < 1e-9));
        let signal = ind.signal(&flat, 50.0, stamp());
        assert_eq!(signal.direction, Direction::Hold);
        assert!(signal.strength > 0.99);
    }

    #[test]
    fn test_price_below_lower_band_is_full_strength() {
        let signal = indicator().signal(&[-0.3], 0.0, stamp());
        assert_eq!(signal.direction, Direction::Buy);
        assert_eq!(signal.strength, 1.0);
    }
}
