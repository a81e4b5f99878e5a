use super::{Indicator, LevelProvider, PriceLevels, ramp, require_period};
use crate::config::IndicatorConfig;
use crate::domain::errors::SignalError;
use crate::domain::market::candle::Candle;
use crate::domain::trading::signal::{IndicatorSignal, SignalStamp};

/// Position of the close inside the recent high/low range, plus pivot levels.
///
/// Values are 0 at the range low and 1 at the range high. Near the floor the
/// indicator leans Buy, near the ceiling Sell. As a level provider it reports
/// swing highs/lows (`pivot_width` bars each side) from the last `lookback`
/// candles, falling back to the range extremes when no pivot formed.
#[derive(Debug, Clone)]
pub struct SupportResistanceIndicator {
    lookback: usize,
    pivot_width: usize,
    proximity: f64,
}

impl SupportResistanceIndicator {
    pub const NAME: &'static str = "SupportResistance";

    pub fn from_config(cfg: &IndicatorConfig) -> Result<Self, SignalError> {
        let lookback = require_period(Self::NAME, "lookback", cfg.period("lookback", 50))?;
        let pivot_width = require_period(Self::NAME, "pivot_width", cfg.period("pivot_width", 2))?;
        let proximity = cfg.param("proximity", 0.15);
        if !(0.0..0.5).contains(&proximity) {
            return Err(SignalError::configuration(format!(
                "{}: proximity must be in [0, 0.5), got {}",
                Self::NAME, proximity
            )));
        }
        if lookback <= 2 * pivot_width {
            return Err(SignalError::configuration(format!(
                "{}: lookback ({}) must exceed twice the pivot width ({})",
                Self::NAME, lookback, pivot_width
            )));
        }
        Ok(Self {
            lookback,
            pivot_width,
            proximity,
        })
    }

    fn window<'a>(&self, candles: &'a [Candle]) -> &'a [Candle] {
        &candles[candles.len().saturating_sub(self.lookback)..]
    }
}

fn range(candles: &[Candle]) -> Option<(f64, f64)> {
    let low = candles.iter().map(Candle::low_f64).min_by(f64::total_cmp)?;
    let high = candles.iter().map(Candle::high_f64).max_by(f64::total_cmp)?;
    Some((low, high))
}

impl Indicator for SupportResistanceIndicator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn min_periods(&self) -> usize {
        self.lookback
    }

    fn calculate(&self, candles: &[Candle]) -> Vec<f64> {
        if candles.len() < self.min_periods() {
            return Vec::new();
        }
        (self.lookback..=candles.len())
            .filter_map(|end| {
                let window = &candles[end - self.lookback..end];
                let (low, high) = range(window)?;
                let close = window[window.len() - 1].close_f64();
                let width = high - low;
                Some(if width > f64::EPSILON {
                    (close - low) / width
                } else {
                    0.5
                })
            })
            .collect()
    }

    fn signal(&self, values: &[f64], _current_price: f64, stamp: SignalStamp) -> IndicatorSignal {
        let Some(&position) = values.last() else {
            return IndicatorSignal::hold(Self::NAME, 0.0, 0.5, stamp);
        };

        if position <= self.proximity {
            IndicatorSignal::buy(Self::NAME, ramp(position, self.proximity, 0.0), position, stamp)
        } else if position >= 1.0 - self.proximity {
            let strength = ramp(position, 1.0 - self.proximity, 1.0);
            IndicatorSignal::sell(Self::NAME, strength, position, stamp)
        } else {
            IndicatorSignal::hold(Self::NAME, 0.5, position, stamp)
        }
    }

    fn as_level_provider(&self) -> Option<&dyn LevelProvider> {
        Some(self)
    }
}

impl LevelProvider for SupportResistanceIndicator {
    fn levels(&self, candles: &[Candle]) -> PriceLevels {
        let window = self.window(candles);
        let w = self.pivot_width;
        let mut levels = PriceLevels::default();

        if window.len() > 2 * w {
            for i in w..window.len() - w {
                let neighbours = window[i - w..i].iter().chain(&window[i + 1..=i + w]);
                let high = window[i].high_f64();
                let low = window[i].low_f64();
                if neighbours.clone().all(|c| c.high_f64() < high) {
                    levels.resistances.push(high);
                }
                if neighbours.clone().all(|c| c.low_f64() > low) {
                    levels.supports.push(low);
                }
            }
        }

        if let Some((low, high)) = range(window) {
            if levels.supports.is_empty() {
                levels.supports.push(low);
            }
            if levels.resistances.is_empty() {
                levels.resistances.push(high);
            }
        }
        levels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::indicators::test_support::rising;
    use crate::domain::market::timeframe::Timeframe;
    use crate::domain::trading::signal::Direction;
    use rust_decimal::Decimal;

    fn stamp() -> SignalStamp {
        SignalStamp {
            timeframe: Timeframe::FiveMin,
            timestamp: 0,
        }
    }

    fn indicator() -> SupportResistanceIndicator {
        SupportResistanceIndicator::from_config(&IndicatorConfig::new(
            "SupportResistance",
            &[("lookback", 10.0), ("pivot_width", 2.0)],
        ))
        .unwrap()
    }

    #[test]
    fn test_range_position() {
        let ind = indicator();
        let top = ind.calculate(&rising(15));
        assert_eq!(top.len(), 6);
        assert_eq!(ind.signal(&top, 0.0, stamp()).direction, Direction::Sell);

        let bottom = ind.signal(&[0.05], 0.0, stamp());
        assert_eq!(bottom.direction, Direction::Buy);
        assert!(bottom.strength > 0.6);

        assert_eq!(ind.signal(&[0.5], 0.0, stamp()).direction, Direction::Hold);
    }

    #[test]
    fn test_pivot_levels() {
        let ind = indicator();
        // Swing low at 95, swing high at 108
        let bars = [
            (100, 102),
            (98, 100),
            (95, 97),
            (97, 99),
            (99, 101),
            (101, 103),
            (104, 108),
            (103, 106),
            (101, 104),
            (102, 105),
        ];
        let candles: Vec<Candle> = bars
            .iter()
            .enumerate()
            .map(|(i, &(low, high))| {
                let mid = Decimal::from(low + high) / Decimal::from(2);
                Candle::new(
                    i as i64 * 60_000,
                    mid,
                    Decimal::from(high),
                    Decimal::from(low),
                    mid,
                    Decimal::ONE,
                )
            })
            .collect();
        let levels = ind.levels(&candles);

        assert_eq!(levels.supports, vec![95.0]);
        assert_eq!(levels.resistances, vec![108.0]);
        assert_eq!(levels.nearest_support_below(103.0), Some(95.0));
        assert_eq!(levels.nearest_resistance_above(103.0), Some(108.0));
    }

    #[test]
    fn test_trend_without_pivots_uses_range() {
        let ind = indicator();
        let levels = ind.levels(&rising(10));
        assert_eq!(levels.supports.len(), 1);
        assert_eq!(levels.resistances.len(), 1);
        assert!(levels.supports[0] < levels.resistances[0]);
    }

    #[test]
    fn test_lookback_must_fit_pivots() {
        let cfg = IndicatorConfig::new("SupportResistance", &[("lookback", 4.0), ("pivot_width", 2.0)]);
        assert!(SupportResistanceIndicator::from_config(&cfg).is_err());
    }
}
