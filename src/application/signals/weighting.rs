//! Tier-weighted voting over indicator opinions.

use crate::config::{AggregationConfig, TierTable};
use crate::domain::trading::signal::{Direction, IndicatorSignal};

/// Per-bucket sums of one voting pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BiasBreakdown {
    pub buy_weight: f64,
    pub sell_weight: f64,
    pub hold_weight: f64,
    pub buy_count: usize,
    pub sell_count: usize,
    pub hold_count: usize,
    /// Sum of unweighted strengths, for averaging
    pub strength_sum: f64,
}

impl BiasBreakdown {
    pub fn from_signals<'a>(
        signals: impl IntoIterator<Item = &'a IndicatorSignal>,
        tiers: &TierTable,
    ) -> Self {
        let mut breakdown = Self::default();
        for signal in signals {
            let weighted = signal.strength * tiers.weight(&signal.name);
            breakdown.strength_sum += signal.strength;
            match signal.direction {
                Direction::Buy => {
                    breakdown.buy_weight += weighted;
                    breakdown.buy_count += 1;
                }
                Direction::Sell => {
                    breakdown.sell_weight += weighted;
                    breakdown.sell_count += 1;
                }
                Direction::Hold => {
                    breakdown.hold_weight += weighted;
                    breakdown.hold_count += 1;
                }
            }
        }
        breakdown
    }

    pub fn total_count(&self) -> usize {
        self.buy_count + self.sell_count + self.hold_count
    }

    /// Buy plus sell weight. Hold never votes on direction.
    pub fn active_weight(&self) -> f64 {
        self.buy_weight + self.sell_weight
    }

    /// `(buy - sell) / active * 100`, 0 when nothing directional voted.
    pub fn bias(&self) -> f64 {
        let active = self.active_weight();
        if active <= 0.0 {
            return 0.0;
        }
        (self.buy_weight - self.sell_weight) / active * 100.0
    }

    /// Share of all weight that voted Hold.
    pub fn hold_share(&self) -> f64 {
        let total = self.active_weight() + self.hold_weight;
        if total <= 0.0 {
            return 0.0;
        }
        self.hold_weight / total
    }

    pub fn average_strength(&self) -> f64 {
        match self.total_count() {
            0 => 0.0,
            n => self.strength_sum / n as f64,
        }
    }
}

/// Scales down a bias beyond the extreme threshold (strict).
pub fn dampen_extreme(bias: f64, config: &AggregationConfig) -> f64 {
    if bias.abs() > config.extreme_bias_threshold {
        bias * config.extreme_bias_dampening
    } else {
        bias
    }
}

pub fn direction_for(bias: f64, config: &AggregationConfig) -> Direction {
    if bias > config.neutral_threshold {
        Direction::Buy
    } else if bias < -config.neutral_threshold {
        Direction::Sell
    } else {
        Direction::Hold
    }
}

/// Piecewise-linear confidence ramp on |bias|.
///
/// 0 maps to 0, `neutral` to `confidence_at_neutral`, `strong` to
/// `confidence_at_strong` and 100 to `confidence_max`.
pub fn confidence_ramp(bias: f64, config: &AggregationConfig) -> f64 {
    let x = bias.abs().min(100.0);
    let points = [
        (0.0, 0.0),
        (config.neutral_threshold, config.confidence_at_neutral),
        (config.strong_threshold, config.confidence_at_strong),
        (100.0, config.confidence_max),
    ];

    for pair in points.windows(2) {
        let ((x0, y0), (x1, y1)) = (pair[0], pair[1]);
        if x <= x1 {
            if x1 - x0 <= f64::EPSILON {
                return y1;
            }
            return y0 + (x - x0) / (x1 - x0) * (y1 - y0);
        }
    }
    config.confidence_max
}

/// Final confidence: ramp, consensus boost, hold dampening, clamped to [0, 1].
pub fn confidence(bias: f64, consensus: bool, hold_share: f64, config: &AggregationConfig) -> f64 {
    let mut confidence = confidence_ramp(bias, config);
    if consensus {
        confidence *= config.consensus_boost;
    }
    confidence *= 1.0 - config.hold_dampening * hold_share;
    confidence.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::timeframe::Timeframe;
    use crate::domain::trading::signal::SignalStamp;

    const STAMP: SignalStamp = SignalStamp {
        timeframe: Timeframe::OneMin,
        timestamp: 0,
    };

    fn signal(name: &str, direction: Direction, strength: f64) -> IndicatorSignal {
        IndicatorSignal::new(name, direction, strength, 0.0, STAMP)
    }

    #[test]
    fn test_bias_is_symmetric() {
        let tiers = TierTable::default();
        let up = [signal("MACD", Direction::Buy, 0.8), signal("RSI", Direction::Sell, 0.4)];
        let down = [signal("MACD", Direction::Sell, 0.8), signal("RSI", Direction::Buy, 0.4)];

        let b_up = BiasBreakdown::from_signals(&up, &tiers).bias();
        let b_down = BiasBreakdown::from_signals(&down, &tiers).bias();
        assert!((b_up + b_down).abs() < 1e-9);
        assert!(b_up > 0.0);
    }

    #[test]
    fn test_pure_hold_is_neutral() {
        let tiers = TierTable::default();
        let holds = [signal("MACD", Direction::Hold, 1.0), signal("RSI", Direction::Hold, 0.9)];
        let breakdown = BiasBreakdown::from_signals(&holds, &tiers);

        assert_eq!(breakdown.bias(), 0.0);
        assert_eq!(breakdown.hold_share(), 1.0);
        assert_eq!(direction_for(breakdown.bias(), &AggregationConfig::default()), Direction::Hold);
    }

    #[test]
    fn test_extreme_dampening_is_strict() {
        let config = AggregationConfig::default();
        assert!((dampen_extreme(100.0, &config) - 30.0).abs() < 1e-9);
        assert!((dampen_extreme(-100.0, &config) + 30.0).abs() < 1e-9);
        assert_eq!(dampen_extreme(90.0, &config), 90.0);
        assert_eq!(dampen_extreme(-45.0, &config), -45.0);
    }

    #[test]
    fn test_direction_thresholds() {
        let config = AggregationConfig::default();
        assert_eq!(direction_for(15.0, &config), Direction::Hold);
        assert_eq!(direction_for(15.1, &config), Direction::Buy);
        assert_eq!(direction_for(-15.1, &config), Direction::Sell);
    }

    #[test]
    fn test_confidence_ramp_points() {
        let config = AggregationConfig::default();
        assert_eq!(confidence_ramp(0.0, &config), 0.0);
        assert!((confidence_ramp(15.0, &config) - 0.5).abs() < 1e-9);
        assert!((confidence_ramp(-40.0, &config) - 0.7).abs() < 1e-9);
        assert!((confidence_ramp(100.0, &config) - 0.95).abs() < 1e-9);
        assert!((confidence_ramp(70.0, &config) - 0.825).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_adjustments() {
        let config = AggregationConfig::default();
        let base = confidence(40.0, false, 0.0, &config);
        assert!((confidence(40.0, true, 0.0, &config) - base * 1.1).abs() < 1e-9);
        assert!((confidence(40.0, false, 0.5, &config) - base * 0.85).abs() < 1e-9);
        // Boost cannot push past 1
        assert!(confidence(100.0, true, 0.0, &config) <= 1.0);
    }

    #[test]
    fn test_unknown_name_uses_default_weight() {
        let tiers = TierTable::default();
        let breakdown =
            BiasBreakdown::from_signals(&[signal("Custom", Direction::Buy, 1.0)], &tiers);
        assert_eq!(breakdown.buy_weight, 3.0);
    }
}
