use crate::domain::market::timeframe::Timeframe;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Buy => write!(f, "BUY"),
            Direction::Sell => write!(f, "SELL"),
            Direction::Hold => write!(f, "HOLD"),
        }
    }
}

/// Where and when an indicator opinion was formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalStamp {
    pub timeframe: Timeframe,
    pub timestamp: i64,
}

/// One indicator's opinion at a point in time. Recomputed on every pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSignal {
    pub name: String,
    pub timeframe: Timeframe,
    pub direction: Direction,
    /// Clamped to [0, 1]
    pub strength: f64,
    pub raw_value: f64,
    pub timestamp: i64,
}

impl IndicatorSignal {
    pub fn new(
        name: impl Into<String>,
        direction: Direction,
        strength: f64,
        raw_value: f64,
        stamp: SignalStamp,
    ) -> Self {
        Self {
            name: name.into(),
            timeframe: stamp.timeframe,
            direction,
            strength: if strength.is_finite() {
                strength.clamp(0.0, 1.0)
            } else {
                0.0
            },
            raw_value,
            timestamp: stamp.timestamp,
        }
    }

    pub fn buy(name: impl Into<String>, strength: f64, raw_value: f64, stamp: SignalStamp) -> Self {
        Self::new(name, Direction::Buy, strength, raw_value, stamp)
    }

    pub fn sell(name: impl Into<String>, strength: f64, raw_value: f64, stamp: SignalStamp) -> Self {
        Self::new(name, Direction::Sell, strength, raw_value, stamp)
    }

    pub fn hold(name: impl Into<String>, strength: f64, raw_value: f64, stamp: SignalStamp) -> Self {
        Self::new(name, Direction::Hold, strength, raw_value, stamp)
    }
}

/// The engine's aggregated decision for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingSignal {
    pub symbol: String,
    pub direction: Direction,
    /// Clamped to [0, 1]
    pub confidence: f64,
    /// Final bias in [-100, 100] after dampening and consensus adjustments
    pub bias: f64,
    pub consensus: bool,
    pub reasoning: String,
    pub indicators: Vec<IndicatorSignal>,
    pub target_price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub timestamp: i64,
}

impl TradingSignal {
    pub fn is_actionable(&self) -> bool {
        self.direction != Direction::Hold
    }
}

impl fmt::Display for TradingSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} conf={:.2} bias={:+.1}",
            self.symbol, self.direction, self.confidence, self.bias
        )
    }
}
