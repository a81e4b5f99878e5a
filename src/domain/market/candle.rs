use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// OHLCV record for one time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Start timestamp of the window (in milliseconds)
    pub timestamp: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    pub fn new(
        timestamp: i64,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Opens a candle from a single trade.
    pub fn from_tick(timestamp: i64, price: Decimal, volume: Decimal) -> Self {
        Self::new(timestamp, price, price, price, price, volume)
    }

    /// Folds one more trade into the candle.
    ///
    /// - Open is unchanged
    /// - High/low widen to include `price`
    /// - Close becomes `price`
    /// - Volume is summed
    pub fn apply_tick(&mut self, price: Decimal, volume: Decimal) {
        if price > self.high {
            self.high = price;
        }
        if price < self.low {
            self.low = price;
        }
        self.close = price;
        self.volume += volume;
    }

    /// `high >= max(open, close)` and `low <= min(open, close)`.
    pub fn is_well_formed(&self) -> bool {
        self.high >= self.open.max(self.close) && self.low <= self.open.min(self.close)
    }

    pub fn close_f64(&self) -> f64 {
        self.close.to_f64().unwrap_or(0.0)
    }

    pub fn high_f64(&self) -> f64 {
        self.high.to_f64().unwrap_or(0.0)
    }

    pub fn low_f64(&self) -> f64 {
        self.low.to_f64().unwrap_or(0.0)
    }

    pub fn open_f64(&self) -> f64 {
        self.open.to_f64().unwrap_or(0.0)
    }

    pub fn volume_f64(&self) -> f64 {
        self.volume.to_f64().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_from_tick_is_flat() {
        let candle = Candle::from_tick(1704067200000, dec!(100.0), dec!(2));
        assert_eq!(candle.open, dec!(100.0));
        assert_eq!(candle.high, dec!(100.0));
        assert_eq!(candle.low, dec!(100.0));
        assert_eq!(candle.close, dec!(100.0));
        assert!(candle.is_well_formed());
    }

    #[test]
    fn test_apply_tick() {
        let mut candle = Candle::from_tick(1704067200000, dec!(100.0), dec!(1));

        candle.apply_tick(dec!(107.0), dec!(1.5));
        candle.apply_tick(dec!(98.0), dec!(0.5));
        candle.apply_tick(dec!(103.0), dec!(1));

        assert_eq!(candle.open, dec!(100.0)); // Unchanged
        assert_eq!(candle.high, dec!(107.0));
        assert_eq!(candle.low, dec!(98.0));
        assert_eq!(candle.close, dec!(103.0));
        assert_eq!(candle.volume, dec!(4.0));
        assert!(candle.is_well_formed());
    }

    #[test]
    fn test_malformed_candle_detected() {
        let candle = Candle::new(0, dec!(100), dec!(99), dec!(98), dec!(100), dec!(1));
        assert!(!candle.is_well_formed());
    }
}
