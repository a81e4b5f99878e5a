use crate::domain::market::candle::Candle;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Result of offering a candle to a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppendOutcome {
    Appended,
    /// Same timestamp as the tail: the still-open candle was updated in place.
    Replaced,
    /// Older than the tail: out-of-order data, ignored.
    Dropped,
}

/// Append-only candle history for a single timeframe.
///
/// Timestamps are strictly increasing. Only the tail may be replaced, and only
/// by a candle carrying the same timestamp. Once `max_len` is reached the
/// oldest candle is evicted on each append, so the length never decreases.
#[derive(Debug, Clone)]
pub struct CandleSeries {
    candles: VecDeque<Candle>,
    max_len: usize,
}

impl CandleSeries {
    pub fn new(max_len: usize) -> Self {
        Self {
            candles: VecDeque::new(),
            max_len: max_len.max(1),
        }
    }

    pub fn push(&mut self, candle: Candle) -> AppendOutcome {
        let Some(tail) = self.candles.back_mut() else {
            self.candles.push_back(candle);
            return AppendOutcome::Appended;
        };

        if candle.timestamp == tail.timestamp {
            *tail = candle;
            AppendOutcome::Replaced
        } else if candle.timestamp > tail.timestamp {
            if self.candles.len() == self.max_len {
                self.candles.pop_front();
            }
            self.candles.push_back(candle);
            AppendOutcome::Appended
        } else {
            AppendOutcome::Dropped
        }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.back()
    }

    /// Copies out the most recent `count` candles, oldest first.
    pub fn tail(&self, count: usize) -> Vec<Candle> {
        let skip = self.candles.len().saturating_sub(count);
        self.candles.iter().skip(skip).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle_at(timestamp: i64, close: rust_decimal::Decimal) -> Candle {
        Candle::new(timestamp, close, close, close, close, dec!(1))
    }

    #[test]
    fn test_append_replace_drop() {
        let mut series = CandleSeries::new(10);

        assert_eq!(series.push(candle_at(1000, dec!(1))), AppendOutcome::Appended);
        assert_eq!(series.push(candle_at(2000, dec!(2))), AppendOutcome::Appended);
        assert_eq!(series.push(candle_at(2000, dec!(3))), AppendOutcome::Replaced);
        assert_eq!(series.push(candle_at(1500, dec!(4))), AppendOutcome::Dropped);

        assert_eq!(series.len(), 2);
        assert_eq!(series.last().unwrap().close, dec!(3));
    }

    #[test]
    fn test_retention_never_shortens() {
        let mut series = CandleSeries::new(3);
        let mut previous_len = 0;

        for i in 0..10 {
            series.push(candle_at(i * 1000, dec!(1)));
            assert!(series.len() >= previous_len);
            previous_len = series.len();
        }

        assert_eq!(series.len(), 3);
        assert_eq!(series.tail(10).first().unwrap().timestamp, 7000);
    }

    #[test]
    fn test_tail_returns_most_recent_in_order() {
        let mut series = CandleSeries::new(100);
        for i in 0..5 {
            series.push(candle_at(i * 1000, dec!(1)));
        }

        let tail = series.tail(2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].timestamp, 3000);
        assert_eq!(tail[1].timestamp, 4000);
    }
}
