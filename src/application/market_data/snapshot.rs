use crate::domain::market::candle::Candle;
use crate::domain::market::timeframe::Timeframe;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Immutable copy of the most recent candles of every timeframe.
///
/// Built under the manager's read lock and handed to the aggregator, so
/// indicator math never runs while the lock is held.
#[derive(Debug, Clone, Default)]
pub struct MultiTimeframeSnapshot {
    series: BTreeMap<Timeframe, Vec<Candle>>,
    taken_at: i64,
}

impl MultiTimeframeSnapshot {
    pub fn new(series: BTreeMap<Timeframe, Vec<Candle>>, taken_at: i64) -> Self {
        Self { series, taken_at }
    }

    /// Builder-style helper, mostly for assembling fixtures.
    pub fn with_candles(mut self, timeframe: Timeframe, candles: Vec<Candle>) -> Self {
        self.series.insert(timeframe, candles);
        self
    }

    /// Candles for `timeframe`, oldest first. Empty when none were captured.
    pub fn candles(&self, timeframe: Timeframe) -> &[Candle] {
        self.series
            .get(&timeframe)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self, timeframe: Timeframe) -> usize {
        self.candles(timeframe).len()
    }

    pub fn is_empty(&self, timeframe: Timeframe) -> bool {
        self.candles(timeframe).is_empty()
    }

    pub fn last_close(&self, timeframe: Timeframe) -> Option<Decimal> {
        self.candles(timeframe).last().map(|candle| candle.close)
    }

    pub fn taken_at(&self) -> i64 {
        self.taken_at
    }
}
