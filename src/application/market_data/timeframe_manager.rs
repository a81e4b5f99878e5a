use crate::application::market_data::snapshot::MultiTimeframeSnapshot;
use crate::config::TimeframeSettings;
use crate::domain::market::candle::Candle;
use crate::domain::market::candle_series::{AppendOutcome, CandleSeries};
use crate::domain::market::timeframe::Timeframe;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::{trace, warn};

/// Thread-safe repository holding one append-only series per timeframe.
///
/// Writers (`add_candle`) take the lock exclusively; `snapshot`, `is_ready`
/// and the status queries share it.
pub struct TimeframeManager {
    series: RwLock<BTreeMap<Timeframe, CandleSeries>>,
    settings: BTreeMap<Timeframe, TimeframeSettings>,
}

impl TimeframeManager {
    pub fn new(settings: BTreeMap<Timeframe, TimeframeSettings>) -> Self {
        let settings: BTreeMap<Timeframe, TimeframeSettings> = Timeframe::ALL
            .iter()
            .map(|&tf| {
                let s = settings
                    .get(&tf)
                    .copied()
                    .unwrap_or_else(|| TimeframeSettings::defaults_for(tf));
                (tf, s)
            })
            .collect();

        let series = settings
            .iter()
            .map(|(&tf, s)| (tf, CandleSeries::new(s.max_history)))
            .collect();

        Self {
            series: RwLock::new(series),
            settings,
        }
    }

    pub fn settings(&self, timeframe: Timeframe) -> TimeframeSettings {
        self.settings[&timeframe]
    }

    /// Offers a candle to the timeframe's series.
    ///
    /// Same timestamp as the tail replaces it, a later one is appended, an
    /// earlier one is dropped. Malformed candles are dropped too.
    pub async fn add_candle(&self, timeframe: Timeframe, candle: Candle) -> AppendOutcome {
        if !candle.is_well_formed() {
            warn!(
                "TimeframeManager[{}]: rejecting malformed candle at {} (O:{} H:{} L:{} C:{})",
                timeframe, candle.timestamp, candle.open, candle.high, candle.low, candle.close
            );
            return AppendOutcome::Dropped;
        }

        let timestamp = candle.timestamp;
        let mut series = self.series.write().await;
        let outcome = match series.get_mut(&timeframe) {
            Some(s) => s.push(candle),
            None => AppendOutcome::Dropped,
        };

        if outcome == AppendOutcome::Dropped {
            trace!(
                "TimeframeManager[{}]: dropped out-of-order candle at {}",
                timeframe, timestamp
            );
        }
        outcome
    }

    /// Appends a batch in order, returning how many were appended or replaced.
    pub async fn extend(&self, timeframe: Timeframe, candles: Vec<Candle>) -> usize {
        let mut accepted = 0;
        for candle in candles {
            if self.add_candle(timeframe, candle).await != AppendOutcome::Dropped {
                accepted += 1;
            }
        }
        accepted
    }

    /// True once every timeframe holds its minimum candle count.
    pub async fn is_ready(&self) -> bool {
        let series = self.series.read().await;
        Timeframe::ALL
            .iter()
            .all(|tf| series[tf].len() >= self.settings[tf].min_candles)
    }

    pub async fn readiness(&self) -> BTreeMap<Timeframe, bool> {
        let series = self.series.read().await;
        series
            .iter()
            .map(|(tf, s)| (*tf, s.len() >= self.settings[tf].min_candles))
            .collect()
    }

    pub async fn candle_counts(&self) -> BTreeMap<Timeframe, usize> {
        let series = self.series.read().await;
        series.iter().map(|(tf, s)| (*tf, s.len())).collect()
    }

    pub async fn len(&self, timeframe: Timeframe) -> usize {
        self.series.read().await[&timeframe].len()
    }

    /// Copies the most recent `snapshot_depth` candles of every timeframe.
    pub async fn snapshot(&self) -> MultiTimeframeSnapshot {
        let series = self.series.read().await;
        let copied = series
            .iter()
            .map(|(tf, s)| (*tf, s.tail(self.settings[tf].snapshot_depth)))
            .collect();
        MultiTimeframeSnapshot::new(copied, Utc::now().timestamp_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_timeframe_settings;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::time::Duration;

    fn small_settings(min_candles: usize) -> BTreeMap<Timeframe, TimeframeSettings> {
        Timeframe::ALL
            .iter()
            .map(|&tf| {
                (
                    tf,
                    TimeframeSettings {
                        min_candles,
                        snapshot_depth: 3,
                        max_history: 10,
                        poll_interval: Duration::from_millis(10),
                    },
                )
            })
            .collect()
    }

    fn candle_at(timestamp: i64, close: Decimal) -> Candle {
        Candle::new(timestamp, close, close + dec!(1), close - dec!(1), close, dec!(1))
    }

    #[tokio::test]
    async fn test_add_candle_ordering_rules() {
        let manager = TimeframeManager::new(default_timeframe_settings());
        let tf = Timeframe::OneMin;

        assert_eq!(manager.add_candle(tf, candle_at(60_000, dec!(10))).await, AppendOutcome::Appended);
        assert_eq!(manager.add_candle(tf, candle_at(120_000, dec!(11))).await, AppendOutcome::Appended);
        assert_eq!(manager.add_candle(tf, candle_at(120_000, dec!(12))).await, AppendOutcome::Replaced);
        assert_eq!(manager.add_candle(tf, candle_at(60_000, dec!(13))).await, AppendOutcome::Dropped);

        assert_eq!(manager.len(tf).await, 2);
        let snapshot = manager.snapshot().await;
        assert_eq!(snapshot.last_close(tf), Some(dec!(12)));
    }

    #[tokio::test]
    async fn test_malformed_candle_dropped() {
        let manager = TimeframeManager::new(default_timeframe_settings());
        let bad = Candle::new(0, dec!(10), dec!(9), dec!(8), dec!(10), dec!(1));
        assert_eq!(manager.add_candle(Timeframe::OneMin, bad).await, AppendOutcome::Dropped);
        assert_eq!(manager.len(Timeframe::OneMin).await, 0);
    }

    #[tokio::test]
    async fn test_readiness_requires_every_timeframe() {
        let manager = TimeframeManager::new(small_settings(2));

        for tf in Timeframe::ALL {
            if tf == Timeframe::FourHour {
                continue;
            }
            manager.add_candle(tf, candle_at(0, dec!(10))).await;
            manager.add_candle(tf, candle_at(1000, dec!(10))).await;
        }
        assert!(!manager.is_ready().await);
        assert!(!manager.readiness().await[&Timeframe::FourHour]);

        manager.add_candle(Timeframe::FourHour, candle_at(0, dec!(10))).await;
        manager.add_candle(Timeframe::FourHour, candle_at(1000, dec!(10))).await;
        assert!(manager.is_ready().await);

        // Stays ready as history keeps growing past the retention cap
        for i in 2..30 {
            manager.add_candle(Timeframe::OneMin, candle_at(i * 1000, dec!(10))).await;
            assert!(manager.is_ready().await);
        }
    }

    #[tokio::test]
    async fn test_snapshot_copies_most_recent_depth() {
        let manager = TimeframeManager::new(small_settings(1));
        for i in 0..6 {
            manager
                .add_candle(Timeframe::FiveMin, candle_at(i * 1000, Decimal::from(i)))
                .await;
        }

        let snapshot = manager.snapshot().await;
        let candles = snapshot.candles(Timeframe::FiveMin);
        assert_eq!(candles.len(), 3);
        assert_eq!(candles[0].timestamp, 3000);
        assert_eq!(candles[2].timestamp, 5000);

        // Later writes do not leak into an existing snapshot
        manager.add_candle(Timeframe::FiveMin, candle_at(9000, dec!(99))).await;
        assert_eq!(snapshot.last_close(Timeframe::FiveMin), Some(dec!(5)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_keep_series_monotonic() {
        let manager = Arc::new(TimeframeManager::new(small_settings(1)));

        let mut handles = Vec::new();
        for writer in 0..4i64 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..50i64 {
                    let ts = (i * 4 + writer) * 1000;
                    manager.add_candle(Timeframe::OneMin, candle_at(ts, dec!(10))).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let snapshot = manager.snapshot().await;
        let candles = snapshot.candles(Timeframe::OneMin);
        assert!(candles.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }
}
