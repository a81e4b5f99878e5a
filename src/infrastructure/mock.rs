use crate::domain::market::candle::Candle;
use crate::domain::market::timeframe::Timeframe;
use crate::domain::ports::{MarketDataProvider, Tick};
use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::{self, Receiver};
use tracing::{debug, info};

/// Random-walk market data for demos and tests.
///
/// History is deterministic for a given seed and timeframe. The live stream
/// keeps walking from `base_price` until the receiver is dropped.
#[derive(Debug)]
pub struct MockMarketDataProvider {
    base_price: f64,
    /// Per-step relative move, e.g. 0.002 for 0.2%
    volatility: f64,
    tick_interval: Duration,
    seed: u64,
    /// Remaining `historical_candles` calls that fail before succeeding
    failures: AtomicU32,
    /// Cap on candles returned per request, to simulate short history
    history_cap: Option<usize>,
    streaming: bool,
}

impl Default for MockMarketDataProvider {
    fn default() -> Self {
        Self::new(96_000.0)
    }
}

impl MockMarketDataProvider {
    pub fn new(base_price: f64) -> Self {
        Self {
            base_price,
            volatility: 0.002,
            tick_interval: Duration::from_millis(500),
            seed: 42,
            failures: AtomicU32::new(0),
            history_cap: None,
            streaming: true,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_volatility(mut self, volatility: f64) -> Self {
        self.volatility = volatility;
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// The next `count` historical requests fail.
    pub fn with_failures(self, count: u32) -> Self {
        self.failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn with_history_cap(mut self, cap: usize) -> Self {
        self.history_cap = Some(cap);
        self
    }

    /// Keep the tick stream open but silent.
    pub fn without_ticks(mut self) -> Self {
        self.streaming = false;
        self
    }

    fn decimal(value: f64) -> Decimal {
        Decimal::from_f64(value).unwrap_or_default().round_dp(2)
    }

    fn step(rng: &mut StdRng, price: f64, volatility: f64) -> f64 {
        let next = price * (1.0 + rng.random_range(-1.0..=1.0) * volatility);
        next.max(0.01)
    }

    /// `limit` closed candles ending just before the current period.
    fn generate_history(&self, timeframe: Timeframe, limit: usize) -> Vec<Candle> {
        let mut rng = StdRng::seed_from_u64(self.seed ^ timeframe.to_minutes());
        let period_ms = timeframe.to_seconds() * 1000;
        let current_start = timeframe.period_start(Utc::now().timestamp_millis());
        // Scale moves with the candle span so coarser candles range wider
        let volatility = self.volatility * (timeframe.to_minutes() as f64).sqrt();

        let mut close = self.base_price;
        (0..limit)
            .map(|i| {
                let open = close;
                close = Self::step(&mut rng, open, volatility);
                let high = open.max(close) * (1.0 + rng.random::<f64>() * volatility / 2.0);
                let low = open.min(close) * (1.0 - rng.random::<f64>() * volatility / 2.0);
                let volume = rng.random_range(1.0..10.0) * timeframe.to_minutes() as f64;
                let timestamp = current_start - (limit - i) as i64 * period_ms;
                Candle::new(
                    timestamp,
                    Self::decimal(open),
                    Self::decimal(high),
                    Self::decimal(low),
                    Self::decimal(close),
                    Self::decimal(volume),
                )
            })
            .collect()
    }
}

#[async_trait]
impl MarketDataProvider for MockMarketDataProvider {
    async fn historical_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let should_fail = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            bail!("MockMarketDataProvider: simulated outage for {} {}", symbol, timeframe);
        }

        let limit = self.history_cap.map_or(limit, |cap| limit.min(cap));
        debug!(
            "MockMarketDataProvider: {} {} candles for {}",
            limit, timeframe, symbol
        );
        Ok(self.generate_history(timeframe, limit))
    }

    async fn subscribe_ticks(&self, symbol: &str) -> Result<Receiver<Tick>> {
        let (tx, rx) = mpsc::channel(100);
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(1));
        let mut price = self.base_price;
        let volatility = self.volatility;
        let interval = self.tick_interval;
        let streaming = self.streaming;

        tokio::spawn(async move {
            if !streaming {
                // Hold the stream open until the engine lets go of it
                tx.closed().await;
                return;
            }
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                price = MockMarketDataProvider::step(&mut rng, price, volatility / 4.0);
                let tick = Tick {
                    price: MockMarketDataProvider::decimal(price),
                    volume: MockMarketDataProvider::decimal(rng.random_range(0.01..2.0)),
                    timestamp: Utc::now().timestamp_millis(),
                };
                if tx.send(tick).await.is_err() {
                    break;
                }
            }
        });

        info!("MockMarketDataProvider: streaming ticks for {}", symbol);
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_history_is_well_formed_and_ordered() {
        let provider = MockMarketDataProvider::new(100.0);
        let candles = provider
            .historical_candles("TEST", Timeframe::FiveMin, 50)
            .await
            .unwrap();

        assert_eq!(candles.len(), 50);
        assert!(candles.iter().all(Candle::is_well_formed));
        assert!(candles.windows(2).all(|w| w[1].timestamp - w[0].timestamp == 300_000));
    }

    #[tokio::test]
    async fn test_history_is_deterministic_per_seed() {
        let a = MockMarketDataProvider::new(100.0).with_seed(7);
        let b = MockMarketDataProvider::new(100.0).with_seed(7);
        let ca = a.historical_candles("X", Timeframe::OneHour, 10).await.unwrap();
        let cb = b.historical_candles("X", Timeframe::OneHour, 10).await.unwrap();
        assert!(ca.iter().zip(&cb).all(|(x, y)| x.close == y.close && x.high == y.high));
    }

    #[tokio::test]
    async fn test_injected_failures_then_success() {
        let provider = MockMarketDataProvider::new(100.0).with_failures(2);
        assert!(provider.historical_candles("X", Timeframe::OneMin, 5).await.is_err());
        assert!(provider.historical_candles("X", Timeframe::OneMin, 5).await.is_err());
        assert!(provider.historical_candles("X", Timeframe::OneMin, 5).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_stream_walks() {
        let provider = MockMarketDataProvider::new(100.0).with_tick_interval(Duration::from_millis(10));
        let mut rx = provider.subscribe_ticks("X").await.unwrap();
        for _ in 0..5 {
            let tick = rx.recv().await.unwrap();
            assert!(tick.price > Decimal::ZERO);
        }
    }

    #[tokio::test]
    async fn test_history_cap() {
        let provider = MockMarketDataProvider::new(100.0).with_history_cap(3);
        let candles = provider.historical_candles("X", Timeframe::OneMin, 100).await.unwrap();
        assert_eq!(candles.len(), 3);
    }
}
