use crate::domain::market::candle::Candle;
use crate::domain::market::timeframe::Timeframe;
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::Receiver;

/// A single trade print from the live stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub price: Decimal,
    pub volume: Decimal,
    pub timestamp: i64,
}

/// Data-provider collaborator: historical backfill plus the live tick stream.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Most recent `limit` closed candles, oldest first.
    async fn historical_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>>;

    /// Live trades for `symbol`. The stream ends when the receiver yields `None`.
    async fn subscribe_ticks(&self, symbol: &str) -> Result<Receiver<Tick>>;
}
