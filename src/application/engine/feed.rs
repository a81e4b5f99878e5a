use super::diagnostics::{DiagnosticKind, DiagnosticsSink, EngineDiagnostic};
use crate::application::market_data::candle_builder::CandleBuilder;
use crate::application::market_data::timeframe_manager::TimeframeManager;
use crate::domain::market::timeframe::Timeframe;
use crate::domain::ports::Tick;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Forwards the provider's tick stream onto the broadcast channel every feed
/// subscribes to. Ends when the stream ends or on cancellation; dropping the
/// sender then closes every feed's receiver.
pub async fn pump_ticks(
    mut source: mpsc::Receiver<Tick>,
    fanout: broadcast::Sender<Tick>,
    diagnostics: DiagnosticsSink,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            tick = source.recv() => match tick {
                // No live feed is not an error
                Some(tick) => {
                    let _ = fanout.send(tick);
                }
                None => {
                    warn!("Tick stream ended");
                    diagnostics.report(EngineDiagnostic::new(
                        DiagnosticKind::TickStreamClosed,
                        None,
                        "provider tick stream ended",
                    ));
                    break;
                }
            }
        }
    }
}

/// One timeframe's live path: ticks in, candles out to the manager.
///
/// Each poll publishes the completed candle when its window has elapsed,
/// otherwise the open candle, which replaces the series tail until the window
/// closes.
pub struct TimeframeFeed {
    timeframe: Timeframe,
    builder: CandleBuilder,
    manager: Arc<TimeframeManager>,
    poll_interval: Duration,
    diagnostics: DiagnosticsSink,
}

impl TimeframeFeed {
    pub fn new(
        timeframe: Timeframe,
        manager: Arc<TimeframeManager>,
        poll_interval: Duration,
        diagnostics: DiagnosticsSink,
    ) -> Self {
        Self {
            timeframe,
            builder: CandleBuilder::new(timeframe),
            manager,
            poll_interval,
            diagnostics,
        }
    }

    pub async fn run(self, mut ticks: broadcast::Receiver<Tick>, cancel: CancellationToken) {
        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stream_open = true;

        debug!("TimeframeFeed[{}]: started (poll {:?})", self.timeframe, self.poll_interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = ticks.recv(), if stream_open => match received {
                    Ok(tick) => self.builder.add_tick(tick.price, tick.volume),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("TimeframeFeed[{}]: lagged, {} ticks skipped", self.timeframe, skipped);
                        self.diagnostics.report(EngineDiagnostic::new(
                            DiagnosticKind::TicksLagged,
                            Some(self.timeframe),
                            format!("{} ticks skipped", skipped),
                        ));
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        // Keep polling so the open candle still closes on time
                        stream_open = false;
                    }
                },
                _ = poll.tick() => self.publish().await,
            }
        }

        info!("TimeframeFeed[{}]: stopped", self.timeframe);
    }

    async fn publish(&self) {
        if let Some(candle) = self.builder.completed_candle() {
            self.manager.add_candle(self.timeframe, candle).await;
        } else if let Some(open) = self.builder.current() {
            self.manager.add_candle(self.timeframe, open).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_timeframe_settings;
    use rust_decimal_macros::dec;

    fn tick(price: rust_decimal::Decimal) -> Tick {
        Tick {
            price,
            volume: dec!(1),
            timestamp: 0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_feed_publishes_open_then_completed_candle() {
        let manager = Arc::new(TimeframeManager::new(default_timeframe_settings()));
        let (diag_tx, _diag_rx) = mpsc::channel(8);
        let feed = TimeframeFeed::new(
            Timeframe::OneMin,
            manager.clone(),
            Duration::from_secs(1),
            DiagnosticsSink::new(diag_tx),
        );

        let (tx, rx) = broadcast::channel(16);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(feed.run(rx, cancel.clone()));

        tx.send(tick(dec!(100))).unwrap();
        tx.send(tick(dec!(105))).unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        // Open candle is visible before the window closes
        assert_eq!(manager.len(Timeframe::OneMin).await, 1);
        let open = manager.snapshot().await;
        assert_eq!(open.last_close(Timeframe::OneMin), Some(dec!(105)));

        tx.send(tick(dec!(99))).unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;

        let snapshot = manager.snapshot().await;
        let candles = snapshot.candles(Timeframe::OneMin);
        assert_eq!(candles.len(), 1, "completed candle replaces the open one");
        assert_eq!(candles[0].high, dec!(105));
        assert_eq!(candles[0].low, dec!(99));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_pump_reports_stream_end() {
        let (source_tx, source_rx) = mpsc::channel(4);
        let (fanout, mut rx) = broadcast::channel(4);
        let (diag_tx, mut diag_rx) = mpsc::channel(4);
        let handle = tokio::spawn(pump_ticks(
            source_rx,
            fanout,
            DiagnosticsSink::new(diag_tx),
            CancellationToken::new(),
        ));

        source_tx.send(tick(dec!(1))).await.unwrap();
        drop(source_tx);
        handle.await.unwrap();

        assert_eq!(rx.recv().await.unwrap().price, dec!(1));
        assert!(matches!(rx.recv().await, Err(broadcast::error::RecvError::Closed)));
        assert_eq!(diag_rx.recv().await.unwrap().kind, DiagnosticKind::TickStreamClosed);
    }
}
