use crate::domain::market::candle::Candle;
use crate::domain::market::timeframe::Timeframe;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
struct WindowState {
    candle: Option<Candle>,
    started_at: Instant,
    /// Candle timestamp for this window (period start, ms)
    start_ms: i64,
}

/// Accumulates ticks into the open candle of one timeframe.
///
/// Window closure is time-polled: `completed_candle` hands back the open candle
/// once the window duration has elapsed since it started, whatever ticks it
/// holds. A late poll therefore folds ticks from the next logical window into
/// the current candle.
///
/// One producer calls `add_tick`, one poller calls `completed_candle`; both go
/// through the same mutex.
#[derive(Debug)]
pub struct CandleBuilder {
    timeframe: Timeframe,
    window: Duration,
    state: Mutex<WindowState>,
}

impl CandleBuilder {
    pub fn new(timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            window: timeframe.duration(),
            state: Mutex::new(WindowState {
                candle: None,
                started_at: Instant::now(),
                start_ms: timeframe.period_start(Utc::now().timestamp_millis()),
            }),
        }
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    fn lock(&self) -> MutexGuard<'_, WindowState> {
        // Window state stays consistent even if a holder panicked mid-update.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Folds a trade into the open candle. Never fails.
    pub fn add_tick(&self, price: Decimal, volume: Decimal) {
        let mut guard = self.lock();
        let state = &mut *guard;
        match state.candle.as_mut() {
            Some(candle) => candle.apply_tick(price, volume),
            None => state.candle = Some(Candle::from_tick(state.start_ms, price, volume)),
        }
    }

    /// Returns the open candle and starts a new window once the window has
    /// elapsed. Returns `None` before that, or when the window saw no ticks.
    pub fn completed_candle(&self) -> Option<Candle> {
        let mut state = self.lock();
        if state.started_at.elapsed() < self.window {
            return None;
        }

        let completed = state.candle.take();
        state.started_at = Instant::now();
        state.start_ms = self
            .timeframe
            .period_start(Utc::now().timestamp_millis())
            .max(state.start_ms + 1);

        if let Some(candle) = &completed {
            debug!(
                "CandleBuilder[{}]: window closed → O:{} H:{} L:{} C:{} V:{}",
                self.timeframe, candle.open, candle.high, candle.low, candle.close, candle.volume
            );
        }
        completed
    }

    /// Copy of the open candle, without closing the window.
    pub fn current(&self) -> Option<Candle> {
        self.lock().candle.clone()
    }
}
