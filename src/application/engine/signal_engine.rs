use super::diagnostics::{DiagnosticKind, DiagnosticsSink, EngineDiagnostic};
use super::feed::{TimeframeFeed, pump_ticks};
use crate::application::market_data::timeframe_manager::TimeframeManager;
use crate::application::signals::aggregator::SignalAggregator;
use crate::config::SignalConfig;
use crate::domain::errors::SignalError;
use crate::domain::market::candle::Candle;
use crate::domain::market::candle_series::AppendOutcome;
use crate::domain::market::timeframe::Timeframe;
use crate::domain::ports::MarketDataProvider;
use crate::domain::trading::signal::TradingSignal;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const READINESS_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    Stopped,
    Starting,
    Running,
}

/// Point-in-time view of the engine, serializable for status endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub symbol: String,
    pub running: bool,
    pub state: EngineState,
    pub candle_counts: BTreeMap<Timeframe, usize>,
    pub ready: BTreeMap<Timeframe, bool>,
    pub last_signal: Option<TradingSignal>,
    /// Wall-clock ms of the last published or on-demand signal
    pub last_update: Option<i64>,
}

/// Receiving ends of the engine's bounded output queues.
#[derive(Debug)]
pub struct EngineOutputs {
    pub signals: mpsc::Receiver<TradingSignal>,
    pub diagnostics: mpsc::Receiver<EngineDiagnostic>,
}

struct Lifecycle {
    state: EngineState,
    cancel: Option<CancellationToken>,
    tasks: Vec<JoinHandle<()>>,
    /// Bumped by every `start`; a start only settles the lifecycle it opened
    generation: u64,
}

#[derive(Debug, Clone, Default)]
struct LastSignal {
    signal: Option<TradingSignal>,
    updated_at: Option<i64>,
}

/// Shared handles the periodic task needs.
#[derive(Clone)]
struct Publisher {
    aggregator: Arc<SignalAggregator>,
    manager: Arc<TimeframeManager>,
    signals: mpsc::Sender<TradingSignal>,
    diagnostics: DiagnosticsSink,
    last: Arc<Mutex<LastSignal>>,
}

impl Publisher {
    fn record(&self, signal: &TradingSignal) {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        last.signal = Some(signal.clone());
        last.updated_at = Some(Utc::now().timestamp_millis());
    }

    async fn cycle(&self) {
        let snapshot = self.manager.snapshot().await;
        match self.aggregator.generate_signal(&snapshot) {
            Ok(signal) => {
                info!("SignalEngine: {} | {}", signal, signal.reasoning);
                self.record(&signal);
                if let Err(mpsc::error::TrySendError::Full(dropped)) =
                    self.signals.try_send(signal)
                {
                    warn!("SignalEngine: signal queue full, dropping {}", dropped);
                    self.diagnostics.report(EngineDiagnostic::new(
                        DiagnosticKind::SignalDropped,
                        None,
                        format!("signal queue full, dropped {}", dropped),
                    ));
                }
            }
            Err(e) if e.is_transient() => {
                debug!("SignalEngine: aggregation skipped: {}", e);
                self.diagnostics.report(EngineDiagnostic::new(
                    DiagnosticKind::AggregationFailed,
                    Some(self.aggregator.trading_timeframe()),
                    e.to_string(),
                ));
            }
            Err(e) => error!("SignalEngine: aggregation failed: {}", e),
        }
    }

    async fn run(self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("SignalEngine: aggregation loop shutting down");
                    break;
                }
                _ = ticker.tick() => self.cycle().await,
            }
        }
    }
}

/// Multi-timeframe signal engine.
///
/// `start` backfills history, spawns one feed per timeframe, waits until every
/// timeframe holds its minimum history, then runs the periodic aggregation
/// task. All tasks share one cancellation token, fired by `stop`.
pub struct SignalEngine {
    config: SignalConfig,
    provider: Arc<dyn MarketDataProvider>,
    publisher: Publisher,
    lifecycle: Mutex<Lifecycle>,
}

impl SignalEngine {
    /// Validates the configuration and wires the output queues.
    pub fn new(
        config: SignalConfig,
        provider: Arc<dyn MarketDataProvider>,
    ) -> Result<(Self, EngineOutputs), SignalError> {
        let aggregator = Arc::new(SignalAggregator::from_config(&config)?);
        let manager = Arc::new(TimeframeManager::new(config.timeframes.clone()));
        let (signal_tx, signal_rx) = mpsc::channel(config.queues.signal_capacity);
        let (diag_tx, diag_rx) = mpsc::channel(config.queues.diagnostics_capacity);

        info!(
            "SignalEngine: {} on {} with indicators {:?}",
            config.symbol,
            config.trading_timeframe,
            aggregator.indicator_names()
        );

        let engine = Self {
            config,
            provider,
            publisher: Publisher {
                aggregator,
                manager,
                signals: signal_tx,
                diagnostics: DiagnosticsSink::new(diag_tx),
                last: Arc::new(Mutex::new(LastSignal::default())),
            },
            lifecycle: Mutex::new(Lifecycle {
                state: EngineState::Stopped,
                cancel: None,
                tasks: Vec::new(),
                generation: 0,
            }),
        };
        let outputs = EngineOutputs {
            signals: signal_rx,
            diagnostics: diag_rx,
        };
        Ok((engine, outputs))
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> EngineState {
        self.lifecycle().state
    }

    pub fn manager(&self) -> Arc<TimeframeManager> {
        self.publisher.manager.clone()
    }

    /// Inbound candle path, for callers that aggregate candles themselves.
    pub async fn add_candle(&self, timeframe: Timeframe, candle: Candle) -> AppendOutcome {
        self.publisher.manager.add_candle(timeframe, candle).await
    }

    /// Brings the engine to `Running`.
    ///
    /// Fails with `AlreadyRunning` unless stopped, and with `DataUnavailable`
    /// when backfill exhausts its retries or readiness is not reached within
    /// the configured timeout. On failure every spawned task is cancelled and
    /// the engine is back to `Stopped`. A `stop` issued meanwhile also fails
    /// the start; if another start has begun since, its state is left alone.
    pub async fn start(&self) -> Result<(), SignalError> {
        let (cancel, generation) = {
            let mut lifecycle = self.lifecycle();
            if lifecycle.state != EngineState::Stopped {
                return Err(SignalError::AlreadyRunning);
            }
            let cancel = CancellationToken::new();
            lifecycle.generation += 1;
            lifecycle.state = EngineState::Starting;
            lifecycle.cancel = Some(cancel.clone());
            (cancel, lifecycle.generation)
        };

        info!("SignalEngine: starting {}", self.config.symbol);
        let mut tasks = Vec::new();
        let outcome = self.bootstrap(&mut tasks, &cancel).await;

        let failure = {
            let mut lifecycle = self.lifecycle();
            let owned = lifecycle.generation == generation;
            match outcome {
                Ok(()) if owned
                    && lifecycle.state == EngineState::Starting
                    && !cancel.is_cancelled() =>
                {
                    lifecycle.state = EngineState::Running;
                    lifecycle.tasks = tasks;
                    None
                }
                Ok(()) => Some((
                    SignalError::data_unavailable("engine stopped during startup"),
                    tasks,
                )),
                Err(e) => {
                    // A later start may own the lifecycle by now
                    if owned {
                        lifecycle.state = EngineState::Stopped;
                        lifecycle.cancel = None;
                    }
                    Some((e, tasks))
                }
            }
        };

        match failure {
            None => {
                info!("SignalEngine: running");
                Ok(())
            }
            Some((e, tasks)) => {
                error!("SignalEngine: start failed: {}", e);
                cancel.cancel();
                for task in tasks {
                    let _ = task.await;
                }
                Err(e)
            }
        }
    }

    async fn bootstrap(
        &self,
        tasks: &mut Vec<JoinHandle<()>>,
        cancel: &CancellationToken,
    ) -> Result<(), SignalError> {
        let manager = &self.publisher.manager;
        let diagnostics = &self.publisher.diagnostics;

        for tf in Timeframe::ALL {
            let settings = self.config.settings(tf);
            let limit = settings.min_candles.max(settings.snapshot_depth);
            let candles = self.fetch_history(tf, limit, cancel).await?;
            let fetched = candles.len();
            let accepted = manager.extend(tf, candles).await;
            info!(
                "SignalEngine: backfilled {} with {}/{} candles",
                tf, accepted, fetched
            );
        }

        let source = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(SignalError::data_unavailable("cancelled before tick subscription"));
            }
            source = self.provider.subscribe_ticks(&self.config.symbol) => source.map_err(|e| {
                SignalError::data_unavailable(format!("tick subscription failed: {:#}", e))
            })?,
        };

        let (fanout, _) = broadcast::channel(self.config.queues.tick_capacity);
        for tf in Timeframe::ALL {
            let feed = TimeframeFeed::new(
                tf,
                manager.clone(),
                self.config.settings(tf).poll_interval,
                diagnostics.clone(),
            );
            tasks.push(tokio::spawn(feed.run(fanout.subscribe(), cancel.clone())));
        }
        tasks.push(tokio::spawn(pump_ticks(
            source,
            fanout,
            diagnostics.clone(),
            cancel.clone(),
        )));

        self.await_readiness(cancel).await?;

        tasks.push(tokio::spawn(
            self.publisher
                .clone()
                .run(self.config.aggregation_interval, cancel.clone()),
        ));
        Ok(())
    }

    /// Historical candles with bounded exponential backoff between attempts.
    async fn fetch_history(
        &self,
        timeframe: Timeframe,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Candle>, SignalError> {
        let policy = self.config.backfill;
        let mut attempt = 0;
        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(SignalError::data_unavailable("cancelled during backfill"));
                }
                result = self.provider.historical_candles(&self.config.symbol, timeframe, limit) => result,
            };

            match result {
                Ok(candles) => return Ok(candles),
                Err(e) if attempt < policy.max_retries => {
                    let backoff = policy.base_backoff.saturating_mul(2u32.saturating_pow(attempt));
                    attempt += 1;
                    warn!(
                        "SignalEngine: backfill {} attempt {}/{} failed: {:#}. Retrying in {:?}",
                        timeframe,
                        attempt,
                        policy.max_retries + 1,
                        e,
                        backoff
                    );
                    self.publisher.diagnostics.report(EngineDiagnostic::new(
                        DiagnosticKind::BackfillRetry,
                        Some(timeframe),
                        format!("attempt {} failed: {:#}", attempt, e),
                    ));
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            return Err(SignalError::data_unavailable("cancelled during backfill"));
                        }
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
                Err(e) => {
                    return Err(SignalError::data_unavailable(format!(
                        "backfill {} failed after {} attempts: {:#}",
                        timeframe,
                        attempt + 1,
                        e
                    )));
                }
            }
        }
    }

    async fn await_readiness(&self, cancel: &CancellationToken) -> Result<(), SignalError> {
        let manager = &self.publisher.manager;
        let wait = async {
            loop {
                if manager.is_ready().await {
                    return;
                }
                tokio::time::sleep(READINESS_POLL).await;
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                Err(SignalError::data_unavailable("cancelled while waiting for readiness"))
            }
            ready = tokio::time::timeout(self.config.readiness_timeout, wait) => match ready {
                Ok(()) => Ok(()),
                Err(_) => {
                    let missing: Vec<String> = manager
                        .readiness()
                        .await
                        .into_iter()
                        .filter(|(_, ready)| !ready)
                        .map(|(tf, _)| tf.to_string())
                        .collect();
                    Err(SignalError::data_unavailable(format!(
                        "readiness timeout after {:?}, short history on {}",
                        self.config.readiness_timeout,
                        missing.join(", ")
                    )))
                }
            },
        }
    }

    /// Cancels every task and waits for them. Safe to call in any state.
    pub async fn stop(&self) {
        let (cancel, tasks) = {
            let mut lifecycle = self.lifecycle();
            if lifecycle.state == EngineState::Stopped && lifecycle.cancel.is_none() {
                return;
            }
            lifecycle.state = EngineState::Stopped;
            (lifecycle.cancel.take(), std::mem::take(&mut lifecycle.tasks))
        };

        info!("SignalEngine: stopping");
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        for task in tasks {
            if let Err(e) = task.await {
                warn!("SignalEngine: task ended abnormally: {}", e);
            }
        }
        info!("SignalEngine: stopped");
    }

    /// Generates a signal immediately from the current history.
    pub async fn generate_now(&self) -> Result<TradingSignal, SignalError> {
        let manager = &self.publisher.manager;
        let missing = manager
            .readiness()
            .await
            .values()
            .filter(|ready| !**ready)
            .count();
        if missing > 0 {
            return Err(SignalError::NotReady { missing });
        }

        let snapshot = manager.snapshot().await;
        let signal = self.publisher.aggregator.generate_signal(&snapshot)?;
        self.publisher.record(&signal);
        Ok(signal)
    }

    pub async fn status(&self) -> EngineStatus {
        let state = self.state();
        let manager = &self.publisher.manager;
        let last = self
            .publisher
            .last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        EngineStatus {
            symbol: self.config.symbol.clone(),
            running: state == EngineState::Running,
            state,
            candle_counts: manager.candle_counts().await,
            ready: manager.readiness().await,
            last_signal: last.signal,
            last_update: last.updated_at,
        }
    }
}

impl std::fmt::Debug for SignalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalEngine")
            .field("symbol", &self.config.symbol)
            .field("state", &self.state())
            .finish()
    }
}
