use crate::domain::market::timeframe::Timeframe;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// A historical fetch failed and will be retried
    BackfillRetry,
    /// A feed fell behind the tick broadcast and skipped ticks
    TicksLagged,
    /// The provider's tick stream ended
    TickStreamClosed,
    /// A periodic aggregation pass failed transiently
    AggregationFailed,
    /// The signal queue was full and a signal was discarded
    SignalDropped,
}

/// Non-fatal event reported on the diagnostics queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineDiagnostic {
    pub kind: DiagnosticKind,
    pub timeframe: Option<Timeframe>,
    pub message: String,
    pub timestamp: i64,
}

impl EngineDiagnostic {
    pub fn new(kind: DiagnosticKind, timeframe: Option<Timeframe>, message: impl Into<String>) -> Self {
        Self {
            kind,
            timeframe,
            message: message.into(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

impl fmt::Display for EngineDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.timeframe {
            Some(tf) => write!(f, "[{:?}/{}] {}", self.kind, tf, self.message),
            None => write!(f, "[{:?}] {}", self.kind, self.message),
        }
    }
}

/// Sending half of the diagnostics queue. Never blocks: when the queue is
/// full the newest diagnostic is discarded.
#[derive(Debug, Clone)]
pub struct DiagnosticsSink {
    tx: mpsc::Sender<EngineDiagnostic>,
}

impl DiagnosticsSink {
    pub fn new(tx: mpsc::Sender<EngineDiagnostic>) -> Self {
        Self { tx }
    }

    pub fn report(&self, diagnostic: EngineDiagnostic) {
        match self.tx.try_send(diagnostic) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                trace!("Diagnostics queue full, dropping: {}", dropped);
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_full_queue_drops_newest() {
        let (tx, mut rx) = mpsc::channel(1);
        let sink = DiagnosticsSink::new(tx);

        sink.report(EngineDiagnostic::new(DiagnosticKind::TicksLagged, Some(Timeframe::OneMin), "first"));
        sink.report(EngineDiagnostic::new(DiagnosticKind::TicksLagged, None, "second"));

        assert_eq!(rx.recv().await.unwrap().message, "first");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_queue_is_ignored() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        DiagnosticsSink::new(tx).report(EngineDiagnostic::new(
            DiagnosticKind::AggregationFailed,
            None,
            "nobody listening",
        ));
    }

    #[test]
    fn test_display() {
        let diag = EngineDiagnostic::new(DiagnosticKind::BackfillRetry, Some(Timeframe::OneHour), "timeout");
        assert_eq!(diag.to_string(), "[BackfillRetry/1h] timeout");
    }
}
