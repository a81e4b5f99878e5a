//! Engine lifecycle: backfill, live feeds and the periodic aggregation task.

pub mod diagnostics;
pub mod feed;
pub mod signal_engine;

pub use diagnostics::{DiagnosticKind, EngineDiagnostic};
pub use signal_engine::{EngineOutputs, EngineState, EngineStatus, SignalEngine};
