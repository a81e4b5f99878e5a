// Market data processing modules
pub mod candle_builder;
pub mod snapshot;
pub mod timeframe_manager;
