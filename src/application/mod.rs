// Engine lifecycle and background tasks
pub mod engine;

// Indicator capability and implementations
pub mod indicators;

// Candle building and multi-timeframe storage
pub mod market_data;

// Weighted voting and signal generation
pub mod signals;
