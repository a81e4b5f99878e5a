// Market data domain
pub mod candle;
pub mod candle_series;
pub mod timeframe;
