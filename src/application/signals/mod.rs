// Signal aggregation modules
pub mod aggregator;
pub mod weighting;
