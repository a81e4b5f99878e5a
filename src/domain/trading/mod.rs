// Signal types
pub mod signal;
