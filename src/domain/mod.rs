// Market data domain
pub mod market;

// Port interfaces
pub mod ports;

// Trading signal domain
pub mod trading;

// Domain-specific error types
pub mod errors;
