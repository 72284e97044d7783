//! Application configuration and constants.
//!
//! This module provides:
//! - Configuration constants (timeouts, limits, file naming, endpoints)
//! - CLI/environment option parsing
//! - The immutable configuration consumed by the database lifecycle manager

mod constants;
mod types;

// Re-export all constants
pub use constants::*;
pub use types::{Config, DatabaseConfig, LogFormat, LogLevel, SourceConfig, VendorConfig};
