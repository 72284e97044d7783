//! Main application modules.
//!
//! This module provides shutdown handling used by the server entry point.

pub mod shutdown;

// Re-export public API
pub use shutdown::shutdown_gracefully;
