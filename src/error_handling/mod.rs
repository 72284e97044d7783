//! Error handling.
//!
//! This module provides:
//! - Error type definitions for initialization, acquisition, database and lookup failures
//! - Categorization of transport/filesystem errors into fetch error kinds
//!
//! Acquisition failures are categorized into:
//! - **Network**: the source could not be reached in time
//! - **Protocol**: the source answered, but not with a file
//! - **Filesystem**: local writes, renames or opens failed
//! - **Format**: the payload did not have the expected shape

mod categorization;
mod types;

// Re-export public API
pub use categorization::categorize_reqwest_error;
pub use types::{
    BoxError, DatabaseError, FetchError, FetchErrorKind, InitializationError, LookupError,
    RefreshError, WhoisError,
};
