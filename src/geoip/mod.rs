//! GeoIP database lifecycle.
//!
//! This module acquires a MaxMind-format database from one of several
//! mutually exclusive sources, keeps exactly one of them loaded, and replaces
//! it on a schedule without ever leaving lookups without a database:
//!
//! - [`source`]: picks the acquisition strategy from configuration
//! - [`Fetcher`]: downloads or validates the database file
//! - [`DatabaseHandle`]: an opened database plus its backing file
//! - [`LifecycleManager`]: swaps handles and retires superseded files
//! - [`UpdateScheduler`]: periodic update checks
//! - [`localize`]: collapses localized name maps in lookup results

mod fetch;
mod handle;
mod localize;
mod manager;
mod scheduler;
pub mod source;
mod types;

// Re-export public API
pub use fetch::{AcquiredFile, Fetcher};
pub use handle::{DatabaseHandle, DatabaseLoader, GeoDatabase, MmdbLoader};
pub use localize::localize;
pub use manager::{LifecycleManager, RefreshOutcome};
pub use scheduler::UpdateScheduler;
pub use source::Strategy;
pub use types::{DatabaseStatus, DownloadProgress, GeoMatch, GeoRecord};
