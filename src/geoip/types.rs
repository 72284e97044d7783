//! GeoIP data structures.
//!
//! This module defines the record, status and progress types exposed by the
//! database lifecycle manager.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A raw database record.
///
/// Records are recursively typed (string, number, bool, null, sequence,
/// string-keyed mapping) because the field set of upstream databases is not
/// fixed. Mappings keep their on-disk insertion order.
pub type GeoRecord = serde_json::Value;

/// A record together with the database that produced it.
#[derive(Debug, Clone)]
pub struct GeoMatch {
    /// The raw record
    pub record: GeoRecord,
    /// Version of the database that answered
    pub version_tag: String,
    /// When that database was loaded
    pub loaded_at: Option<DateTime<Utc>>,
}

/// Consistent snapshot of the manager state, for health/status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStatus {
    /// Whether a database is currently serving lookups
    pub loaded: bool,
    /// When the active database was loaded
    pub last_load_time: Option<DateTime<Utc>>,
    /// When the last refresh attempt started
    pub last_check_time: Option<DateTime<Utc>>,
    /// Version of the active database (`N/A` before the first load)
    pub version_tag: String,
    /// File backing the active database
    pub active_file_path: Option<PathBuf>,
    /// Directory holding downloaded databases
    pub storage_dir: PathBuf,
    /// Name of the selected acquisition strategy (`none` when unconfigured)
    pub strategy: String,
    /// Whether scheduled checks re-acquire the database
    pub refreshable: bool,
}

/// Progress of an in-flight download.
///
/// Published best-effort; nothing depends on it for correctness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadProgress {
    /// Bytes written so far
    pub bytes: u64,
    /// Expected size, when the source announced one
    pub total: Option<u64>,
}

impl DownloadProgress {
    /// Completion percentage, if the total size is known.
    pub fn percent(&self) -> Option<u8> {
        match self.total {
            Some(0) | None => None,
            Some(total) => Some(((self.bytes.min(total) * 100) / total) as u8),
        }
    }
}
