//! Database handles.
//!
//! A [`DatabaseHandle`] wraps an opened, queryable database artifact together
//! with the file it was loaded from. The artifact format is pluggable through
//! [`DatabaseLoader`]; the default [`MmdbLoader`] reads MaxMind DB files.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use maxminddb::Reader;

use super::types::GeoRecord;
use crate::error_handling::DatabaseError;

/// An opened database supporting point lookups.
pub trait GeoDatabase: Send + Sync {
    /// Returns the record for `ip`, or `None` if the address is not covered.
    fn lookup(&self, ip: IpAddr) -> Result<Option<GeoRecord>, DatabaseError>;

    /// Version identifier of the loaded data.
    fn version(&self) -> String;
}

/// Opens database files into queryable [`GeoDatabase`]s.
///
/// Opening may block on file I/O; the manager calls it from a blocking task.
pub trait DatabaseLoader: Send + Sync {
    /// Opens and validates the database at `path`.
    fn open(&self, path: &Path) -> Result<Box<dyn GeoDatabase>, DatabaseError>;
}

/// Loader for MaxMind DB (`.mmdb`) files.
#[derive(Debug, Clone, Copy, Default)]
pub struct MmdbLoader;

impl DatabaseLoader for MmdbLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn GeoDatabase>, DatabaseError> {
        log::info!("Loading GeoIP database from: {}", path.display());

        let reader = Reader::open_readfile(path).map_err(|e| DatabaseError::Open {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        Ok(Box::new(MmdbDatabase { reader }))
    }
}

struct MmdbDatabase {
    reader: Reader<Vec<u8>>,
}

impl GeoDatabase for MmdbDatabase {
    fn lookup(&self, ip: IpAddr) -> Result<Option<GeoRecord>, DatabaseError> {
        self.reader
            .lookup::<GeoRecord>(ip)
            .map_err(|e| DatabaseError::Lookup(e.to_string()))
    }

    fn version(&self) -> String {
        // MaxMind databases carry their build time in the metadata section
        format!("build_{}", self.reader.metadata.build_epoch)
    }
}

/// An open database plus the file backing it.
pub struct DatabaseHandle {
    database: Box<dyn GeoDatabase>,
    path: PathBuf,
    version: String,
    loaded_at: DateTime<Utc>,
    owned: bool,
}

impl DatabaseHandle {
    /// Opens `path` with `loader`.
    ///
    /// `owned` marks files the manager created and may delete once superseded.
    pub fn open(
        loader: &dyn DatabaseLoader,
        path: &Path,
        owned: bool,
    ) -> Result<Self, DatabaseError> {
        let database = loader.open(path)?;
        let version = database.version();
        Ok(Self {
            database,
            path: path.to_path_buf(),
            version,
            loaded_at: Utc::now(),
            owned,
        })
    }

    /// Point lookup. Null and empty records count as absent.
    pub fn lookup(&self, ip: IpAddr) -> Result<Option<GeoRecord>, DatabaseError> {
        let record = self.database.lookup(ip)?;
        Ok(record.filter(|r| match r {
            GeoRecord::Null => false,
            GeoRecord::Object(map) => !map.is_empty(),
            _ => true,
        }))
    }

    /// File the database was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Version identifier reported by the database.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// When the handle was opened.
    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Whether the backing file belongs to the manager.
    pub fn is_owned(&self) -> bool {
        self.owned
    }

    /// Releases the database.
    pub fn close(self) {
        log::debug!("Closed GeoIP database {}", self.path.display());
    }
}

impl std::fmt::Debug for DatabaseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseHandle")
            .field("path", &self.path)
            .field("version", &self.version)
            .field("loaded_at", &self.loaded_at)
            .field("owned", &self.owned)
            .finish()
    }
}
