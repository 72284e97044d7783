// Shared test helpers: a JSON-backed database format and manager builders.
//
// Test databases are JSON documents of the form
// `{"version": "v1", "records": {"<ip>": {...}}}`, opened through the same
// `DatabaseLoader` seam the MaxMind reader uses.

#![allow(dead_code)] // Each test binary uses a subset

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Value};

use gunter::config::{DatabaseConfig, SourceConfig};
use gunter::error_handling::DatabaseError;
use gunter::geoip::{DatabaseLoader, GeoDatabase, GeoRecord, LifecycleManager};

pub const KNOWN_IP: &str = "81.2.69.142";

struct JsonDatabase(Value);

impl GeoDatabase for JsonDatabase {
    fn lookup(&self, ip: IpAddr) -> Result<Option<GeoRecord>, DatabaseError> {
        Ok(self.0["records"].get(ip.to_string()).cloned())
    }

    fn version(&self) -> String {
        self.0["version"].as_str().unwrap_or("unknown").to_string()
    }
}

/// Opens JSON test databases.
pub struct JsonLoader;

impl DatabaseLoader for JsonLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn GeoDatabase>, DatabaseError> {
        let open_error = |message: String| DatabaseError::Open {
            path: path.to_path_buf(),
            message,
        };
        let bytes = std::fs::read(path).map_err(|e| open_error(e.to_string()))?;
        let value = serde_json::from_slice(&bytes).map_err(|e| open_error(e.to_string()))?;
        Ok(Box::new(JsonDatabase(value)))
    }
}

/// A test database with one London record, tagged `version`.
pub fn database_json(version: &str) -> String {
    json!({
        "version": version,
        "records": {
            KNOWN_IP: {
                "city": {"names": {"en": "London", "de": "London"}},
                "country": {
                    "iso_code": "GB",
                    "names": {"en": "United Kingdom", "de": "Vereinigtes Königreich"}
                },
                "location": {"latitude": 51.5142, "longitude": -0.0931}
            }
        }
    })
    .to_string()
}

pub fn write_database(path: &Path, version: &str) {
    std::fs::write(path, database_json(version)).expect("Failed to write test database");
}

pub fn manager_with_sources(dir: &Path, sources: SourceConfig) -> Arc<LifecycleManager> {
    Arc::new(
        LifecycleManager::with_loader(DatabaseConfig::new(dir, sources), Arc::new(JsonLoader))
            .expect("manager should build"),
    )
}

pub fn external_manager(dir: &Path, url: &str, refresh_external: bool) -> Arc<LifecycleManager> {
    manager_with_sources(
        dir,
        SourceConfig {
            external_url: Some(url.to_string()),
            refresh_external,
            ..Default::default()
        },
    )
}

/// Regular files in `dir`, sorted.
pub fn files_in(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .expect("Failed to read storage directory")
        .map(|entry| entry.expect("Failed to read directory entry").path())
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    files
}
