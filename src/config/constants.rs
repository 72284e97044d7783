//! Configuration constants.
//!
//! This module defines the constants used throughout the service, including
//! timeouts, size limits, file naming and default endpoints.

use std::time::Duration;

/// Default listen address for the HTTP API
pub const DEFAULT_HOST: &str = "0.0.0.0";
/// Default listen port for the HTTP API
pub const DEFAULT_PORT: u16 = 6600;

/// Default storage directory for downloaded databases
pub const DEFAULT_DB_DIR: &str = "/data";

/// Default interval between scheduled update checks (1 day)
pub const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 24 * 60 * 60;

// Acquisition timeouts
/// Total timeout for downloading the external database over HTTP(S)
pub const EXTERNAL_DOWNLOAD_TIMEOUT_SECS: u64 = 60;
/// Total timeout for downloading the vendor archive
pub const VENDOR_DOWNLOAD_TIMEOUT_SECS: u64 = 120;
/// TCP connect timeout for HTTP and FTP sources
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum accepted database download size in bytes (1 GiB).
/// GeoLite2-City is around 60MB; anything this large is not a geo database.
pub const MAX_DATABASE_DOWNLOAD_SIZE: u64 = 1024 * 1024 * 1024;

// MaxMind (vendor) archive
/// MaxMind download endpoint
pub const MAXMIND_DOWNLOAD_BASE: &str = "https://download.maxmind.com/app/geoip_download";
/// Default MaxMind edition
pub const DEFAULT_MAXMIND_EDITION: &str = "GeoLite2-City";

// Database file naming
/// File name prefix for databases downloaded from an external URL
pub const EXTERNAL_FILE_PREFIX: &str = "external-";
/// Extension used when the external URL path has none
pub const DEFAULT_DATABASE_EXTENSION: &str = ".mmdb";
/// Suffixes recognised as database files inside vendor archives
pub const DATABASE_FILE_SUFFIXES: &[&str] = &[".mmdb"];
/// Suffix for in-flight downloads
pub const PARTIAL_FILE_SUFFIX: &str = ".part";
/// Suffix for downloaded vendor archives
pub const ARCHIVE_FILE_SUFFIX: &str = ".tar.gz";

/// Version tag reported before any database has been loaded
pub const UNKNOWN_VERSION_TAG: &str = "N/A";

// Localization
/// Default response language
pub const DEFAULT_LANG: &str = "en";
/// Language used when the requested one has no name
pub const FALLBACK_LANG: &str = "en";

// WHOIS / RDAP
/// Default RDAP bootstrap service
pub const DEFAULT_RDAP_URL: &str = "https://rdap.org";
/// Timeout for a single RDAP request
pub const RDAP_TIMEOUT: Duration = Duration::from_secs(10);
/// Upper bound for WHOIS enrichment of geo lookups
pub const WHOIS_ENRICHMENT_TIMEOUT: Duration = Duration::from_secs(15);
/// DNS query timeout in seconds
pub const DNS_TIMEOUT_SECS: u64 = 3;
