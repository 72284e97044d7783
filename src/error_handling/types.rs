//! Error type definitions.
//!
//! This module defines the error types used throughout the service. Failures
//! inside the database lifecycle (fetching, opening) are absorbed by the
//! manager; only lookup errors reach request handlers.

use std::path::PathBuf;

use log::SetLoggerError;
use reqwest::Error as ReqwestError;
use strum_macros::{Display, EnumIter as EnumIterMacro};
use thiserror::Error;

/// Boxed error used as the optional cause of a fetch failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error types for initialization failures.
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)] // All variants end with "Error" by convention
pub enum InitializationError {
    /// Error initializing the logger.
    #[error("Logger initialization error: {0}")]
    LoggerError(#[from] SetLoggerError),

    /// Error initializing an HTTP client.
    #[error("HTTP client initialization error: {0}")]
    HttpClientError(#[from] ReqwestError),

    /// A configuration value could not be used.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The storage directory could not be created.
    #[error("Storage directory error for {path:?}: {source}")]
    StorageError {
        /// Directory that could not be created
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Category of an acquisition failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIterMacro)]
#[strum(serialize_all = "lowercase")]
pub enum FetchErrorKind {
    /// Connection, DNS, TLS or timeout failure
    Network,
    /// The remote side answered, but not with the file (non-2xx, FTP reply, bad URL)
    Protocol,
    /// Local file could not be created, written, renamed or opened
    Filesystem,
    /// The acquired bytes are not in the expected shape (e.g. archive without a database)
    Format,
}

/// Failure to acquire a database file.
#[derive(Error, Debug)]
#[error("{kind} error: {message}")]
pub struct FetchError {
    /// Failure category
    pub kind: FetchErrorKind,
    /// Human readable description (never contains credentials)
    pub message: String,
    /// Underlying cause, if any
    #[source]
    pub source: Option<BoxError>,
}

impl FetchError {
    /// Creates a fetch error without an underlying cause.
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a fetch error wrapping an underlying cause.
    pub fn with_source(
        kind: FetchErrorKind,
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Shorthand for a [`FetchErrorKind::Network`] error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Network, message)
    }

    /// Shorthand for a [`FetchErrorKind::Protocol`] error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Protocol, message)
    }

    /// Shorthand for a [`FetchErrorKind::Filesystem`] error with an I/O cause.
    pub fn filesystem(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::with_source(FetchErrorKind::Filesystem, message, source)
    }

    /// Shorthand for a [`FetchErrorKind::Format`] error.
    pub fn format(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Format, message)
    }
}

/// Failure to open or query a database artifact.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// The file could not be opened or is not a valid database.
    #[error("Failed to open database {path:?}: {message}")]
    Open {
        /// File the open was attempted on
        path: PathBuf,
        /// Reason reported by the database reader
        message: String,
    },

    /// A point lookup failed (corrupt data, decoding error).
    #[error("Database lookup failed: {0}")]
    Lookup(String),
}

/// Failure of a single refresh attempt. Never propagated past the manager.
#[derive(Error, Debug)]
pub enum RefreshError {
    /// Acquisition failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The acquired file could not be opened as a database.
    #[error(transparent)]
    Open(#[from] DatabaseError),
}

/// Errors surfaced to lookup callers.
#[derive(Error, Debug)]
pub enum LookupError {
    /// No database has been loaded (or every load failed).
    #[error("GeoIP database not available")]
    Unavailable,

    /// The database is loaded but holds no record for the address.
    #[error("IP address {0} not found in the database")]
    NotFound(String),

    /// The input is not an IP address.
    #[error("Invalid IP address format: {0}")]
    InvalidAddress(String),

    /// The database failed while answering.
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Errors from the WHOIS/RDAP collaborator.
#[derive(Error, Debug)]
pub enum WhoisError {
    /// The target is neither an IP address nor a domain name.
    #[error("Invalid WHOIS target: {0}")]
    InvalidTarget(String),

    /// The RDAP service could not be reached.
    #[error("RDAP request failed: {0}")]
    Transport(#[from] ReqwestError),

    /// The RDAP service answered with a non-success status.
    #[error("RDAP service returned HTTP {0}")]
    Status(u16),

    /// The RDAP response could not be decoded.
    #[error("Malformed RDAP response: {0}")]
    Payload(#[from] serde_json::Error),
}
