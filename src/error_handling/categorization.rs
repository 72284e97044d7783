//! Error categorization.
//!
//! Maps transport and filesystem errors onto [`FetchErrorKind`] so refresh
//! failures are reported consistently regardless of which fetcher raised them.

use super::types::{FetchError, FetchErrorKind};

/// Categorizes a `reqwest::Error` into a `FetchErrorKind`.
///
/// Errors carrying an HTTP status are protocol failures; builder errors mean the
/// URL itself was unusable, which is also treated as a protocol failure.
/// Everything else (connect, timeout, body, decode, redirect) is a network failure.
pub fn categorize_reqwest_error(error: &reqwest::Error) -> FetchErrorKind {
    if error.status().is_some() || error.is_status() || error.is_builder() {
        FetchErrorKind::Protocol
    } else {
        FetchErrorKind::Network
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        let kind = categorize_reqwest_error(&error);
        // reqwest includes the full URL in its Display output; strip it so
        // license keys in query strings never reach the logs.
        let message = error.without_url().to_string();
        FetchError::new(kind, message)
    }
}

impl From<std::io::Error> for FetchError {
    fn from(error: std::io::Error) -> Self {
        FetchError::filesystem(error.to_string(), error)
    }
}
