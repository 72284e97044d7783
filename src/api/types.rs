//! API server data structures.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error_handling::{LookupError, WhoisError};
use crate::geoip::LifecycleManager;
use crate::whois::WhoisService;

/// Shared state for the API server
#[derive(Clone)]
pub struct AppState {
    /// Database lifecycle manager answering geo lookups
    pub manager: Arc<LifecycleManager>,
    /// WHOIS/RDAP client
    pub whois: Arc<WhoisService>,
    /// Language used when a request does not name one
    pub default_lang: String,
    /// Whether `/api/status` is served
    pub enable_status: bool,
}

/// Query parameters of `/api/geo-lookup/:ip`
#[derive(Debug, Default, Deserialize)]
pub struct GeoLookupQuery {
    /// Response language (e.g. `de`)
    pub lang: Option<String>,
    /// `true` to skip WHOIS enrichment
    pub exclude_whois: Option<String>,
}

impl GeoLookupQuery {
    pub(crate) fn wants_whois(&self) -> bool {
        !self
            .exclude_whois
            .as_deref()
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
    }
}

/// JSON response for `/api/status`
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Whether lookups can be answered
    pub database_loaded: bool,
    /// Start of the last refresh attempt
    pub last_database_update_check_utc: String,
    /// When the active database was loaded
    pub last_database_load_utc: String,
    /// Version of the active database
    pub current_database_version_tag: String,
    /// File backing the active database
    pub current_database_file: String,
    /// Storage directory for downloaded databases
    pub database_directory: String,
    /// Acquisition strategy name
    pub database_source: String,
    /// Whether scheduled checks re-acquire the database
    pub database_refreshable: bool,
}

/// Errors returned to API clients as `{"error": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    /// No database is loaded (503)
    DatabaseUnavailable,
    /// Malformed IP address (400)
    InvalidAddress,
    /// IP address not in the database (404)
    NotFound,
    /// Malformed WHOIS target (400)
    InvalidTarget,
    /// The RDAP service failed (502)
    Upstream,
    /// Anything else (500)
    Internal,
}

impl ApiError {
    fn status_and_message(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::DatabaseUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "GeoIP database not available. Please try again later.",
            ),
            ApiError::InvalidAddress => (StatusCode::BAD_REQUEST, "Invalid IP address format."),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "IP address not found in the database."),
            ApiError::InvalidTarget => (
                StatusCode::BAD_REQUEST,
                "Target must be an IP address or a domain name.",
            ),
            ApiError::Upstream => (StatusCode::BAD_GATEWAY, "WHOIS lookup failed."),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An internal server error occurred.",
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<LookupError> for ApiError {
    fn from(error: LookupError) -> Self {
        match error {
            LookupError::Unavailable => ApiError::DatabaseUnavailable,
            LookupError::InvalidAddress(_) => ApiError::InvalidAddress,
            LookupError::NotFound(_) => ApiError::NotFound,
            LookupError::Database(e) => {
                log::error!("GeoIP database lookup failed: {}", e);
                ApiError::Internal
            }
        }
    }
}

impl From<WhoisError> for ApiError {
    fn from(error: WhoisError) -> Self {
        match error {
            WhoisError::InvalidTarget(_) => ApiError::InvalidTarget,
            _ => ApiError::Upstream,
        }
    }
}
