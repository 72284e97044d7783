//! WHOIS handler.

use axum::extract::{Path, State};
use axum::Json;

use super::super::types::{ApiError, AppState};
use crate::whois::WhoisData;

/// WHOIS for an IP address or a domain name.
pub async fn whois_handler(
    State(state): State<AppState>,
    Path(target): Path<String>,
) -> Result<Json<WhoisData>, ApiError> {
    let data = state.whois.lookup(&target).await?;
    Ok(Json(data))
}
