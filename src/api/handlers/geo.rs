//! Geolocation handler.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde_json::{json, Value};

use super::super::types::{ApiError, AppState, GeoLookupQuery};
use super::format_time;
use crate::config::{FALLBACK_LANG, WHOIS_ENRICHMENT_TIMEOUT};
use crate::geoip::localize;

/// Geolocates an IP address, optionally enriched with WHOIS data.
///
/// Responds 503 before any database is loaded, then 400 for a malformed
/// address and 404 for an address the database does not know.
pub async fn geo_lookup_handler(
    State(state): State<AppState>,
    Path(ip): Path<String>,
    Query(query): Query<GeoLookupQuery>,
) -> Result<Json<Value>, ApiError> {
    let ip = ip.trim().to_string();
    let found = state.manager.lookup_with_source(&ip).inspect_err(|e| {
        log::debug!("Geo lookup for {} failed: {}", ip, e);
    })?;

    let lang = query
        .lang
        .as_deref()
        .map(str::trim)
        .filter(|lang| !lang.is_empty())
        .unwrap_or(&state.default_lang)
        .to_lowercase();

    let mut body = match localize(&found.record, &lang, FALLBACK_LANG) {
        Value::Object(map) => map,
        other => {
            log::error!("Unexpected record shape for {}: {}", ip, other);
            return Err(ApiError::Internal);
        }
    };

    body.insert(
        "database_info".to_string(),
        json!({
            "last_updated_utc": format_time(found.loaded_at),
            "version_tag": found.version_tag,
        }),
    );

    if query.wants_whois() {
        if let Some(whois) = enrich(&state, &ip).await {
            body.insert("whois_data".to_string(), whois);
        }
    }

    log::info!("Geo lookup for {} successful", ip);
    Ok(Json(Value::Object(body)))
}

/// WHOIS data for `ip`, or `None` if RDAP fails or is too slow.
async fn enrich(state: &AppState, ip: &str) -> Option<Value> {
    match tokio::time::timeout(WHOIS_ENRICHMENT_TIMEOUT, state.whois.lookup(ip)).await {
        Ok(Ok(data)) => serde_json::to_value(data)
            .inspect_err(|e| log::warn!("Could not serialize WHOIS data for {}: {}", ip, e))
            .ok(),
        Ok(Err(e)) => {
            log::warn!("WHOIS enrichment for {} failed: {}", ip, e);
            None
        }
        Err(_) => {
            log::warn!(
                "WHOIS enrichment for {} timed out after {}s",
                ip,
                WHOIS_ENRICHMENT_TIMEOUT.as_secs()
            );
            None
        }
    }
}
