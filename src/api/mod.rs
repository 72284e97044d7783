//! HTTP API.
//!
//! Endpoints:
//! - `/api/geo-lookup/:ip` - geolocation, optionally enriched with WHOIS data
//! - `/api/whois/:target` - WHOIS for an IP address or a domain
//! - `/api/status` - database lifecycle status (when enabled)

mod handlers;
mod types;

use std::net::SocketAddr;

use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;

use handlers::{geo_lookup_handler, status_handler, whois_handler};
pub use types::{ApiError, AppState, GeoLookupQuery, StatusResponse};

/// Builds the API router.
pub fn router(state: AppState) -> Router {
    let mut api = Router::new()
        .route("/geo-lookup/:ip", get(geo_lookup_handler))
        .route("/whois/:target", get(whois_handler));
    if state.enable_status {
        api = api.route("/status", get(status_handler));
    }

    Router::new().nest("/api", api).with_state(state)
}

/// Creates and starts the API server. Returns once `cancel` fires and
/// in-flight requests have completed.
pub async fn start_api_server(
    addr: SocketAddr,
    state: AppState,
    cancel: CancellationToken,
) -> Result<(), anyhow::Error> {
    let enable_status = state.enable_status;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind API server to {}: {}", addr, e))?;

    log::info!("API server listening on http://{}/", addr);
    log::info!("  - Geo lookup: http://{}/api/geo-lookup/<ip>", addr);
    log::info!("  - WHOIS: http://{}/api/whois/<target>", addr);
    if enable_status {
        log::info!("  - Status: http://{}/api/status", addr);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| anyhow::anyhow!("API server error: {}", e))?;

    log::info!("API server stopped");
    Ok(())
}
