//! JSON status handler.

use axum::extract::State;
use axum::Json;

use super::super::types::{AppState, StatusResponse};
use super::format_time;
use crate::config::UNKNOWN_VERSION_TAG;

/// Database lifecycle status
pub async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let status = state.manager.status();

    Json(StatusResponse {
        database_loaded: status.loaded,
        last_database_update_check_utc: format_time(status.last_check_time),
        last_database_load_utc: format_time(status.last_load_time),
        current_database_version_tag: status.version_tag,
        current_database_file: status
            .active_file_path
            .map_or_else(|| UNKNOWN_VERSION_TAG.to_string(), |p| p.display().to_string()),
        database_directory: status.storage_dir.display().to_string(),
        database_source: status.strategy,
        database_refreshable: status.refreshable,
    })
}
