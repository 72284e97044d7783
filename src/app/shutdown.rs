//! Graceful shutdown handling.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::geoip::LifecycleManager;

/// Shuts down all background tasks gracefully.
///
/// Stops the update scheduler, waits for it, then releases the active
/// database. The database file stays on disk for the next start.
pub async fn shutdown_gracefully(
    cancel: CancellationToken,
    scheduler_task: Option<JoinHandle<()>>,
    manager: Arc<LifecycleManager>,
) {
    cancel.cancel();
    if let Some(scheduler_task) = scheduler_task {
        if let Err(e) = scheduler_task.await {
            log::warn!("Update scheduler task ended abnormally: {}", e);
        }
    }

    manager.shutdown();
    log::info!("Shutdown complete");
}
