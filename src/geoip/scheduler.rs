//! Periodic database update checks.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::manager::{LifecycleManager, RefreshOutcome};

/// Fires [`LifecycleManager::check_for_update`] on a fixed interval.
///
/// Checks run inside the scheduler task, so once its handle resolves no
/// check is in flight. Ticks missed while a slow check runs are skipped.
/// A manual refresh racing a tick is dropped by the manager's refresh lock.
pub struct UpdateScheduler {
    manager: Arc<LifecycleManager>,
    interval: Duration,
}

impl UpdateScheduler {
    /// Creates a scheduler. The first check happens one `interval` from start.
    pub fn new(manager: Arc<LifecycleManager>, interval: Duration) -> Self {
        Self { manager, interval }
    }

    /// Runs the scheduler on the runtime until `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// Scheduler loop.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        log::info!(
            "GeoIP database update check scheduled every {}s",
            self.interval.as_secs()
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            // A check in flight always finishes before `cancel` is looked at again
            self.tick().await;
        }
        log::info!("GeoIP update scheduler stopped");
    }

    /// Runs one update check to completion.
    pub async fn tick(&self) -> RefreshOutcome {
        log::debug!("Running scheduled GeoIP database update check");
        let outcome = self.manager.check_for_update().await;
        log_outcome(&outcome);
        outcome
    }
}

fn log_outcome(outcome: &RefreshOutcome) {
    match outcome {
        RefreshOutcome::Swapped { path, version_tag } => log::info!(
            "Scheduled update installed {} ({})",
            path.display(),
            version_tag
        ),
        RefreshOutcome::Unchanged { version_tag } => {
            log::info!("Scheduled update check: database {} is current", version_tag)
        }
        RefreshOutcome::Static | RefreshOutcome::NoStrategy => {
            log::debug!("Scheduled update check: nothing to do")
        }
        RefreshOutcome::AlreadyRunning => {
            log::info!("Scheduled update check skipped, a refresh is still running")
        }
        RefreshOutcome::ShutDown => {
            log::debug!("Scheduled update check skipped, database manager is shut down")
        }
        RefreshOutcome::Failed(e) => log::warn!(
            "Scheduled update check failed, keeping the current database: {}",
            e
        ),
    }
}
