//! Database lifecycle manager.
//!
//! The [`LifecycleManager`] owns the single active [`DatabaseHandle`]. It
//! acquires new databases through the [`Fetcher`], swaps them in atomically
//! and retires superseded files.
//!
//! Two locks are involved:
//! - `state` guards a pointer to an immutable [`ManagerState`]. Readers clone
//!   the pointer and release the lock immediately, so lookups never wait on a
//!   refresh. A swap replaces the pointer in one step.
//! - `refresh_lock` serializes refreshes. It is only ever `try_lock`ed, so a
//!   refresh requested while another is running is dropped, not queued.
//!
//! After [`LifecycleManager::shutdown`] no refresh installs a database again,
//! including one that was already running.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};

use super::fetch::{remove_quietly, AcquiredFile, Fetcher};
use super::handle::{DatabaseHandle, DatabaseLoader, MmdbLoader};
use super::source::{self, Strategy};
use super::types::{DatabaseStatus, DownloadProgress, GeoMatch, GeoRecord};
use crate::config::{DatabaseConfig, UNKNOWN_VERSION_TAG};
use crate::error_handling::{DatabaseError, InitializationError, LookupError, RefreshError};

/// Result of a refresh or update check. Refresh failures end here.
#[derive(Debug)]
pub enum RefreshOutcome {
    /// A new database was swapped in.
    Swapped {
        /// File backing the new database
        path: PathBuf,
        /// Version of the new database
        version_tag: String,
    },
    /// The acquired database has the active version; the active one was kept.
    Unchanged {
        /// Version of the active database
        version_tag: String,
    },
    /// The strategy is static and a database is already loaded.
    Static,
    /// No source is configured.
    NoStrategy,
    /// Another refresh was in flight.
    AlreadyRunning,
    /// The manager was shut down; nothing was installed.
    ShutDown,
    /// Acquisition or opening failed; the previous database (if any) is still active.
    Failed(RefreshError),
}

impl RefreshOutcome {
    /// Whether a new database was swapped in.
    pub fn is_swapped(&self) -> bool {
        matches!(self, RefreshOutcome::Swapped { .. })
    }
}

#[derive(Debug, Clone)]
struct ManagerState {
    handle: Option<Arc<DatabaseHandle>>,
    version_tag: String,
    last_load_time: Option<DateTime<Utc>>,
    last_check_time: Option<DateTime<Utc>>,
}

impl Default for ManagerState {
    fn default() -> Self {
        Self {
            handle: None,
            version_tag: UNKNOWN_VERSION_TAG.to_string(),
            last_load_time: None,
            last_check_time: None,
        }
    }
}

/// Holds the active database and drives its replacement.
pub struct LifecycleManager {
    config: DatabaseConfig,
    strategy: Option<Strategy>,
    fetcher: Fetcher,
    loader: Arc<dyn DatabaseLoader>,
    state: RwLock<Arc<ManagerState>>,
    refresh_lock: Mutex<()>,
    closed: AtomicBool,
}

impl LifecycleManager {
    /// Creates a manager that opens MaxMind DB files.
    ///
    /// Nothing is loaded until [`refresh`](Self::refresh) is called.
    pub fn new(config: DatabaseConfig) -> Result<Self, InitializationError> {
        Self::with_loader(config, Arc::new(MmdbLoader))
    }

    /// Creates a manager with a custom database format.
    pub fn with_loader(
        config: DatabaseConfig,
        loader: Arc<dyn DatabaseLoader>,
    ) -> Result<Self, InitializationError> {
        let strategy = source::select(&config.sources);
        match &strategy {
            Some(strategy) => log::info!(
                "GeoIP database source: {} ({})",
                strategy.describe(),
                if strategy.is_refreshable() {
                    "refreshable"
                } else {
                    "static"
                }
            ),
            None => log::warn!(
                "No GeoIP database source configured, geo lookups will report the database as unavailable"
            ),
        }

        let fetcher = Fetcher::new(&config)?;
        Ok(Self {
            config,
            strategy,
            fetcher,
            loader,
            state: RwLock::new(Arc::new(ManagerState::default())),
            refresh_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        })
    }

    /// The selected acquisition strategy, if any.
    pub fn strategy(&self) -> Option<&Strategy> {
        self.strategy.as_ref()
    }

    /// Whether scheduled update checks re-acquire the database.
    pub fn is_refreshable(&self) -> bool {
        self.strategy.as_ref().is_some_and(Strategy::is_refreshable)
    }

    /// Configuration the manager was built with.
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Subscribes to progress of in-flight downloads.
    pub fn subscribe_progress(&self) -> watch::Receiver<DownloadProgress> {
        self.fetcher.subscribe_progress()
    }

    fn snapshot(&self) -> Arc<ManagerState> {
        Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Acquires and swaps in a database, whatever the strategy.
    ///
    /// Returns [`RefreshOutcome::AlreadyRunning`] without waiting if another
    /// refresh holds the refresh lock.
    pub async fn refresh(&self) -> RefreshOutcome {
        let Ok(_guard) = self.refresh_lock.try_lock() else {
            log::info!("GeoIP database refresh already in progress, skipping");
            return RefreshOutcome::AlreadyRunning;
        };
        if self.is_closed() {
            log::debug!("GeoIP database manager is shut down, skipping refresh");
            return RefreshOutcome::ShutDown;
        }
        self.refresh_exclusive().await
    }

    /// Scheduled update check.
    ///
    /// Static strategies are left alone once a database is loaded; until then
    /// they are retried like any other.
    pub async fn check_for_update(&self) -> RefreshOutcome {
        match &self.strategy {
            None => {
                log::debug!("No GeoIP database source configured, nothing to check");
                RefreshOutcome::NoStrategy
            }
            Some(strategy) if !strategy.is_refreshable() && self.snapshot().handle.is_some() => {
                log::info!(
                    "GeoIP database source is static ({}), skipping update check",
                    strategy.name()
                );
                RefreshOutcome::Static
            }
            Some(_) => self.refresh().await,
        }
    }

    async fn refresh_exclusive(&self) -> RefreshOutcome {
        let Some(strategy) = &self.strategy else {
            log::warn!("GeoIP database refresh requested but no source is configured");
            return RefreshOutcome::NoStrategy;
        };

        self.record_check_time();
        log::info!("Refreshing GeoIP database from {}", strategy.describe());

        let acquired = match self.fetcher.acquire(strategy).await {
            Ok(acquired) => acquired,
            Err(e) => {
                log::error!("Failed to acquire GeoIP database: {}", e);
                return RefreshOutcome::Failed(e.into());
            }
        };

        let handle = match self.open(&acquired).await {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("Failed to open GeoIP database: {}", e);
                if acquired.owned {
                    remove_quietly(&acquired.path).await;
                }
                return RefreshOutcome::Failed(e.into());
            }
        };

        let current = self.snapshot();
        if let Some(active) = &current.handle {
            if active.version() == handle.version() {
                let version_tag = active.version().to_string();
                let active_path = active.path().to_path_buf();
                log::info!(
                    "GeoIP database is up to date ({}), keeping {}",
                    version_tag,
                    active_path.display()
                );
                handle.close();
                if acquired.owned && acquired.path != active_path {
                    remove_quietly(&acquired.path).await;
                }
                self.sweep(strategy, &active_path).await;
                return RefreshOutcome::Unchanged { version_tag };
            }
        }
        drop(current);

        let handle = Arc::new(handle);
        let path = handle.path().to_path_buf();
        let version_tag = handle.version().to_string();
        let installed = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            // Checked under the write lock so a concurrent shutdown is never undone
            if self.is_closed() {
                None
            } else {
                let previous = state.handle.clone();
                *state = Arc::new(ManagerState {
                    handle: Some(Arc::clone(&handle)),
                    version_tag: version_tag.clone(),
                    last_load_time: Some(Utc::now()),
                    last_check_time: state.last_check_time,
                });
                Some(previous)
            }
        };
        let Some(previous) = installed else {
            log::info!(
                "Discarding GeoIP database {} acquired during shutdown",
                path.display()
            );
            retire(handle, Path::new("")).await;
            return RefreshOutcome::ShutDown;
        };
        drop(handle);
        log::info!(
            "GeoIP database loaded: {} (version {})",
            path.display(),
            version_tag
        );

        if let Some(previous) = previous {
            retire(previous, &path).await;
        }
        self.sweep(strategy, &path).await;

        RefreshOutcome::Swapped { path, version_tag }
    }

    async fn open(&self, acquired: &AcquiredFile) -> Result<DatabaseHandle, DatabaseError> {
        let loader = Arc::clone(&self.loader);
        let path = acquired.path.clone();
        let owned = acquired.owned;
        tokio::task::spawn_blocking(move || DatabaseHandle::open(loader.as_ref(), &path, owned))
            .await
            .unwrap_or_else(|e| {
                Err(DatabaseError::Open {
                    path: acquired.path.clone(),
                    message: format!("loader task failed: {}", e),
                })
            })
    }

    async fn sweep(&self, strategy: &Strategy, keep: &Path) {
        if !strategy.owns_files() {
            return;
        }
        let removed = self.fetcher.sweep(keep).await;
        if removed > 0 {
            log::info!("Removed {} stale file(s) from storage directory", removed);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn record_check_time(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        Arc::make_mut(&mut state).last_check_time = Some(Utc::now());
    }

    /// Looks up `ip` in the active database.
    ///
    /// # Errors
    ///
    /// - [`LookupError::Unavailable`] when no database is loaded (checked first)
    /// - [`LookupError::InvalidAddress`] when `ip` does not parse
    /// - [`LookupError::NotFound`] when the database has no record
    pub fn lookup(&self, ip: &str) -> Result<GeoRecord, LookupError> {
        self.lookup_with_source(ip).map(|found| found.record)
    }

    /// Like [`lookup`](Self::lookup), also reporting which database answered.
    ///
    /// Record, version and load time come from the same snapshot, so they
    /// agree even if a swap happens concurrently.
    pub fn lookup_with_source(&self, ip: &str) -> Result<GeoMatch, LookupError> {
        let state = self.snapshot();
        let handle = state.handle.as_ref().ok_or(LookupError::Unavailable)?;
        let addr: IpAddr = ip
            .trim()
            .parse()
            .map_err(|_| LookupError::InvalidAddress(ip.to_string()))?;
        let record = handle
            .lookup(addr)?
            .ok_or_else(|| LookupError::NotFound(addr.to_string()))?;
        Ok(GeoMatch {
            record,
            version_tag: state.version_tag.clone(),
            loaded_at: state.last_load_time,
        })
    }

    /// Consistent snapshot of the manager state.
    pub fn status(&self) -> DatabaseStatus {
        let state = self.snapshot();
        DatabaseStatus {
            loaded: state.handle.is_some(),
            last_load_time: state.last_load_time,
            last_check_time: state.last_check_time,
            version_tag: state.version_tag.clone(),
            active_file_path: state.handle.as_ref().map(|h| h.path().to_path_buf()),
            storage_dir: self.config.storage_dir.clone(),
            strategy: self
                .strategy
                .as_ref()
                .map_or("none", Strategy::name)
                .to_string(),
            refreshable: self.is_refreshable(),
        }
    }

    /// Releases the active database. Its file stays on disk.
    ///
    /// Refreshes still running when this is called complete without
    /// installing anything.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let previous = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let previous = state.handle.clone();
            *state = Arc::new(ManagerState {
                last_check_time: state.last_check_time,
                last_load_time: state.last_load_time,
                ..ManagerState::default()
            });
            previous
        };
        if let Some(handle) = previous {
            log::info!("Releasing GeoIP database {}", handle.path().display());
            if let Ok(handle) = Arc::try_unwrap(handle) {
                handle.close();
            }
        }
    }
}

/// Closes a superseded handle and deletes its file if the manager owns it.
async fn retire(previous: Arc<DatabaseHandle>, active_path: &Path) {
    let old_path = previous.path().to_path_buf();
    let delete = previous.is_owned() && old_path != active_path;

    match Arc::try_unwrap(previous) {
        Ok(handle) => handle.close(),
        // In-flight lookups still hold it; the last one drops it
        Err(_) => log::debug!("Previous GeoIP database still referenced by lookups"),
    }

    if delete && remove_quietly(&old_path).await {
        log::info!("Removed superseded database {}", old_path.display());
    }
}
