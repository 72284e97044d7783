//! gunter library: IP geolocation, WHOIS and reverse DNS over HTTP
//!
//! The core of the crate is the GeoIP database lifecycle manager
//! ([`geoip::LifecycleManager`]): it acquires a MaxMind-format database from
//! an external URL, a local file or the MaxMind download service, keeps
//! exactly one database loaded, and replaces it on a schedule without ever
//! leaving lookups without an answer.
//!
//! # Example
//!
//! ```no_run
//! use gunter::{run_server, Config};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config {
//!     db_file: Some("/srv/geo/dbip-city-lite.mmdb".into()),
//!     db_dir: "./data".into(),
//!     ..Default::default()
//! };
//!
//! run_server(config).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Requirements
//!
//! This library requires a Tokio runtime. Use `#[tokio::main]` in your application
//! or ensure you're calling library functions within an async context.

#![warn(missing_docs)]

pub mod api;
mod app;
pub mod config;
pub mod error_handling;
pub mod geoip;
pub mod initialization;
pub mod whois;

// Re-export public API
pub use config::{Config, LogFormat, LogLevel};
pub use geoip::{LifecycleManager, RefreshOutcome};
pub use run::run_server;

// Internal run module (contains the server wiring)
mod run {
    use std::sync::Arc;

    use anyhow::{Context, Result};
    use tokio_util::sync::CancellationToken;

    use crate::api::{start_api_server, AppState};
    use crate::app::shutdown_gracefully;
    use crate::config::Config;
    use crate::error_handling::InitializationError;
    use crate::geoip::{LifecycleManager, RefreshOutcome, UpdateScheduler};
    use crate::initialization::init_resolver;
    use crate::whois::WhoisService;

    /// Runs the HTTP service until Ctrl-C.
    ///
    /// Loads the initial database, starts the update scheduler and serves the
    /// API. A failed initial load is not fatal: lookups answer 503 until a
    /// later update check succeeds.
    ///
    /// # Errors
    ///
    /// Fails if the storage directory cannot be created, the configuration
    /// is invalid or the listen address cannot be bound.
    pub async fn run_server(config: Config) -> Result<()> {
        let addr = config.listen_addr()?;
        let db_config = config.database_config();

        tokio::fs::create_dir_all(&db_config.storage_dir)
            .await
            .map_err(|source| InitializationError::StorageError {
                path: db_config.storage_dir.clone(),
                source,
            })
            .context("Failed to create database storage directory")?;

        let update_interval = db_config.update_interval;
        let manager = Arc::new(
            LifecycleManager::new(db_config).context("Failed to initialize database manager")?,
        );

        match manager.refresh().await {
            RefreshOutcome::Swapped { version_tag, .. } => {
                log::info!("GeoIP database {} ready", version_tag)
            }
            RefreshOutcome::NoStrategy => log::warn!(
                "No GeoIP database source configured; geo lookups will answer 503"
            ),
            RefreshOutcome::Failed(e) => log::error!(
                "Initial GeoIP database load failed, retrying on the update schedule: {}",
                e
            ),
            other => log::debug!("Initial GeoIP database refresh: {:?}", other),
        }

        let cancel = CancellationToken::new();
        // Static sources still need the scheduler until their first load succeeds
        let scheduler_task = manager.strategy().is_some().then(|| {
            UpdateScheduler::new(Arc::clone(&manager), update_interval).spawn(cancel.clone())
        });

        let resolver = init_resolver();
        let whois = WhoisService::new(&config.rdap_url, Some(resolver))
            .context("Failed to initialize WHOIS service")?;

        let state = AppState {
            manager: Arc::clone(&manager),
            whois: Arc::new(whois),
            default_lang: config.lang.trim().to_lowercase(),
            enable_status: config.enable_status,
        };

        let signal_cancel = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    log::info!("Received Ctrl-C, shutting down");
                    signal_cancel.cancel();
                }
                Err(e) => log::error!("Failed to listen for Ctrl-C: {}", e),
            }
        });

        let served = start_api_server(addr, state, cancel.clone()).await;
        shutdown_gracefully(cancel, scheduler_task, manager).await;
        served
    }
}
