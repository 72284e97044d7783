//! Database acquisition.
//!
//! The [`Fetcher`] turns a [`Strategy`] into a database file on disk:
//! - external URLs are streamed over HTTP(S) or retrieved over FTP/FTPS
//! - local files are validated in place
//! - vendor archives are downloaded and the database member extracted
//!
//! Downloads are written to `<final>.part` under a unique name and renamed
//! only once complete. Whatever a failed acquisition created is removed
//! before the error is returned.

mod archive;
mod ftp;
mod http;
mod local;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use tokio::sync::watch;
use url::Url;

use super::source::{redact_url, Strategy};
use super::types::DownloadProgress;
use crate::config::{
    DatabaseConfig, VendorConfig, ARCHIVE_FILE_SUFFIX, CONNECT_TIMEOUT,
    DATABASE_FILE_SUFFIXES, DEFAULT_DATABASE_EXTENSION, EXTERNAL_FILE_PREFIX,
    MAX_DATABASE_DOWNLOAD_SIZE, PARTIAL_FILE_SUFFIX,
};
use crate::error_handling::{FetchError, FetchErrorKind, InitializationError};

/// A database file produced by a successful acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredFile {
    /// Location of the complete file
    pub path: PathBuf,
    /// Whether the file was created by the fetcher (and may be deleted later)
    pub owned: bool,
}

/// Best-effort progress side channel shared with the blocking FTP task.
#[derive(Clone)]
pub(crate) struct ProgressReporter {
    sender: Arc<watch::Sender<DownloadProgress>>,
}

impl ProgressReporter {
    pub(crate) fn new(sender: watch::Sender<DownloadProgress>) -> Self {
        Self {
            sender: Arc::new(sender),
        }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<DownloadProgress> {
        self.sender.subscribe()
    }

    pub(crate) fn start(&self, total: Option<u64>) {
        self.sender.send_replace(DownloadProgress { bytes: 0, total });
    }

    pub(crate) fn advance(&self, bytes: u64) {
        let total = self.sender.borrow().total;
        let current = DownloadProgress { bytes, total };
        let previous = self.sender.send_replace(current);

        if let (Some(before), Some(now)) = (previous.percent(), current.percent()) {
            if now / 10 > before / 10 {
                log::debug!("Database download {}% ({} bytes)", now, bytes);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn current(&self) -> DownloadProgress {
        *self.sender.borrow()
    }
}

/// Performs acquisitions into the storage directory.
pub struct Fetcher {
    storage_dir: PathBuf,
    external_client: Client,
    vendor_client: Client,
    download_timeout: Duration,
    max_download_size: u64,
    owned_prefixes: Vec<String>,
    progress: ProgressReporter,
    sequence: AtomicU64,
}

impl Fetcher {
    /// Creates a fetcher writing into `config.storage_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn new(config: &DatabaseConfig) -> Result<Self, InitializationError> {
        let external_client = Client::builder()
            .timeout(config.download_timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        let vendor_client = Client::builder()
            .timeout(config.vendor_download_timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        let mut owned_prefixes = vec![EXTERNAL_FILE_PREFIX.to_string()];
        if let Some(vendor) = &config.sources.vendor {
            owned_prefixes.push(format!("{}-", vendor.edition));
        }

        Ok(Self {
            storage_dir: config.storage_dir.clone(),
            external_client,
            vendor_client,
            download_timeout: config.download_timeout,
            max_download_size: MAX_DATABASE_DOWNLOAD_SIZE,
            owned_prefixes,
            progress: ProgressReporter::new(watch::channel(DownloadProgress::default()).0),
            sequence: AtomicU64::new(0),
        })
    }

    /// Directory downloads are written to.
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Subscribes to download progress updates.
    pub fn subscribe_progress(&self) -> watch::Receiver<DownloadProgress> {
        self.progress.subscribe()
    }

    /// Acquires a database file for `strategy`.
    pub async fn acquire(&self, strategy: &Strategy) -> Result<AcquiredFile, FetchError> {
        match strategy {
            Strategy::ExternalUrl { url, .. } => self.fetch_external(url).await,
            Strategy::LocalFile(path) => {
                local::validate(path).await?;
                Ok(AcquiredFile {
                    path: path.clone(),
                    owned: false,
                })
            }
            Strategy::VendorArchive(vendor) => self.fetch_vendor(vendor).await,
        }
    }

    async fn fetch_external(&self, raw_url: &str) -> Result<AcquiredFile, FetchError> {
        let url = Url::parse(raw_url)
            .map_err(|e| FetchError::protocol(format!("invalid database URL: {}", e)))?;
        let dest = self.storage_dir.join(format!(
            "{}{}{}",
            EXTERNAL_FILE_PREFIX,
            self.unique_stamp(),
            extension_of(&url)
        ));
        let part = partial_path(&dest);

        log::info!("Downloading GeoIP database from {}", redact_url(raw_url));
        let result = match url.scheme() {
            "http" | "https" => {
                http::download(
                    &self.external_client,
                    url.as_str(),
                    &part,
                    self.max_download_size,
                    &self.progress,
                )
                .await
            }
            "ftp" | "ftps" => {
                let target = ftp::FtpTarget::parse(&url)?;
                ftp::download(
                    target,
                    &part,
                    self.max_download_size,
                    self.download_timeout,
                    &self.progress,
                )
                .await
            }
            other => Err(FetchError::protocol(format!(
                "unsupported URL scheme: {}",
                other
            ))),
        };

        let size = commit(result, &part, &dest).await?;
        log::info!("Downloaded {} ({} bytes)", dest.display(), size);
        Ok(AcquiredFile {
            path: dest,
            owned: true,
        })
    }

    async fn fetch_vendor(&self, vendor: &VendorConfig) -> Result<AcquiredFile, FetchError> {
        let url = Url::parse_with_params(
            &vendor.endpoint,
            &[
                ("edition_id", vendor.edition.as_str()),
                ("license_key", vendor.license_key.as_str()),
                ("suffix", "tar.gz"),
            ],
        )
        .map_err(|e| FetchError::protocol(format!("invalid vendor endpoint: {}", e)))?;

        let stem = format!("{}-{}", vendor.edition, self.unique_stamp());
        let archive_path = self.storage_dir.join(format!("{}{}", stem, ARCHIVE_FILE_SUFFIX));
        let dest = self
            .storage_dir
            .join(format!("{}{}", stem, DEFAULT_DATABASE_EXTENSION));

        log::info!(
            "Downloading {} archive from {}",
            vendor.edition,
            redact_url(&vendor.endpoint)
        );
        let archive_part = partial_path(&archive_path);
        let downloaded = http::download(
            &self.vendor_client,
            url.as_str(),
            &archive_part,
            self.max_download_size,
            &self.progress,
        )
        .await;

        let result = match commit(downloaded, &archive_part, &archive_path).await {
            Ok(_) => extract(&archive_path, &dest, self.max_download_size).await,
            Err(e) => Err(e),
        };
        // The archive is never kept, whatever happened
        remove_quietly(&archive_path).await;

        let size = result?;
        log::info!("Extracted {} ({} bytes)", dest.display(), size);
        Ok(AcquiredFile {
            path: dest,
            owned: true,
        })
    }

    /// Removes manager-owned files in the storage directory other than `keep`.
    ///
    /// Owned files start with `external-` or `<edition>-` and end in a
    /// database, archive or partial-download suffix. Returns how many were removed.
    pub async fn sweep(&self, keep: &Path) -> usize {
        let mut entries = match tokio::fs::read_dir(&self.storage_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!(
                    "Failed to list storage directory {}: {}",
                    self.storage_dir.display(),
                    e
                );
                return 0;
            }
        };

        let mut removed = 0;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    log::warn!("Failed to read storage directory entry: {}", e);
                    break;
                }
            };
            let path = entry.path();
            if path == keep {
                continue;
            }
            let is_owned = entry
                .file_name()
                .to_str()
                .is_some_and(|name| self.is_owned_name(name));
            if !is_owned {
                continue;
            }
            match entry.file_type().await {
                Ok(file_type) if file_type.is_file() => {}
                _ => continue,
            }
            if remove_quietly(&path).await {
                log::info!("Removed stale database file {}", path.display());
                removed += 1;
            }
        }
        removed
    }

    fn is_owned_name(&self, name: &str) -> bool {
        let has_prefix = self.owned_prefixes.iter().any(|p| name.starts_with(p.as_str()));
        let has_suffix = DATABASE_FILE_SUFFIXES
            .iter()
            .chain([ARCHIVE_FILE_SUFFIX, PARTIAL_FILE_SUFFIX].iter())
            .any(|s| name.ends_with(s));
        has_prefix && has_suffix
    }

    /// Wall-clock timestamp plus a per-fetcher sequence number.
    fn unique_stamp(&self) -> String {
        format!(
            "{}-{}",
            Utc::now().format("%Y%m%d%H%M%S%3f"),
            self.sequence.fetch_add(1, Ordering::Relaxed)
        )
    }

    #[cfg(test)]
    fn with_max_download_size(mut self, max: u64) -> Self {
        self.max_download_size = max;
        self
    }
}

/// File extension taken from the URL path, `.mmdb` when there is no usable one.
fn extension_of(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext))
        .unwrap_or_else(|| DEFAULT_DATABASE_EXTENSION.to_string())
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name: OsString = dest.as_os_str().to_owned();
    name.push(PARTIAL_FILE_SUFFIX);
    PathBuf::from(name)
}

/// Renames a finished `.part` file into place, or removes it on failure.
async fn commit(
    result: Result<u64, FetchError>,
    part: &Path,
    dest: &Path,
) -> Result<u64, FetchError> {
    match result {
        Ok(size) => match tokio::fs::rename(part, dest).await {
            Ok(()) => Ok(size),
            Err(e) => {
                remove_quietly(part).await;
                Err(FetchError::filesystem(
                    format!("failed to move download into {}", dest.display()),
                    e,
                ))
            }
        },
        Err(e) => {
            remove_quietly(part).await;
            Err(e)
        }
    }
}

async fn extract(archive_path: &Path, dest: &Path, max_bytes: u64) -> Result<u64, FetchError> {
    let part = partial_path(dest);
    let (archive_owned, part_owned) = (archive_path.to_path_buf(), part.clone());
    let result = tokio::task::spawn_blocking(move || {
        archive::extract_database(&archive_owned, &part_owned, max_bytes)
    })
    .await
    .unwrap_or_else(|e| {
        Err(FetchError::new(
            FetchErrorKind::Format,
            format!("extraction task failed: {}", e),
        ))
    });
    commit(result, &part, dest).await
}

/// Removes `path`, ignoring a missing file. Returns whether a file was removed.
pub(crate) async fn remove_quietly(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            log::warn!("Failed to remove {}: {}", path.display(), e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceConfig;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use httptest::{matchers::*, responders::*, Expectation, Server};
    use std::io::Write;
    use tempfile::TempDir;

    fn fetcher(dir: &Path, sources: SourceConfig) -> Fetcher {
        Fetcher::new(&DatabaseConfig::new(dir, sources)).expect("client should build")
    }

    fn vendor(endpoint: String) -> VendorConfig {
        VendorConfig {
            license_key: "secret-key".to_string(),
            endpoint,
            edition: "GeoLite2-City".to_string(),
        }
    }

    fn files_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn tar_gz(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_path(name).unwrap();
            header.set_size(content.len() as u64);
            header.set_cksum();
            builder.append(&header, *content).unwrap();
        }
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&builder.into_inner().unwrap()).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_extension_of() {
        let ext = |raw: &str| extension_of(&Url::parse(raw).unwrap());
        assert_eq!(ext("https://example.com/GeoLite2-City.mmdb"), ".mmdb");
        assert_eq!(ext("https://example.com/geo/city.dat?x=1"), ".dat");
        assert_eq!(ext("https://example.com/download"), ".mmdb");
        assert_eq!(ext("https://example.com/"), ".mmdb");
        assert_eq!(ext("ftp://example.com/db.we!rd"), ".mmdb");
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/data/external-1.mmdb")),
            PathBuf::from("/data/external-1.mmdb.part")
        );
    }

    #[test]
    fn test_unique_stamps_differ() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let fetcher = fetcher(temp_dir.path(), SourceConfig::default());
        assert_ne!(fetcher.unique_stamp(), fetcher.unique_stamp());
    }

    #[tokio::test]
    async fn test_fetch_external_http_success() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/GeoLite2-City.mmdb"))
                .respond_with(status_code(200).body("mmdb bytes")),
        );

        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let fetcher = fetcher(temp_dir.path(), SourceConfig::default());
        let strategy = Strategy::ExternalUrl {
            url: server.url("/GeoLite2-City.mmdb").to_string(),
            pinned: true,
        };

        let acquired = fetcher.acquire(&strategy).await.expect("download should succeed");
        assert!(acquired.owned);
        assert_eq!(acquired.path.parent(), Some(temp_dir.path()));
        let name = acquired.path.file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.starts_with("external-"));
        assert!(name.ends_with(".mmdb"));
        assert_eq!(std::fs::read(&acquired.path).unwrap(), b"mmdb bytes");
        assert_eq!(files_in(temp_dir.path()), vec![name]);
    }

    #[tokio::test]
    async fn test_fetch_external_failure_leaves_nothing() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/db.mmdb"))
                .respond_with(status_code(200).body(vec![0u8; 4096])),
        );

        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let fetcher = fetcher(temp_dir.path(), SourceConfig::default()).with_max_download_size(100);
        let strategy = Strategy::ExternalUrl {
            url: server.url("/db.mmdb").to_string(),
            pinned: false,
        };

        let err = fetcher.acquire(&strategy).await.unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::Protocol);
        assert!(files_in(temp_dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_fetch_external_unsupported_scheme() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let fetcher = fetcher(temp_dir.path(), SourceConfig::default());
        let strategy = Strategy::ExternalUrl {
            url: "gopher://example.com/db.mmdb".to_string(),
            pinned: true,
        };

        let err = fetcher.acquire(&strategy).await.unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::Protocol);
        assert!(files_in(temp_dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_fetch_local_file_is_not_owned() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let local = temp_dir.path().join("custom.mmdb");
        std::fs::write(&local, b"data").unwrap();

        let fetcher = fetcher(temp_dir.path(), SourceConfig::default());
        let acquired = fetcher
            .acquire(&Strategy::LocalFile(local.clone()))
            .await
            .expect("local file should validate");
        assert_eq!(
            acquired,
            AcquiredFile {
                path: local,
                owned: false
            }
        );
    }

    #[tokio::test]
    async fn test_fetch_vendor_archive_extracts_and_removes_archive() {
        let server = Server::run();
        server.expect(
            Expectation::matching(httptest::all_of![
                request::method_path("GET", "/app/geoip_download"),
                request::query(url_decoded(contains(("edition_id", "GeoLite2-City")))),
                request::query(url_decoded(contains(("license_key", "secret-key")))),
                request::query(url_decoded(contains(("suffix", "tar.gz")))),
            ])
            .respond_with(status_code(200).body(tar_gz(&[
                ("GeoLite2-City_20240101/COPYRIGHT.txt", b"c"),
                ("GeoLite2-City_20240101/GeoLite2-City.mmdb", b"city data"),
            ]))),
        );

        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let vendor = vendor(server.url("/app/geoip_download").to_string());
        let fetcher = fetcher(
            temp_dir.path(),
            SourceConfig {
                vendor: Some(vendor.clone()),
                ..Default::default()
            },
        );

        let acquired = fetcher
            .acquire(&Strategy::VendorArchive(vendor))
            .await
            .expect("vendor download should succeed");
        assert!(acquired.owned);
        assert_eq!(std::fs::read(&acquired.path).unwrap(), b"city data");

        let name = acquired.path.file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.starts_with("GeoLite2-City-"));
        assert!(name.ends_with(".mmdb"));
        // Only the extracted database remains
        assert_eq!(files_in(temp_dir.path()), vec![name]);
    }

    #[tokio::test]
    async fn test_fetch_vendor_archive_without_database() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/app/geoip_download"))
                .respond_with(status_code(200).body(tar_gz(&[("README.txt", b"nothing")]))),
        );

        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let vendor = vendor(server.url("/app/geoip_download").to_string());
        let fetcher = fetcher(temp_dir.path(), SourceConfig::default());

        let err = fetcher
            .acquire(&Strategy::VendorArchive(vendor))
            .await
            .unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::Format);
        assert!(files_in(temp_dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_fetch_vendor_error_does_not_leak_license_key() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/app/geoip_download"))
                .respond_with(status_code(401)),
        );

        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let vendor = vendor(server.url("/app/geoip_download").to_string());
        let fetcher = fetcher(temp_dir.path(), SourceConfig::default());

        let err = fetcher
            .acquire(&Strategy::VendorArchive(vendor))
            .await
            .unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::Protocol);
        assert!(!err.to_string().contains("secret-key"));
        assert!(files_in(temp_dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_sweep_removes_only_owned_leftovers() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dir = temp_dir.path();
        for name in [
            "external-20240101000000000-0.mmdb",
            "external-20240101000000000-1.mmdb.part",
            "GeoLite2-City-20240101000000000-2.tar.gz",
            "GeoLite2-City-20240101000000000-3.mmdb",
            "notes.txt",
            "custom.mmdb",
        ] {
            std::fs::write(dir.join(name), b"x").unwrap();
        }

        let fetcher = fetcher(
            dir,
            SourceConfig {
                vendor: Some(vendor("https://download.example.com".to_string())),
                ..Default::default()
            },
        );
        let keep = dir.join("GeoLite2-City-20240101000000000-3.mmdb");

        assert_eq!(fetcher.sweep(&keep).await, 3);
        assert_eq!(
            files_in(dir),
            vec![
                "GeoLite2-City-20240101000000000-3.mmdb".to_string(),
                "custom.mmdb".to_string(),
                "notes.txt".to_string(),
            ]
        );
    }

    #[test]
    fn test_progress_reporter_tracks_total() {
        let reporter = ProgressReporter::new(watch::channel(DownloadProgress::default()).0);
        let receiver = reporter.subscribe();
        reporter.start(Some(200));
        reporter.advance(50);
        assert_eq!(
            *receiver.borrow(),
            DownloadProgress {
                bytes: 50,
                total: Some(200)
            }
        );
        assert_eq!(reporter.current().percent(), Some(25));
    }
}
