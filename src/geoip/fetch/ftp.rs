//! FTP and FTPS retrieval.
//!
//! `suppaftp` is a blocking client, so the whole session runs on the blocking
//! pool. FTPS is explicit (`AUTH TLS` on the control port); the data channel
//! is protected once the session is secured. Every blocking socket operation
//! carries a timeout derived from one session deadline.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rustls::{ClientConfig, RootCertStore};
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream, RustlsConnector, RustlsFtpStream};
use url::Url;

use super::ProgressReporter;
use crate::config::CONNECT_TIMEOUT;
use crate::error_handling::{FetchError, FetchErrorKind};

const DEFAULT_FTP_PORT: u16 = 21;
const ANONYMOUS_USER: &str = "anonymous";

/// Connection parameters parsed from an `ftp://` or `ftps://` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct FtpTarget {
    host: String,
    port: u16,
    user: String,
    password: String,
    remote_path: String,
    secure: bool,
}

impl FtpTarget {
    /// Parses credentials, host and remote path. Credentials are percent-decoded.
    pub(super) fn parse(url: &Url) -> Result<Self, FetchError> {
        let secure = match url.scheme() {
            "ftp" => false,
            "ftps" => true,
            other => {
                return Err(FetchError::protocol(format!(
                    "unsupported FTP scheme: {}",
                    other
                )))
            }
        };
        let host = url
            .host_str()
            .ok_or_else(|| FetchError::protocol("FTP URL has no host"))?
            .to_string();

        let remote_path = decode(url.path())?;
        if remote_path.is_empty() || remote_path.ends_with('/') {
            return Err(FetchError::protocol("FTP URL does not name a file"));
        }

        let (user, password) = if url.username().is_empty() {
            (ANONYMOUS_USER.to_string(), String::new())
        } else {
            (
                decode(url.username())?,
                decode(url.password().unwrap_or_default())?,
            )
        };

        Ok(Self {
            host,
            port: url.port().unwrap_or(DEFAULT_FTP_PORT),
            user,
            password,
            remote_path,
            secure,
        })
    }

    fn socket_addr(&self) -> Result<SocketAddr, FetchError> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| {
                FetchError::with_source(
                    FetchErrorKind::Network,
                    format!("failed to resolve FTP host {}", self.host),
                    e,
                )
            })?
            .next()
            .ok_or_else(|| FetchError::network(format!("no address for FTP host {}", self.host)))
    }
}

fn decode(raw: &str) -> Result<String, FetchError> {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .map_err(|_| FetchError::protocol("FTP URL is not valid UTF-8 after decoding"))
}

/// Retrieves the remote file into a newly created file at `dest`.
///
/// The whole session (connect, login, transfer) is bounded by `timeout`
/// through socket timeouts, so the blocking task has stopped touching `dest`
/// by the time this returns. The caller removes `dest` if this returns an
/// error.
pub(super) async fn download(
    target: FtpTarget,
    dest: &Path,
    max_bytes: u64,
    timeout: Duration,
    progress: &ProgressReporter,
) -> Result<u64, FetchError> {
    let dest: PathBuf = dest.to_path_buf();
    let progress = progress.clone();
    let deadline = Deadline::after(timeout);
    let task = tokio::task::spawn_blocking(move || {
        if target.secure {
            retrieve_secure(&target, &dest, max_bytes, &deadline, &progress)
        } else {
            retrieve_plain(&target, &dest, max_bytes, &deadline, &progress)
        }
    });

    task.await.unwrap_or_else(|join_error| {
        Err(FetchError::network(format!(
            "FTP transfer task failed: {}",
            join_error
        )))
    })
}

/// Wall-clock bound of one FTP session, applied as socket timeouts.
struct Deadline {
    at: Instant,
    timeout: Duration,
}

impl Deadline {
    fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now() + timeout,
            timeout,
        }
    }

    fn remaining(&self) -> Result<Duration, FetchError> {
        let remaining = self.at.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(self.expired());
        }
        Ok(remaining)
    }

    /// Limits blocking reads and writes on `socket` to the time left.
    fn apply(&self, socket: &TcpStream) -> Result<(), FetchError> {
        let remaining = self.remaining()?;
        socket
            .set_read_timeout(Some(remaining))
            .and_then(|_| socket.set_write_timeout(Some(remaining)))
            .map_err(|e| {
                FetchError::with_source(
                    FetchErrorKind::Network,
                    "failed to set FTP socket timeout",
                    e,
                )
            })
    }

    fn expired(&self) -> FetchError {
        FetchError::network(format!(
            "FTP transfer timed out after {}s",
            self.timeout.as_secs()
        ))
    }
}

/// Opens the control connection with timeouts in place before the greeting is read.
fn connect(target: &FtpTarget, deadline: &Deadline) -> Result<TcpStream, FetchError> {
    let addr = target.socket_addr()?;
    let socket = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT.min(deadline.remaining()?))
        .map_err(|e| {
            FetchError::with_source(
                FetchErrorKind::Network,
                format!("failed to connect to FTP server {}", addr),
                e,
            )
        })?;
    deadline.apply(&socket)?;
    Ok(socket)
}

fn clone_socket(socket: &TcpStream) -> Result<TcpStream, FetchError> {
    socket.try_clone().map_err(|e| {
        FetchError::with_source(FetchErrorKind::Network, "failed to clone FTP socket", e)
    })
}

fn retrieve_plain(
    target: &FtpTarget,
    dest: &Path,
    max_bytes: u64,
    deadline: &Deadline,
    progress: &ProgressReporter,
) -> Result<u64, FetchError> {
    let socket = connect(target, deadline)?;
    let control = clone_socket(&socket)?;
    let mut stream = FtpStream::connect_with_stream(socket).map_err(|e| ftp_error(e, deadline))?;
    deadline.apply(&control)?;
    stream
        .login(target.user.as_str(), target.password.as_str())
        .map_err(|e| ftp_error(e, deadline))?;
    deadline.apply(&control)?;
    stream
        .transfer_type(FileType::Binary)
        .map_err(|e| ftp_error(e, deadline))?;

    deadline.apply(&control)?;
    let mut data = stream
        .retr_as_stream(&target.remote_path)
        .map_err(|e| ftp_error(e, deadline))?;
    let data_socket = clone_socket(data.get_ref())?;
    let mut file = create_dest(dest)?;
    let written = copy_limited(&mut data, &data_socket, &mut file, max_bytes, deadline, progress)?;
    finish_dest(&mut file, dest)?;
    deadline.apply(&control)?;
    stream
        .finalize_retr_stream(data)
        .map_err(|e| ftp_error(e, deadline))?;

    // The file is complete; a failed QUIT is not worth failing the download for
    if let Err(e) = stream.quit() {
        log::debug!("FTP QUIT failed: {}", e);
    }
    Ok(written)
}

fn retrieve_secure(
    target: &FtpTarget,
    dest: &Path,
    max_bytes: u64,
    deadline: &Deadline,
    progress: &ProgressReporter,
) -> Result<u64, FetchError> {
    let connector = RustlsConnector::from(tls_config()?);
    let socket = connect(target, deadline)?;
    let control = clone_socket(&socket)?;
    let mut stream = RustlsFtpStream::connect_with_stream(socket)
        .map_err(|e| ftp_error(e, deadline))?
        .into_secure(connector, &target.host)
        .map_err(|e| ftp_error(e, deadline))?;
    deadline.apply(&control)?;
    stream
        .login(target.user.as_str(), target.password.as_str())
        .map_err(|e| ftp_error(e, deadline))?;
    deadline.apply(&control)?;
    stream
        .transfer_type(FileType::Binary)
        .map_err(|e| ftp_error(e, deadline))?;

    deadline.apply(&control)?;
    let mut data = stream
        .retr_as_stream(&target.remote_path)
        .map_err(|e| ftp_error(e, deadline))?;
    let data_socket = clone_socket(data.get_ref())?;
    let mut file = create_dest(dest)?;
    let written = copy_limited(&mut data, &data_socket, &mut file, max_bytes, deadline, progress)?;
    finish_dest(&mut file, dest)?;
    deadline.apply(&control)?;
    stream
        .finalize_retr_stream(data)
        .map_err(|e| ftp_error(e, deadline))?;

    if let Err(e) = stream.quit() {
        log::debug!("FTPS QUIT failed: {}", e);
    }
    Ok(written)
}

fn tls_config() -> Result<Arc<ClientConfig>, FetchError> {
    let roots = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let config = ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| FetchError::network(format!("TLS configuration failed: {}", e)))?
    .with_root_certificates(roots)
    .with_no_client_auth();
    Ok(Arc::new(config))
}

fn create_dest(dest: &Path) -> Result<File, FetchError> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dest)
        .map_err(|e| FetchError::filesystem(format!("failed to create {}", dest.display()), e))
}

fn finish_dest(file: &mut File, dest: &Path) -> Result<(), FetchError> {
    file.flush()
        .and_then(|_| file.sync_all())
        .map_err(|e| FetchError::filesystem(format!("failed to sync {}", dest.display()), e))
}

/// Copies the data channel into `file`, failing once more than `max_bytes`
/// arrive or the deadline passes.
fn copy_limited(
    reader: &mut dyn Read,
    socket: &TcpStream,
    file: &mut File,
    max_bytes: u64,
    deadline: &Deadline,
    progress: &ProgressReporter,
) -> Result<u64, FetchError> {
    progress.start(None);
    let mut limited = Read::take(reader, max_bytes + 1);
    let mut buf = vec![0u8; 64 * 1024];
    let mut written: u64 = 0;
    loop {
        deadline.apply(socket)?;
        let n = limited.read(&mut buf).map_err(|e| {
            if is_timeout(&e) {
                deadline.expired()
            } else {
                FetchError::with_source(FetchErrorKind::Network, "FTP data transfer failed", e)
            }
        })?;
        if n == 0 {
            break;
        }
        written += n as u64;
        if written > max_bytes {
            return Err(FetchError::protocol(format!(
                "database too large: more than {} bytes received",
                max_bytes
            )));
        }
        file.write_all(&buf[..n])
            .map_err(|e| FetchError::filesystem("failed to write FTP download", e))?;
        progress.advance(written);
    }
    Ok(written)
}

fn is_timeout(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

fn ftp_error(error: FtpError, deadline: &Deadline) -> FetchError {
    if let FtpError::ConnectionError(e) = &error {
        if is_timeout(e) {
            return deadline.expired();
        }
    }
    let kind = match &error {
        FtpError::ConnectionError(_) | FtpError::SecureError(_) => FetchErrorKind::Network,
        _ => FetchErrorKind::Protocol,
    };
    FetchError::with_source(kind, format!("FTP transfer failed: {}", error), error)
}
