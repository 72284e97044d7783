//! HTTP(S) streaming download.

use std::path::Path;

use reqwest::Client;
use tokio::io::AsyncWriteExt;

use super::ProgressReporter;
use crate::error_handling::FetchError;

/// Streams the body of `url` into a newly created file at `dest`.
///
/// `dest` must not exist. The caller removes it if this returns an error.
/// Returns the number of bytes written.
pub(super) async fn download(
    client: &Client,
    url: &str,
    dest: &Path,
    max_bytes: u64,
    progress: &ProgressReporter,
) -> Result<u64, FetchError> {
    let mut response = client.get(url).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::protocol(format!(
            "database download failed with HTTP {}",
            status
        )));
    }

    // Check content-length header if available
    let total = response.content_length();
    if let Some(content_length) = total {
        if content_length > max_bytes {
            return Err(FetchError::protocol(format!(
                "database too large: {} bytes (max: {} bytes)",
                content_length, max_bytes
            )));
        }
    }

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dest)
        .await
        .map_err(|e| FetchError::filesystem(format!("failed to create {}", dest.display()), e))?;

    progress.start(total);
    let mut written: u64 = 0;
    while let Some(chunk) = response.chunk().await? {
        written += chunk.len() as u64;
        // Double-check while streaming, content-length may be missing or wrong
        if written > max_bytes {
            return Err(FetchError::protocol(format!(
                "database too large: more than {} bytes received",
                max_bytes
            )));
        }
        file.write_all(&chunk)
            .await
            .map_err(|e| FetchError::filesystem(format!("failed to write {}", dest.display()), e))?;
        progress.advance(written);
    }

    file.flush()
        .await
        .map_err(|e| FetchError::filesystem(format!("failed to flush {}", dest.display()), e))?;
    file.sync_all()
        .await
        .map_err(|e| FetchError::filesystem(format!("failed to sync {}", dest.display()), e))?;

    Ok(written)
}
