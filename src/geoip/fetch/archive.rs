//! Archive extraction utilities.
//!
//! Extracts the database file from the tar.gz archives published by MaxMind.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use tar::Archive;

use crate::config::DATABASE_FILE_SUFFIXES;
use crate::error_handling::{FetchError, FetchErrorKind};

/// Extracts the first member whose file name ends with a database suffix.
///
/// The member is written to `dest`, which must not exist. An archive without
/// such a member, or a member larger than `max_bytes`, is a format error.
/// Returns the extracted size in bytes.
pub(super) fn extract_database(
    archive_path: &Path,
    dest: &Path,
    max_bytes: u64,
) -> Result<u64, FetchError> {
    log::debug!("Extracting database from {}", archive_path.display());

    let archive_file = File::open(archive_path).map_err(|e| {
        FetchError::filesystem(format!("failed to open {}", archive_path.display()), e)
    })?;
    let mut tar_archive = Archive::new(GzDecoder::new(archive_file));

    let entries = tar_archive
        .entries()
        .map_err(|e| format_error("failed to read tar archive entries", e))?;

    for entry_result in entries {
        let mut entry = entry_result.map_err(|e| format_error("failed to read tar entry", e))?;
        let path = entry
            .path()
            .map_err(|e| format_error("failed to get entry path", e))?;

        // Only the file name is used, so `../` components cannot escape `dest`
        let matched = path
            .file_name()
            .and_then(|name| name.to_str())
            .filter(|name| DATABASE_FILE_SUFFIXES.iter().any(|s| name.ends_with(s)))
            .map(str::to_string);

        if let Some(name) = matched {
            let mut out = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(dest)
                .map_err(|e| {
                    FetchError::filesystem(format!("failed to create {}", dest.display()), e)
                })?;
            let size = io::copy(&mut (&mut entry).take(max_bytes + 1), &mut out)
                .map_err(|e| format_error(&format!("failed to read {} from archive", name), e))?;
            if size > max_bytes {
                return Err(FetchError::format(format!(
                    "{} in archive exceeds {} bytes",
                    name, max_bytes
                )));
            }
            out.flush()
                .and_then(|_| out.sync_all())
                .map_err(|e| {
                    FetchError::filesystem(format!("failed to sync {}", dest.display()), e)
                })?;
            log::info!("Extracted {} from archive ({} bytes)", name, size);
            return Ok(size);
        }
    }

    Err(FetchError::format(format!(
        "no database file ({}) found in archive",
        DATABASE_FILE_SUFFIXES.join(", ")
    )))
}

fn format_error(message: &str, source: io::Error) -> FetchError {
    FetchError::with_source(FetchErrorKind::Format, message, source)
}
