//! Locally supplied database files.

use std::path::Path;

use crate::error_handling::FetchError;

/// Checks that `path` is an existing, readable regular file.
///
/// Nothing is created, so there is nothing to clean up on failure.
pub(super) async fn validate(path: &Path) -> Result<(), FetchError> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| FetchError::filesystem(format!("database file {} not found", path.display()), e))?;

    if !metadata.is_file() {
        return Err(FetchError::filesystem(
            format!("{} is not a regular file", path.display()),
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
        ));
    }

    tokio::fs::File::open(path)
        .await
        .map_err(|e| FetchError::filesystem(format!("cannot open {}", path.display()), e))?;

    Ok(())
}
