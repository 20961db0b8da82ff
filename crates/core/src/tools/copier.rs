//! # Copier
//!
//! Exclusive file copy used by the batch executor. The destination is created
//! with `create_new`, so an existing file is never overwritten; whatever a
//! failed or timed-out copy left behind is removed again.

use crate::error::{RefileError, Result};
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Copy `source` to `destination`, returning the number of bytes written.
///
/// `timeout` bounds the data transfer only; `None` waits indefinitely.
pub async fn copy_exclusive(
    source: &Path,
    destination: &Path,
    timeout: Option<Duration>,
) -> Result<u64> {
    let mut reader = File::open(source)
        .await
        .map_err(|e| open_error(e, source, ErrorKind::NotFound, RefileError::SourceMissing))?;

    let meta = reader
        .metadata()
        .await
        .map_err(|e| RefileError::CopyFailed(format!("{}: {}", source.display(), e)))?;
    if !meta.is_file() {
        return Err(RefileError::SourceMissing(format!(
            "{} is not a regular file",
            source.display()
        )));
    }

    let mut writer = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(destination)
        .await
        .map_err(|e| {
            open_error(e, destination, ErrorKind::AlreadyExists, RefileError::DestinationExists)
        })?;

    // From here on the destination is ours to clean up
    let transfer = async {
        let bytes = tokio::io::copy(&mut reader, &mut writer).await?;
        writer.flush().await?;
        writer.sync_all().await?;
        Ok::<u64, std::io::Error>(bytes)
    };

    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, transfer).await {
            Ok(result) => result.map_err(|e| RefileError::CopyFailed(e.to_string())),
            Err(_) => Err(RefileError::Timeout(limit.as_secs())),
        },
        None => transfer
            .await
            .map_err(|e| RefileError::CopyFailed(e.to_string())),
    };

    if outcome.is_err() {
        drop(writer);
        if let Err(e) = fs::remove_file(destination).await {
            tracing::warn!(path = %destination.display(), "Failed to remove partial copy: {}", e);
        }
    }

    outcome
}

/// Map an open failure; `expected` selects the side-specific variant
fn open_error(
    err: std::io::Error,
    path: &Path,
    expected: ErrorKind,
    variant: fn(String) -> RefileError,
) -> RefileError {
    let shown = path.display().to_string();
    match err.kind() {
        kind if kind == expected => variant(shown),
        ErrorKind::PermissionDenied => RefileError::PermissionDenied(shown),
        _ => RefileError::CopyFailed(format!("{}: {}", shown, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_copy_creates_destination() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.txt");
        let dst = dir.path().join("b.txt");
        std::fs::write(&src, "hello").unwrap();

        let bytes = copy_exclusive(&src, &dst, None).await.unwrap();
        assert_eq!(bytes, 5);
        assert_eq!(std::fs::read_to_string(&dst).unwrap(), "hello");
        assert!(src.exists());
    }

    #[tokio::test]
    async fn test_existing_destination_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.txt");
        let dst = dir.path().join("b.txt");
        std::fs::write(&src, "new").unwrap();
        std::fs::write(&dst, "old").unwrap();

        let err = copy_exclusive(&src, &dst, Some(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, RefileError::DestinationExists(_)));
        assert_eq!(std::fs::read_to_string(&dst).unwrap(), "old");
    }

    #[tokio::test]
    async fn test_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let err = copy_exclusive(&dir.path().join("nope"), &dir.path().join("out"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RefileError::SourceMissing(_)));
        assert!(!dir.path().join("out").exists());
    }

    #[tokio::test]
    async fn test_missing_destination_directory() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.txt");
        std::fs::write(&src, "x").unwrap();

        let err = copy_exclusive(&src, &dir.path().join("gone").join("a.txt"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RefileError::CopyFailed(_)));
    }
}
