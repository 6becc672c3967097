use super::traits::MediaStorage;
use super::types::MediaRef;
use crate::error::StorageError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Moves platform media files into the capture directory
#[derive(Debug, Clone, Default)]
pub struct FileMediaStorage;

impl FileMediaStorage {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaStorage for FileMediaStorage {
    async fn save(&self, media: &MediaRef, destination: &Path) -> Result<PathBuf, StorageError> {
        if fs::metadata(&media.path).await.is_err() {
            return Err(StorageError::SourceMissing {
                path: media.path.clone(),
            });
        }

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::SaveFailed {
                    path: destination.to_path_buf(),
                    details: format!("Failed to create directory: {}", e),
                })?;
        }

        // Rename fails across filesystems; fall back to copy + remove
        if let Err(e) = fs::rename(&media.path, destination).await {
            debug!("Rename failed ({}), copying {}", e, media.path.display());
            fs::copy(&media.path, destination)
                .await
                .map_err(|e| StorageError::SaveFailed {
                    path: destination.to_path_buf(),
                    details: e.to_string(),
                })?;
            remove_source(&media.path).await;
        }

        info!("Saved media to {}", destination.display());
        Ok(destination.to_path_buf())
    }
}

/// The copy already landed; a leftover source file is only worth a debug line
async fn remove_source(path: &Path) -> bool {
    match fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) => {
            debug!("Could not remove copied media {}: {}", path.display(), e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_moves_media() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("tmp_capture.jpg");
        fs::write(&source, b"jpeg").await.unwrap();

        let destination = dir.path().join("photos/2024/shot.jpg");
        let storage = FileMediaStorage::new();
        let saved = storage
            .save(&MediaRef::new(&source), &destination)
            .await
            .unwrap();

        assert_eq!(saved, destination);
        assert_eq!(fs::read(&destination).await.unwrap(), b"jpeg");
        assert!(fs::metadata(&source).await.is_err());
    }

    #[tokio::test]
    async fn test_save_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileMediaStorage::new();
        let result = storage
            .save(
                &MediaRef::new(dir.path().join("missing.mp4")),
                &dir.path().join("out.mp4"),
            )
            .await;
        assert!(matches!(result, Err(StorageError::SourceMissing { .. })));
    }

    #[tokio::test]
    async fn test_remove_source_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let leftover = dir.path().join("leftover.jpg");
        fs::write(&leftover, b"jpeg").await.unwrap();

        assert!(remove_source(&leftover).await);
        assert!(!remove_source(&leftover).await);
    }
}
