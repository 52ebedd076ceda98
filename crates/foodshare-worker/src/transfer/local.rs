use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

use foodshare_core::models::FileRecord;

use super::{BlobTransfer, TransferError, TransferResult};

/// Local filesystem transfer: moves `staging/<file_id>` to `storage/<user_id>/<file_id>`.
#[derive(Clone, Debug)]
pub struct LocalTransfer {
    staging_path: PathBuf,
    storage_path: PathBuf,
    base_url: String,
}

impl LocalTransfer {
    /// # Arguments
    /// * `staging_path` - Directory clients upload into, one file per file id
    /// * `storage_path` - Root directory for stored files
    /// * `base_url` - Base URL stored files are served from
    pub async fn new(
        staging_path: impl Into<PathBuf>,
        storage_path: impl Into<PathBuf>,
        base_url: String,
    ) -> TransferResult<Self> {
        let staging_path = staging_path.into();
        let storage_path = storage_path.into();

        for dir in [&staging_path, &storage_path] {
            fs::create_dir_all(dir).await.map_err(|e| {
                TransferError::Config(format!(
                    "Failed to create directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        Ok(Self {
            staging_path,
            storage_path,
            base_url,
        })
    }

    pub fn staged_path(&self, file: &FileRecord) -> PathBuf {
        self.staging_path.join(file.id.to_string())
    }

    fn storage_key(file: &FileRecord) -> String {
        format!("{}/{}", file.user_id, file.id)
    }

    /// Rejects keys that would escape the storage root.
    fn key_to_path(&self, key: &str) -> TransferResult<PathBuf> {
        if key.contains("..") || key.starts_with('/') {
            return Err(TransferError::InvalidKey(key.to_string()));
        }

        let path = self.storage_path.join(key);
        if path.strip_prefix(&self.storage_path).is_err() {
            return Err(TransferError::InvalidKey(key.to_string()));
        }
        Ok(path)
    }

    fn generate_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }

    async fn ensure_parent_dir(&self, path: &Path) -> TransferResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Rename when possible; copy and remove across filesystems.
    async fn move_file(from: &Path, to: &Path) -> TransferResult<()> {
        if fs::rename(from, to).await.is_ok() {
            return Ok(());
        }
        fs::copy(from, to).await?;
        fs::remove_file(from).await?;
        Ok(())
    }
}

#[async_trait]
impl BlobTransfer for LocalTransfer {
    async fn transfer(&self, file: &FileRecord) -> TransferResult<String> {
        let source = self.staged_path(file);
        let key = Self::storage_key(file);
        let target = self.key_to_path(&key)?;
        let start = std::time::Instant::now();

        if !fs::try_exists(&source).await.unwrap_or(false) {
            // A retried claim may find the move already done.
            if fs::try_exists(&target).await.unwrap_or(false) {
                return Ok(self.generate_url(&key));
            }
            return Err(TransferError::MissingSource(source.display().to_string()));
        }

        self.ensure_parent_dir(&target).await?;
        Self::move_file(&source, &target).await?;

        tracing::info!(
            file_id = %file.id,
            path = %target.display(),
            size_bytes = file.size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage transfer successful"
        );

        Ok(self.generate_url(&key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use foodshare_core::models::{FileStatus, FileType};
    use uuid::Uuid;

    fn record() -> FileRecord {
        FileRecord {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            file_type: FileType::Document,
            content_type: "application/pdf".to_string(),
            name: "act.pdf".to_string(),
            size: 3,
            status: FileStatus::StorageUploadInProgress,
            url: None,
            lease_token: Some(Uuid::new_v4()),
            claimed_at: Some(Utc::now()),
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    async fn transfer_in(dir: &tempfile::TempDir) -> LocalTransfer {
        LocalTransfer::new(
            dir.path().join("staging"),
            dir.path().join("storage"),
            "http://localhost:8080/files/".to_string(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn moves_staged_bytes_and_returns_url() {
        let dir = tempfile::tempdir().unwrap();
        let local = transfer_in(&dir).await;
        let file = record();
        fs::write(local.staged_path(&file), b"pdf").await.unwrap();

        let url = local.transfer(&file).await.unwrap();
        assert_eq!(
            url,
            format!("http://localhost:8080/files/{}/{}", file.user_id, file.id)
        );

        let stored = dir
            .path()
            .join("storage")
            .join(file.user_id.to_string())
            .join(file.id.to_string());
        assert_eq!(fs::read(stored).await.unwrap(), b"pdf");
        assert!(!local.staged_path(&file).exists());

        // Second run after a lost finalize finds the object already in place.
        assert_eq!(local.transfer(&file).await.unwrap(), url);
    }

    #[tokio::test]
    async fn missing_staged_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let local = transfer_in(&dir).await;

        let err = local.transfer(&record()).await.unwrap_err();
        assert!(matches!(err, TransferError::MissingSource(_)));
    }

    #[tokio::test]
    async fn traversal_keys_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let local = transfer_in(&dir).await;

        assert!(local.key_to_path("../etc/passwd").is_err());
        assert!(local.key_to_path("/etc/passwd").is_err());
        assert!(local.key_to_path("a/b").is_ok());
    }
}
