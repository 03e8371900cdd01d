use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::traits::{BlobStore, StagingError, StagingQueue, StagingResult};

/// Local filesystem staging implementation.
///
/// Staged items live as files named by id under a pending directory, so the
/// pending set survives process restart. `upload` reads the staged copy,
/// transfers it through the blob store, and removes the copy on success.
pub struct LocalStaging {
    pending_dir: PathBuf,
    collection: String,
    blobs: Arc<dyn BlobStore>,
}

impl LocalStaging {
    /// Create a new LocalStaging instance rooted at `pending_dir`.
    /// `collection` prefixes the remote storage path for every upload.
    pub async fn new(
        pending_dir: impl Into<PathBuf>,
        collection: impl Into<String>,
        blobs: Arc<dyn BlobStore>,
    ) -> StagingResult<Self> {
        let pending_dir = pending_dir.into();

        fs::create_dir_all(&pending_dir).await.map_err(|e| {
            StagingError::AddFailed(format!(
                "Failed to create pending directory {}: {}",
                pending_dir.display(),
                e
            ))
        })?;

        Ok(LocalStaging {
            pending_dir,
            collection: collection.into(),
            blobs,
        })
    }

    /// Validate an id and convert it to the staged file path. Ids become file
    /// names, so separators and traversal sequences are rejected.
    fn id_to_path(&self, id: &str) -> StagingResult<PathBuf> {
        if id.is_empty() || id.contains('/') || id.contains("..") {
            return Err(StagingError::InvalidId(id.to_string()));
        }
        Ok(self.pending_dir.join(id))
    }

    fn storage_path_from_id(&self, id: &str) -> String {
        format!("{}/{}", self.collection, id)
    }
}

#[async_trait::async_trait]
impl StagingQueue for LocalStaging {
    async fn add(&self, id: &str, path: &Path, remove_original: bool) -> StagingResult<()> {
        let staged_path = self.id_to_path(id)?;

        let data = fs::read(path).await.map_err(|e| {
            StagingError::AddFailed(format!("Failed to read source {}: {}", path.display(), e))
        })?;
        let size = data.len();

        let mut file = fs::File::create(&staged_path).await.map_err(|e| {
            StagingError::AddFailed(format!(
                "Failed to create staged file {}: {}",
                staged_path.display(),
                e
            ))
        })?;
        file.write_all(&data).await.map_err(|e| {
            StagingError::AddFailed(format!(
                "Failed to write staged file {}: {}",
                staged_path.display(),
                e
            ))
        })?;
        // Durability contract: the item must survive restart once add returns.
        file.sync_all().await.map_err(|e| {
            StagingError::AddFailed(format!(
                "Failed to sync staged file {}: {}",
                staged_path.display(),
                e
            ))
        })?;

        if remove_original {
            fs::remove_file(path).await.map_err(|e| {
                StagingError::DeleteFailed(format!(
                    "Failed to remove original {}: {}",
                    path.display(),
                    e
                ))
            })?;
        }

        tracing::info!(
            id = %id,
            source = %path.display(),
            size_bytes = size,
            remove_original = remove_original,
            "Staged item for upload"
        );

        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> StagingResult<()> {
        if !fs::try_exists(path).await.unwrap_or(false) {
            return Ok(());
        }

        fs::remove_file(path).await.map_err(|e| {
            StagingError::DeleteFailed(format!("Failed to delete {}: {}", path.display(), e))
        })?;

        tracing::debug!(path = %path.display(), "Discarded unstaged file");
        Ok(())
    }

    async fn list(&self) -> StagingResult<Vec<String>> {
        let mut entries = fs::read_dir(&self.pending_dir).await.map_err(|e| {
            StagingError::ListFailed(format!(
                "Failed to read pending directory {}: {}",
                self.pending_dir.display(),
                e
            ))
        })?;

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(StagingError::Io)? {
            if let Ok(name) = entry.file_name().into_string() {
                ids.push(name);
            }
        }
        // Directory iteration order is not guaranteed; sort for a stable order.
        ids.sort();
        Ok(ids)
    }

    async fn upload(&self, id: &str) -> StagingResult<()> {
        let staged_path = self.id_to_path(id)?;

        if !fs::try_exists(&staged_path).await.unwrap_or(false) {
            return Err(StagingError::NotFound(id.to_string()));
        }

        let data = fs::read(&staged_path).await.map_err(|e| {
            StagingError::UploadFailed(format!(
                "Failed to read staged file {}: {}",
                staged_path.display(),
                e
            ))
        })?;
        let size = data.len();

        self.blobs
            .put_file(&self.storage_path_from_id(id), data)
            .await?;

        // Only drop the staged copy once the transfer has succeeded.
        fs::remove_file(&staged_path).await.map_err(|e| {
            StagingError::DeleteFailed(format!(
                "Failed to remove staged file {}: {}",
                staged_path.display(),
                e
            ))
        })?;

        tracing::info!(
            id = %id,
            size_bytes = size,
            storage_path = %self.storage_path_from_id(id),
            "Uploaded staged item"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBlobStore;
    use tempfile::tempdir;

    async fn write_source(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).await.unwrap();
        path
    }

    #[tokio::test]
    async fn add_list_upload_round_trip() {
        let pending = tempdir().unwrap();
        let sources = tempdir().unwrap();
        let blobs = Arc::new(MemoryBlobStore::new());
        let staging = LocalStaging::new(pending.path(), "photos", blobs.clone())
            .await
            .unwrap();

        let src = write_source(sources.path(), "p1.jpg", b"jpeg bytes").await;
        staging.add("p1", &src, false).await.unwrap();

        assert_eq!(staging.list().await.unwrap(), vec!["p1".to_string()]);
        // Source untouched when remove_original is false.
        assert!(fs::try_exists(&src).await.unwrap());

        staging.upload("p1").await.unwrap();
        assert!(staging.list().await.unwrap().is_empty());
        assert_eq!(
            blobs.get("photos/p1").await.unwrap(),
            b"jpeg bytes".to_vec()
        );
    }

    #[tokio::test]
    async fn add_survives_new_instance() {
        let pending = tempdir().unwrap();
        let sources = tempdir().unwrap();
        let blobs = Arc::new(MemoryBlobStore::new());

        {
            let staging = LocalStaging::new(pending.path(), "photos", blobs.clone())
                .await
                .unwrap();
            let src = write_source(sources.path(), "p1.jpg", b"bytes").await;
            staging.add("p1", &src, false).await.unwrap();
        }

        // Simulates a process restart over the same pending directory.
        let staging = LocalStaging::new(pending.path(), "photos", blobs)
            .await
            .unwrap();
        assert_eq!(staging.list().await.unwrap(), vec!["p1".to_string()]);
    }

    #[tokio::test]
    async fn add_with_remove_original_deletes_source() {
        let pending = tempdir().unwrap();
        let sources = tempdir().unwrap();
        let staging = LocalStaging::new(pending.path(), "photos", Arc::new(MemoryBlobStore::new()))
            .await
            .unwrap();

        let src = write_source(sources.path(), "frame0.jpg", b"frame").await;
        staging.add("frame0", &src, true).await.unwrap();

        assert!(!fs::try_exists(&src).await.unwrap());
        assert_eq!(staging.list().await.unwrap(), vec!["frame0".to_string()]);
    }

    #[tokio::test]
    async fn failed_upload_keeps_item_staged() {
        let pending = tempdir().unwrap();
        let sources = tempdir().unwrap();
        let blobs = Arc::new(MemoryBlobStore::new());
        blobs.fail_next_puts(1).await;
        let staging = LocalStaging::new(pending.path(), "photos", blobs.clone())
            .await
            .unwrap();

        let src = write_source(sources.path(), "p1.jpg", b"bytes").await;
        staging.add("p1", &src, false).await.unwrap();

        assert!(staging.upload("p1").await.is_err());
        // Failure must not consume the staged copy.
        assert_eq!(staging.list().await.unwrap(), vec!["p1".to_string()]);

        staging.upload("p1").await.unwrap();
        assert!(staging.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_file_is_idempotent() {
        let pending = tempdir().unwrap();
        let sources = tempdir().unwrap();
        let staging = LocalStaging::new(pending.path(), "photos", Arc::new(MemoryBlobStore::new()))
            .await
            .unwrap();

        let src = write_source(sources.path(), "frame1.jpg", b"frame").await;
        staging.delete_file(&src).await.unwrap();
        assert!(!fs::try_exists(&src).await.unwrap());
        // Deleting again is not an error.
        staging.delete_file(&src).await.unwrap();
    }

    #[tokio::test]
    async fn traversal_ids_rejected() {
        let pending = tempdir().unwrap();
        let staging = LocalStaging::new(pending.path(), "photos", Arc::new(MemoryBlobStore::new()))
            .await
            .unwrap();

        let result = staging.upload("../escape").await;
        assert!(matches!(result, Err(StagingError::InvalidId(_))));

        let result = staging.upload("a/b").await;
        assert!(matches!(result, Err(StagingError::InvalidId(_))));
    }

    #[tokio::test]
    async fn upload_unknown_id_is_not_found() {
        let pending = tempdir().unwrap();
        let staging = LocalStaging::new(pending.path(), "photos", Arc::new(MemoryBlobStore::new()))
            .await
            .unwrap();

        let result = staging.upload("missing").await;
        assert!(matches!(result, Err(StagingError::NotFound(_))));
    }

    #[tokio::test]
    async fn list_is_sorted() {
        let pending = tempdir().unwrap();
        let sources = tempdir().unwrap();
        let staging = LocalStaging::new(pending.path(), "photos", Arc::new(MemoryBlobStore::new()))
            .await
            .unwrap();

        for id in ["p2", "p0", "p1"] {
            let src = write_source(sources.path(), &format!("{id}.jpg"), b"x").await;
            staging.add(id, &src, false).await.unwrap();
        }

        assert_eq!(
            staging.list().await.unwrap(),
            vec!["p0".to_string(), "p1".to_string(), "p2".to_string()]
        );
    }
}
