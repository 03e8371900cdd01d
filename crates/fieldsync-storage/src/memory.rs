//! In-memory backends for tests and development.
//!
//! These fakes implement the same contracts as the production backends and
//! add inspection hooks (uploaded ids, discarded paths, stored documents)
//! plus injectable failures for exercising the retry paths.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;

use crate::traits::{BlobStore, RemoteStore, StagingError, StagingQueue, StagingResult};

enum FailureMode {
    Times(u32),
    Always,
}

#[derive(Default)]
struct StagingState {
    // Insertion order doubles as the stable list order.
    pending: Vec<String>,
    uploaded: Vec<String>,
    deleted_files: Vec<PathBuf>,
    removed_originals: Vec<PathBuf>,
    fail_uploads: HashMap<String, FailureMode>,
    fail_adds: HashMap<String, FailureMode>,
}

/// In-memory staging queue with injectable per-id upload failures.
#[derive(Default)]
pub struct MemoryStaging {
    state: Mutex<StagingState>,
}

impl MemoryStaging {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `times` uploads of `id` fail.
    pub async fn fail_upload(&self, id: &str, times: u32) {
        self.state
            .lock()
            .await
            .fail_uploads
            .insert(id.to_string(), FailureMode::Times(times));
    }

    /// Make every upload of `id` fail until cleared.
    pub async fn always_fail_upload(&self, id: &str) {
        self.state
            .lock()
            .await
            .fail_uploads
            .insert(id.to_string(), FailureMode::Always);
    }

    pub async fn clear_upload_failure(&self, id: &str) {
        self.state.lock().await.fail_uploads.remove(id);
    }

    /// Make every add of `id` fail until cleared.
    pub async fn always_fail_add(&self, id: &str) {
        self.state
            .lock()
            .await
            .fail_adds
            .insert(id.to_string(), FailureMode::Always);
    }

    pub async fn clear_add_failure(&self, id: &str) {
        self.state.lock().await.fail_adds.remove(id);
    }

    /// Ids successfully uploaded, in completion order.
    pub async fn uploaded(&self) -> Vec<String> {
        self.state.lock().await.uploaded.clone()
    }

    /// Paths discarded via `delete_file`.
    pub async fn deleted_files(&self) -> Vec<PathBuf> {
        self.state.lock().await.deleted_files.clone()
    }

    /// Source paths removed because they were staged with `remove_original`.
    pub async fn removed_originals(&self) -> Vec<PathBuf> {
        self.state.lock().await.removed_originals.clone()
    }
}

#[async_trait::async_trait]
impl StagingQueue for MemoryStaging {
    async fn add(&self, id: &str, path: &Path, remove_original: bool) -> StagingResult<()> {
        if id.is_empty() {
            return Err(StagingError::InvalidId(id.to_string()));
        }
        let mut state = self.state.lock().await;
        match state.fail_adds.get_mut(id) {
            Some(FailureMode::Always) => {
                return Err(StagingError::AddFailed(format!(
                    "injected failure for '{id}'"
                )));
            }
            Some(FailureMode::Times(remaining)) => {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(StagingError::AddFailed(format!(
                        "injected failure for '{id}'"
                    )));
                }
            }
            None => {}
        }
        if !state.pending.iter().any(|p| p == id) {
            state.pending.push(id.to_string());
        }
        if remove_original {
            state.removed_originals.push(path.to_path_buf());
        }
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> StagingResult<()> {
        self.state
            .lock()
            .await
            .deleted_files
            .push(path.to_path_buf());
        Ok(())
    }

    async fn list(&self) -> StagingResult<Vec<String>> {
        Ok(self.state.lock().await.pending.clone())
    }

    async fn upload(&self, id: &str) -> StagingResult<()> {
        let mut state = self.state.lock().await;

        match state.fail_uploads.get_mut(id) {
            Some(FailureMode::Always) => {
                return Err(StagingError::UploadFailed(format!(
                    "injected failure for '{id}'"
                )));
            }
            Some(FailureMode::Times(remaining)) => {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(StagingError::UploadFailed(format!(
                        "injected failure for '{id}'"
                    )));
                }
            }
            None => {}
        }

        let position = state
            .pending
            .iter()
            .position(|p| p == id)
            .ok_or_else(|| StagingError::NotFound(id.to_string()))?;
        let id = state.pending.remove(position);
        state.uploaded.push(id);
        Ok(())
    }
}

/// In-memory blob store keyed by storage path.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    fail_next: Mutex<u32>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` puts fail.
    pub async fn fail_next_puts(&self, count: u32) {
        *self.fail_next.lock().await = count;
    }

    pub async fn get(&self, storage_path: &str) -> Option<Vec<u8>> {
        self.blobs.lock().await.get(storage_path).cloned()
    }

    pub async fn len(&self) -> usize {
        self.blobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.lock().await.is_empty()
    }
}

#[async_trait::async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put_file(&self, storage_path: &str, data: Vec<u8>) -> StagingResult<()> {
        {
            let mut fail_next = self.fail_next.lock().await;
            if *fail_next > 0 {
                *fail_next -= 1;
                return Err(StagingError::UploadFailed(format!(
                    "injected failure for '{storage_path}'"
                )));
            }
        }
        self.blobs
            .lock()
            .await
            .insert(storage_path.to_string(), data);
        Ok(())
    }
}

/// In-memory keyed document collection with upsert semantics.
#[derive(Default)]
pub struct MemoryRemoteStore {
    documents: Mutex<HashMap<(String, String), serde_json::Value>>,
    fail_next: Mutex<u32>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` sets fail.
    pub async fn fail_next_sets(&self, count: u32) {
        *self.fail_next.lock().await = count;
    }

    pub async fn get(&self, collection: &str, doc_id: &str) -> Option<serde_json::Value> {
        self.documents
            .lock()
            .await
            .get(&(collection.to_string(), doc_id.to_string()))
            .cloned()
    }

    /// Number of documents held in `collection`.
    pub async fn collection_len(&self, collection: &str) -> usize {
        self.documents
            .lock()
            .await
            .keys()
            .filter(|(c, _)| c == collection)
            .count()
    }
}

#[async_trait::async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn set(
        &self,
        collection: &str,
        doc_id: &str,
        document: serde_json::Value,
    ) -> anyhow::Result<()> {
        {
            let mut fail_next = self.fail_next.lock().await;
            if *fail_next > 0 {
                *fail_next -= 1;
                anyhow::bail!("injected failure for '{collection}/{doc_id}'");
            }
        }
        self.documents
            .lock()
            .await
            .insert((collection.to_string(), doc_id.to_string()), document);
        Ok(())
    }
}
