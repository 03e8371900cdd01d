//! Storage abstraction traits
//!
//! The uploader only ever talks to these traits; production backends adapt
//! the real platform storage, test backends are in-memory fakes.

use std::path::Path;

use async_trait::async_trait;

/// Staging and transfer errors. The uploader treats every variant as
/// "retry later", never as fatal.
#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("Staging add failed: {0}")]
    AddFailed(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("List failed: {0}")]
    ListFailed(String),

    #[error("Staged item not found: {0}")]
    NotFound(String),

    #[error("Invalid staging id: {0}")]
    InvalidId(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for staging operations
pub type StagingResult<T> = Result<T, StagingError>;

/// Durable staging area for resources awaiting upload.
///
/// Once `add` returns success the item must survive process restart and keep
/// appearing in `list` until `upload` succeeds for it.
#[async_trait]
pub trait StagingQueue: Send + Sync {
    /// Stage a local resource for later upload. When `remove_original` is
    /// set, the source file is deleted after successful staging.
    async fn add(&self, id: &str, path: &Path, remove_original: bool) -> StagingResult<()>;

    /// Discard a resource without staging it (sampled-out preview frames).
    async fn delete_file(&self, path: &Path) -> StagingResult<()>;

    /// Ids of all staged items awaiting upload, in a stable order across
    /// repeated calls absent mutation.
    async fn list(&self) -> StagingResult<Vec<String>>;

    /// Perform the network transfer for a staged id. On success the id is no
    /// longer returned by `list`.
    async fn upload(&self, id: &str) -> StagingResult<()>;
}

/// Destination for staged blobs (the network transfer behind
/// [`StagingQueue::upload`]).
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put_file(&self, storage_path: &str, data: Vec<u8>) -> StagingResult<()>;
}

/// Remote keyed document collection with upsert semantics: `set` overwrites
/// any existing document under the same id, so retries are safe.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn set(
        &self,
        collection: &str,
        doc_id: &str,
        document: serde_json::Value,
    ) -> anyhow::Result<()>;
}
