//! Storage backends for the upload pipeline.
//!
//! Defines the staging-queue, blob-store, and remote-store traits the
//! uploader drives, plus a durable local-filesystem staging backend and
//! in-memory backends for tests and development.

pub mod local;
pub mod memory;
pub mod traits;

pub use local::LocalStaging;
pub use memory::{MemoryBlobStore, MemoryRemoteStore, MemoryStaging};
pub use traits::{BlobStore, RemoteStore, StagingError, StagingQueue, StagingResult};
