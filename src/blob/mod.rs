//! Blob backends: the only place chunk bytes are durably stored.
//!
//! A [`BlobStore`] knows nothing about chunking. It stores one opaque object
//! per `put`, hands back a handle, and returns the exact bytes on `get`.

pub mod filesystem;
pub mod memory;
pub mod telegram;

use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use thiserror::Error;

pub use filesystem::FilesystemBlobStore;
pub use memory::MemoryBlobStore;
pub use telegram::{TelegramBlobStore, TelegramConfig};

/// Opaque identifier of a stored object. Meaningless outside its backend.
pub type BlobHandle = String;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("remote backend unavailable: {0}")]
    RemoteUnavailable(String),
    #[error("remote backend rejected the request: {0}")]
    RemoteRejected(String),
    #[error("object of {size} bytes exceeds the backend limit of {limit} bytes")]
    ObjectTooLarge { size: u64, limit: u64 },
    #[error("object not found")]
    NotFound,
    #[error("backend does not support deletion")]
    DeleteUnsupported,
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type BlobResult<T> = Result<T, BlobError>;

/// Contract over a remote object backend.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Store `data` as one object. `label` is advisory naming only.
    async fn put(&self, data: Bytes, label: &str) -> BlobResult<BlobHandle>;

    /// Fetch the exact bytes stored under `handle`.
    async fn get(&self, handle: &str) -> BlobResult<Bytes>;

    /// Remove the object stored under `handle`.
    ///
    /// Callers treat this as best-effort. Backends without real deletion
    /// return [`BlobError::DeleteUnsupported`].
    async fn delete(&self, handle: &str) -> BlobResult<()>;

    /// Liveness probe for startup and readiness checks.
    async fn test_connection(&self) -> bool;

    /// Whether `delete` actually removes remote objects.
    fn supports_delete(&self) -> bool;

    /// Largest object this backend accepts, in bytes.
    fn max_object_size(&self) -> u64;

    /// Short backend identifier used in logs.
    fn backend_name(&self) -> &'static str;

    /// Fail fast when `size` exceeds [`BlobStore::max_object_size`].
    fn ensure_within_limit(&self, size: usize) -> BlobResult<()> {
        let limit = self.max_object_size();
        if size as u64 > limit {
            return Err(BlobError::ObjectTooLarge {
                size: size as u64,
                limit,
            });
        }
        Ok(())
    }
}

/// Result of a best-effort remote delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The backend cannot delete; the object stays in place.
    Skipped,
    Failed(String),
}

/// Attempt a remote delete and swallow any failure.
///
/// Failures are logged and reported in the outcome, never propagated, so
/// metadata cleanup is never blocked by the backend.
pub async fn delete_best_effort(store: &dyn BlobStore, handle: &str) -> DeleteOutcome {
    if !store.supports_delete() {
        tracing::debug!(
            backend = store.backend_name(),
            "backend has no delete; leaving remote object in place"
        );
        return DeleteOutcome::Skipped;
    }
    match store.delete(handle).await {
        Ok(()) => DeleteOutcome::Deleted,
        Err(BlobError::DeleteUnsupported) => DeleteOutcome::Skipped,
        Err(err) => {
            tracing::warn!(
                backend = store.backend_name(),
                error = %err,
                "best-effort remote delete failed"
            );
            DeleteOutcome::Failed(err.to_string())
        }
    }
}
