//! In-process blob backend.
//!
//! Holds objects in a `HashMap` behind a mutex. Used for local development
//! and as the backend in tests, where `object_count` lets callers assert that
//! cleanup removed what it uploaded.

use super::{BlobError, BlobHandle, BlobResult, BlobStore};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};
use uuid::Uuid;

pub const DEFAULT_MEMORY_OBJECT_LIMIT: u64 = 20 * 1024 * 1024;

#[derive(Debug)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<BlobHandle, Bytes>>,
    max_object_size: u64,
    supports_delete: bool,
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_OBJECT_LIMIT)
    }
}

impl MemoryBlobStore {
    pub fn new(max_object_size: u64) -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            max_object_size,
            supports_delete: true,
        }
    }

    /// Behave like a backend that cannot delete objects.
    pub fn without_delete(mut self) -> Self {
        self.supports_delete = false;
        self
    }

    /// Number of objects currently stored.
    pub fn object_count(&self) -> usize {
        self.lock().len()
    }

    pub fn contains(&self, handle: &str) -> bool {
        self.lock().contains_key(handle)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<BlobHandle, Bytes>> {
        // A poisoned map is still structurally valid.
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, data: Bytes, label: &str) -> BlobResult<BlobHandle> {
        self.ensure_within_limit(data.len())?;
        let handle = format!("mem-{}", Uuid::new_v4());
        tracing::trace!(%label, size = data.len(), "storing object in memory");
        self.lock().insert(handle.clone(), data);
        Ok(handle)
    }

    async fn get(&self, handle: &str) -> BlobResult<Bytes> {
        self.lock().get(handle).cloned().ok_or(BlobError::NotFound)
    }

    async fn delete(&self, handle: &str) -> BlobResult<()> {
        if !self.supports_delete {
            return Err(BlobError::DeleteUnsupported);
        }
        self.lock().remove(handle);
        Ok(())
    }

    async fn test_connection(&self) -> bool {
        true
    }

    fn supports_delete(&self) -> bool {
        self.supports_delete
    }

    fn max_object_size(&self) -> u64 {
        self.max_object_size
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
