//! Blob backend with switchable failures.

use async_trait::async_trait;
use bytes::Bytes;
use chunkdrive::blob::{BlobError, BlobHandle, BlobResult, BlobStore, MemoryBlobStore};
use std::{
    sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    time::Duration,
};

/// Wraps a [`MemoryBlobStore`] and fails selected calls on demand.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct FlakyBlobStore {
    pub inner: MemoryBlobStore,
    puts: AtomicUsize,
    fail_put_on: AtomicUsize,
    put_delay_ms: AtomicU64,
    fail_get: AtomicBool,
    fail_delete: AtomicBool,
    delete_calls: AtomicUsize,
}

#[allow(dead_code)]
impl FlakyBlobStore {
    pub fn new(inner: MemoryBlobStore) -> Self {
        Self {
            inner,
            puts: AtomicUsize::new(0),
            fail_put_on: AtomicUsize::new(usize::MAX),
            put_delay_ms: AtomicU64::new(0),
            fail_get: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            delete_calls: AtomicUsize::new(0),
        }
    }

    /// Fail the `n`th `put` from now on (0-based), then keep failing.
    pub fn fail_put_from(&self, n: usize) {
        let seen = self.puts.load(Ordering::SeqCst);
        self.fail_put_on.store(seen + n, Ordering::SeqCst);
    }

    pub fn heal_puts(&self) {
        self.fail_put_on.store(usize::MAX, Ordering::SeqCst);
    }

    /// Hold every `put` for `delay` before storing the object.
    pub fn delay_puts(&self, delay: Duration) {
        self.put_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn fail_gets(&self, fail: bool) {
        self.fail_get.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub fn object_count(&self) -> usize {
        self.inner.object_count()
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for FlakyBlobStore {
    async fn put(&self, data: Bytes, label: &str) -> BlobResult<BlobHandle> {
        let call = self.puts.fetch_add(1, Ordering::SeqCst);
        if call >= self.fail_put_on.load(Ordering::SeqCst) {
            return Err(BlobError::RemoteUnavailable("injected put failure".into()));
        }
        let delay = self.put_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.inner.put(data, label).await
    }

    async fn get(&self, handle: &str) -> BlobResult<Bytes> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(BlobError::RemoteUnavailable("injected get failure".into()));
        }
        self.inner.get(handle).await
    }

    async fn delete(&self, handle: &str) -> BlobResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(BlobError::RemoteRejected("injected delete failure".into()));
        }
        self.inner.delete(handle).await
    }

    async fn test_connection(&self) -> bool {
        !self.fail_get.load(Ordering::SeqCst)
    }

    fn supports_delete(&self) -> bool {
        self.inner.supports_delete()
    }

    fn max_object_size(&self) -> u64 {
        self.inner.max_object_size()
    }

    fn backend_name(&self) -> &'static str {
        "flaky"
    }
}
