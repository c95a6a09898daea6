//! Drive fixtures: an in-memory metadata database plus a flaky blob backend.

use super::blobs::FlakyBlobStore;
use bytes::Bytes;
use chrono::{Duration, Utc};
use chunkdrive::{
    blob::MemoryBlobStore,
    models::file::File,
    services::{ChunkUpload, StorageService, TransferLimits, metadata_store::MetadataStore},
};
use std::sync::Arc;

/// Chunk size used by most tests. Small so multi-chunk files stay tiny.
#[allow(dead_code)]
pub const CHUNK: u64 = 5;

/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestDrive {
    pub service: StorageService,
    pub blobs: Arc<FlakyBlobStore>,
}

#[allow(dead_code)]
impl TestDrive {
    /// 5-byte chunks, 100-byte files, deletable backend.
    pub async fn new() -> Self {
        Self::with_limits(CHUNK, 100, MemoryBlobStore::new(CHUNK)).await
    }

    pub async fn with_limits(max_chunk_size: u64, max_file_size: u64, inner: MemoryBlobStore) -> Self {
        let metadata = MetadataStore::connect("sqlite::memory:", 1)
            .await
            .expect("Failed to open metadata database");
        metadata
            .run_migrations()
            .await
            .expect("Failed to apply schema");

        let blobs = Arc::new(FlakyBlobStore::new(inner));
        let service = StorageService::new(
            metadata,
            blobs.clone(),
            TransferLimits {
                max_chunk_size,
                max_file_size,
            },
        );
        Self { service, blobs }
    }

    pub async fn upload(&self, name: &str, data: &[u8]) -> File {
        self.service
            .upload_whole_file(Bytes::copy_from_slice(data), name, "text/plain", None)
            .await
            .expect("upload failed")
    }

    /// Stage chunk `index` of `data`, sliced at [`CHUNK`] bytes.
    pub async fn stage(&self, upload_id: &str, data: &[u8], index: u64) {
        let total = data.len().div_ceil(CHUNK as usize).max(1) as u64;
        let start = (index * CHUNK) as usize;
        let end = (start + CHUNK as usize).min(data.len());
        self.service
            .upload_chunk(ChunkUpload {
                upload_id: upload_id.to_string(),
                chunk_index: index,
                total_chunks: total,
                original_name: "staged.bin".into(),
                original_size: data.len() as u64,
                folder_id: None,
                data: Bytes::copy_from_slice(&data[start..end]),
            })
            .await
            .expect("staging failed");
    }

    pub async fn temp_chunk_count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM temp_chunks")
            .fetch_one(&*self.service.metadata.db)
            .await
            .unwrap()
    }

    pub async fn file_chunk_count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM file_chunks")
            .fetch_one(&*self.service.metadata.db)
            .await
            .unwrap()
    }

    pub async fn file_count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM files")
            .fetch_one(&*self.service.metadata.db)
            .await
            .unwrap()
    }

    /// Pretend every staged chunk of `upload_id` arrived `hours` ago.
    pub async fn age_session(&self, upload_id: &str, hours: i64) {
        sqlx::query("UPDATE temp_chunks SET created_at = ? WHERE upload_id = ?")
            .bind(Utc::now() - Duration::hours(hours))
            .bind(upload_id)
            .execute(&*self.service.metadata.db)
            .await
            .unwrap();
    }

    /// Make every insert into `file_chunks` fail from now on.
    pub async fn break_chunk_inserts(&self) {
        sqlx::query(
            "CREATE TRIGGER reject_file_chunks BEFORE INSERT ON file_chunks
             BEGIN SELECT RAISE(ABORT, 'chunk inserts disabled'); END",
        )
        .execute(&*self.service.metadata.db)
        .await
        .unwrap();
    }
}

/// Deterministic test payload of `len` bytes.
#[allow(dead_code)]
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
