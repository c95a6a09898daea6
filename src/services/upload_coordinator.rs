//! Upload orchestration.
//!
//! Two modes produce committed `File` + `FileChunk` rows:
//!
//! - **single-shot**: the whole file is in memory; it is planned, sliced, and
//!   uploaded chunk by chunk, then committed in one transaction.
//! - **resumable**: each call carries one pre-sliced chunk for an upload
//!   session. Chunks are staged as `TempChunk` rows and promoted by an
//!   explicit merge call.
//!
//! Chunks are uploaded strictly one at a time so peak memory stays near one
//! chunk beyond the input buffer.

use super::{
    chunk_planner,
    cleanup::CleanupReconciler,
    error::{StorageError, StorageResult},
    metadata_store::{MetadataStore, NewTempChunk, Promotion},
};
use crate::{
    blob::{BlobStore, DeleteOutcome, delete_best_effort},
    models::{
        chunk::{StoredChunk, TempChunk, UploadStatus},
        file::{File, NewFile},
    },
};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const MAX_UPLOAD_ID_LEN: usize = 128;

/// Size ceilings applied to every upload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferLimits {
    /// Largest chunk sent to the backend in one `put`.
    pub max_chunk_size: u64,
    /// Largest file accepted. Single-shot uploads buffer the whole file, so
    /// this also bounds request memory.
    pub max_file_size: u64,
}

/// One chunk of a resumable upload.
#[derive(Clone, Debug)]
pub struct ChunkUpload {
    pub upload_id: String,
    pub chunk_index: u64,
    pub total_chunks: u64,
    pub original_name: String,
    pub original_size: u64,
    pub folder_id: Option<Uuid>,
    pub data: Bytes,
}

/// Commit request for a resumable upload.
#[derive(Clone, Debug)]
pub struct MergeRequest {
    pub upload_id: String,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub folder_id: Option<Uuid>,
    /// Number of chunks the client sent; staged indices must be exactly `0..total_chunks`.
    pub total_chunks: u64,
}

pub struct UploadCoordinator {
    metadata: MetadataStore,
    blobs: Arc<dyn BlobStore>,
    limits: TransferLimits,
}

impl UploadCoordinator {
    pub fn new(metadata: MetadataStore, blobs: Arc<dyn BlobStore>, limits: TransferLimits) -> Self {
        Self {
            metadata,
            blobs,
            limits,
        }
    }

    fn ensure_file_size(&self, size: u64) -> StorageResult<()> {
        if size > self.limits.max_file_size {
            return Err(StorageError::SizeLimitExceeded {
                size,
                limit: self.limits.max_file_size,
            });
        }
        Ok(())
    }

    async fn ensure_folder_exists(&self, folder_id: Option<Uuid>) -> StorageResult<()> {
        if let Some(id) = folder_id {
            if self.metadata.get_folder(id).await?.is_none() {
                return Err(StorageError::FolderNotFound(id));
            }
        }
        Ok(())
    }

    /// Best-effort removal of objects uploaded by an attempt that is being abandoned.
    async fn discard(&self, chunks: &[StoredChunk]) {
        for chunk in chunks {
            if let DeleteOutcome::Failed(reason) =
                delete_best_effort(self.blobs.as_ref(), &chunk.handle).await
            {
                warn!(index = chunk.index, %reason, "orphaned remote chunk left behind");
            }
        }
    }

    /// Upload a whole file held in memory and commit it.
    ///
    /// On any failure no metadata is written and already uploaded chunks are
    /// deleted best-effort.
    pub async fn upload_whole_file(
        &self,
        data: Bytes,
        name: &str,
        mime_type: &str,
        folder_id: Option<Uuid>,
    ) -> StorageResult<File> {
        let total_size = data.len() as u64;
        self.ensure_file_size(total_size)?;
        self.ensure_folder_exists(folder_id).await?;

        let plan = chunk_planner::plan(total_size, self.limits.max_chunk_size);
        let mut stored = Vec::with_capacity(plan.len());
        for descriptor in &plan {
            let slice = data.slice(descriptor.range());
            let label = format!("{}.part{}", name, descriptor.index);
            match self.blobs.put(slice, &label).await {
                Ok(handle) => {
                    debug!(
                        index = descriptor.index,
                        length = descriptor.length,
                        "uploaded chunk"
                    );
                    stored.push(StoredChunk {
                        index: descriptor.index as i64,
                        handle,
                        size: descriptor.length as i64,
                    });
                }
                Err(source) => {
                    self.discard(&stored).await;
                    return Err(StorageError::ChunkUploadFailed {
                        index: descriptor.index,
                        source,
                    });
                }
            }
        }

        let new_file = NewFile {
            name: name.to_string(),
            folder_id,
            size: total_size as i64,
            mime_type: mime_type.to_string(),
        };
        match self.metadata.insert_file_with_chunks(&new_file, &stored).await {
            Ok(file) => {
                info!(file_id = %file.id, size = total_size, chunks = stored.len(), "file committed");
                Ok(file)
            }
            Err(err) => {
                self.discard(&stored).await;
                Err(err.into())
            }
        }
    }

    fn validate_chunk(&self, chunk: &ChunkUpload) -> StorageResult<()> {
        ensure_upload_id_safe(&chunk.upload_id)?;
        if chunk.total_chunks == 0 {
            return Err(StorageError::InvalidChunk(
                "total chunk count must be positive".into(),
            ));
        }
        if chunk.chunk_index >= chunk.total_chunks {
            return Err(StorageError::InvalidChunk(format!(
                "chunk index {} is outside 0..{}",
                chunk.chunk_index, chunk.total_chunks
            )));
        }
        if chunk.data.len() as u64 > self.limits.max_chunk_size {
            return Err(StorageError::InvalidChunk(format!(
                "chunk {} is {} bytes, above the {} byte chunk limit",
                chunk.chunk_index,
                chunk.data.len(),
                self.limits.max_chunk_size
            )));
        }
        if chunk.data.len() as u64 > chunk.original_size {
            return Err(StorageError::InvalidChunk(format!(
                "chunk {} is larger than the declared file size",
                chunk.chunk_index
            )));
        }
        self.ensure_file_size(chunk.original_size)
    }

    /// Upload one chunk of a resumable session and stage it.
    ///
    /// Re-sending an index replaces the staged row; the superseded remote
    /// object is deleted best-effort. A retry that lands after its session
    /// was merged stages a fresh row for the sweeper and leaves the
    /// committed chunk alone.
    pub async fn upload_chunk(&self, chunk: ChunkUpload) -> StorageResult<TempChunk> {
        self.validate_chunk(&chunk)?;
        self.ensure_folder_exists(chunk.folder_id).await?;

        let index = chunk.chunk_index as i64;
        let size = chunk.data.len() as i64;
        let label = format!("{}.part{}", chunk.original_name, chunk.chunk_index);
        let handle = self
            .blobs
            .put(chunk.data, &label)
            .await
            .map_err(|source| StorageError::ChunkUploadFailed {
                index: chunk.chunk_index,
                source,
            })?;

        let replaced = self
            .metadata
            .replace_temp_chunk(&NewTempChunk {
                upload_id: &chunk.upload_id,
                chunk_index: index,
                handle: &handle,
                size,
                original_file_name: &chunk.original_name,
                original_file_size: chunk.original_size as i64,
                folder_id: chunk.folder_id,
            })
            .await;
        let (staged, superseded) = match replaced {
            Ok(replaced) => replaced,
            Err(err) => {
                let _ = delete_best_effort(self.blobs.as_ref(), &handle).await;
                return Err(err.into());
            }
        };

        if let Some(previous) = superseded.filter(|h| *h != staged.telegram_file_id) {
            debug!(upload_id = %chunk.upload_id, index, "replaced staged chunk");
            let _ = delete_best_effort(self.blobs.as_ref(), &previous).await;
        }

        debug!(
            upload_id = %chunk.upload_id,
            index,
            total = chunk.total_chunks,
            size,
            "chunk staged"
        );
        Ok(staged)
    }

    /// Which chunks of a session are staged so far.
    pub async fn upload_status(&self, upload_id: &str) -> StorageResult<UploadStatus> {
        ensure_upload_id_safe(upload_id)?;
        let staged = self.metadata.list_temp_chunks(upload_id).await?;
        Ok(UploadStatus {
            upload_id: upload_id.to_string(),
            received_bytes: staged.iter().map(|c| c.size).sum(),
            received_chunks: staged.iter().map(|c| c.chunk_index).collect(),
        })
    }

    /// Promote every staged chunk of a session into a committed file.
    ///
    /// Validation failures leave the staged rows in place so the caller can
    /// upload missing chunks and merge again. Completeness is checked again
    /// inside the promotion transaction, so a concurrent merge or chunk retry
    /// cannot commit a partial file. A database failure while promoting
    /// discards the whole session.
    pub async fn merge(&self, request: MergeRequest) -> StorageResult<File> {
        let upload_id = request.upload_id.clone();
        let wrap = |source: StorageError| StorageError::MergeFailed {
            upload_id: upload_id.clone(),
            source: Box::new(source),
        };

        self.validate_merge(&request).await.map_err(&wrap)?;

        let new_file = NewFile {
            name: request.name.clone(),
            folder_id: request.folder_id,
            size: request.size as i64,
            mime_type: request.mime_type.clone(),
        };
        let promotion = self
            .metadata
            .promote_temp_chunks(&request.upload_id, request.total_chunks, &new_file)
            .await;
        match promotion {
            Ok(Promotion::Committed(file)) => {
                info!(
                    upload_id = %request.upload_id,
                    file_id = %file.id,
                    size = request.size,
                    chunks = request.total_chunks,
                    "upload merged"
                );
                Ok(file)
            }
            Ok(Promotion::Incomplete { staged_chunks }) => {
                Err(wrap(StorageError::IncompleteUpload {
                    upload_id: request.upload_id.clone(),
                    expected: request.total_chunks,
                    actual: staged_chunks,
                }))
            }
            Ok(Promotion::SizeMismatch { staged_bytes }) => {
                Err(wrap(StorageError::SizeMismatch {
                    upload_id: request.upload_id.clone(),
                    declared: request.size,
                    staged: staged_bytes,
                }))
            }
            Err(err) => {
                warn!(upload_id = %request.upload_id, error = %err, "promotion failed; discarding session");
                let reconciler = CleanupReconciler::new(self.metadata.clone(), self.blobs.clone());
                if let Err(cleanup_err) = reconciler.reconcile(&request.upload_id).await {
                    warn!(upload_id = %request.upload_id, error = %cleanup_err, "cleanup after failed merge also failed");
                }
                Err(wrap(err.into()))
            }
        }
    }

    async fn validate_merge(&self, request: &MergeRequest) -> StorageResult<()> {
        ensure_upload_id_safe(&request.upload_id)?;
        self.ensure_file_size(request.size)?;
        self.ensure_folder_exists(request.folder_id).await?;

        let staged = self.metadata.list_temp_chunks(&request.upload_id).await?;
        let contiguous = staged
            .iter()
            .all(|c| c.chunk_index >= 0 && (c.chunk_index as u64) < request.total_chunks);
        if request.total_chunks == 0 || staged.len() as u64 != request.total_chunks || !contiguous
        {
            return Err(StorageError::IncompleteUpload {
                upload_id: request.upload_id.clone(),
                expected: request.total_chunks,
                actual: staged.len() as u64,
            });
        }

        let staged_bytes: i64 = staged.iter().map(|c| c.size).sum();
        if staged_bytes as u64 != request.size {
            return Err(StorageError::SizeMismatch {
                upload_id: request.upload_id.clone(),
                declared: request.size,
                staged: staged_bytes as u64,
            });
        }
        Ok(())
    }

    /// Abandon a session without creating a file.
    pub async fn abort(&self, upload_id: &str) -> StorageResult<super::cleanup::CleanupReport> {
        ensure_upload_id_safe(upload_id)?;
        CleanupReconciler::new(self.metadata.clone(), self.blobs.clone())
            .reconcile(upload_id)
            .await
    }
}

/// Upload ids are opaque, but are kept short and printable.
pub fn ensure_upload_id_safe(upload_id: &str) -> StorageResult<()> {
    if upload_id.is_empty() || upload_id.len() > MAX_UPLOAD_ID_LEN {
        return Err(StorageError::InvalidChunk(
            "upload id must be 1 to 128 characters".into(),
        ));
    }
    if !upload_id
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
    {
        return Err(StorageError::InvalidChunk(
            "upload id may only contain letters, digits, '-', '_' and '.'".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_ids_are_restricted() {
        assert!(ensure_upload_id_safe("9b2c-01_a.b").is_ok());
        assert!(ensure_upload_id_safe("").is_err());
        assert!(ensure_upload_id_safe("has space").is_err());
        assert!(ensure_upload_id_safe(&"x".repeat(129)).is_err());
    }
}
