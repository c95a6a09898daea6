//! src/services/storage_service.rs
//!
//! StorageService: the drive's public operations: whole-file and resumable
//! uploads, downloads, file and folder management. Metadata lives in SQLite;
//! chunk bytes live in a [`BlobStore`]. Every call builds its collaborators
//! fresh and keeps no state between calls.

use super::{
    cleanup::{CleanupReconciler, CleanupReport, SweepReport, spawn_periodic_sweep},
    error::{StorageError, StorageResult},
    metadata_store::{MetadataStore, is_foreign_key_violation},
    reassembly::{ChunkStream, ReassembledFile, ReassemblyEngine},
    upload_coordinator::{ChunkUpload, MergeRequest, TransferLimits, UploadCoordinator},
};
use crate::{
    blob::{BlobStore, DeleteOutcome, delete_best_effort},
    models::{
        chunk::{TempChunk, UploadStatus},
        file::{File, FilePage},
        folder::{Folder, FolderListing},
    },
};
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

const MAX_NAME_LEN: usize = 255;
pub const DEFAULT_PAGE_SIZE: usize = 100;
const MAX_PAGE_SIZE: usize = 1000;

#[derive(Clone)]
pub struct StorageService {
    /// Metadata tables (folders, files, chunks, staged chunks).
    pub metadata: MetadataStore,

    /// Remote backend holding chunk bytes.
    pub blobs: Arc<dyn BlobStore>,

    pub limits: TransferLimits,
}

impl StorageService {
    pub fn new(metadata: MetadataStore, blobs: Arc<dyn BlobStore>, limits: TransferLimits) -> Self {
        Self {
            metadata,
            blobs,
            limits,
        }
    }

    fn coordinator(&self) -> UploadCoordinator {
        UploadCoordinator::new(self.metadata.clone(), self.blobs.clone(), self.limits)
    }

    fn reassembly(&self) -> ReassemblyEngine {
        ReassemblyEngine::new(self.metadata.clone(), self.blobs.clone())
    }

    fn reconciler(&self) -> CleanupReconciler {
        CleanupReconciler::new(self.metadata.clone(), self.blobs.clone())
    }

    // --- transfers ---

    pub async fn upload_whole_file(
        &self,
        data: Bytes,
        name: &str,
        mime_type: &str,
        folder_id: Option<Uuid>,
    ) -> StorageResult<File> {
        ensure_name_safe(name)?;
        self.coordinator()
            .upload_whole_file(data, name, mime_type, folder_id)
            .await
    }

    pub async fn upload_chunk(&self, chunk: ChunkUpload) -> StorageResult<TempChunk> {
        ensure_name_safe(&chunk.original_name)?;
        self.coordinator().upload_chunk(chunk).await
    }

    pub async fn upload_status(&self, upload_id: &str) -> StorageResult<UploadStatus> {
        self.coordinator().upload_status(upload_id).await
    }

    pub async fn merge_chunks(&self, request: MergeRequest) -> StorageResult<File> {
        ensure_name_safe(&request.name)?;
        self.coordinator().merge(request).await
    }

    pub async fn cleanup_upload(&self, upload_id: &str) -> StorageResult<CleanupReport> {
        self.coordinator().abort(upload_id).await
    }

    pub async fn sweep_stale_uploads(&self, max_age: Duration) -> StorageResult<SweepReport> {
        self.reconciler().sweep_older_than(max_age).await
    }

    /// Background task sweeping stale upload sessions every `interval`.
    pub fn spawn_sweeper(
        &self,
        interval: Duration,
        max_age: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        spawn_periodic_sweep(self.reconciler(), interval, max_age, cancel)
    }

    /// Reassemble a file in memory and check it against its declared size.
    pub async fn download_file(&self, file_id: Uuid) -> StorageResult<ReassembledFile> {
        let file = self.reassembly().reassemble(file_id).await?;
        file.verify()?;
        Ok(file)
    }

    /// Stream a file chunk by chunk.
    pub async fn stream_file(&self, file_id: Uuid) -> StorageResult<(File, ChunkStream)> {
        self.reassembly().stream(file_id).await
    }

    // --- files ---

    pub async fn get_file(&self, file_id: Uuid) -> StorageResult<File> {
        self.metadata
            .get_file(file_id)
            .await?
            .ok_or(StorageError::FileNotFound(file_id))
    }

    /// List files of one folder ordered by name.
    ///
    /// The continuation token is opaque to callers; it encodes the last
    /// `(id, name)` pair of the previous page.
    pub async fn list_files(
        &self,
        folder_id: Option<Uuid>,
        continuation_token: Option<&str>,
        max_keys: usize,
    ) -> StorageResult<FilePage> {
        let limit = max_keys.clamp(1, MAX_PAGE_SIZE);
        let after = continuation_token.map(decode_continuation_token).transpose()?;
        let mut files = self
            .metadata
            .list_files(
                folder_id,
                after.as_ref().map(|(id, name)| (name.as_str(), *id)),
                limit as i64 + 1,
            )
            .await?;

        let is_truncated = files.len() > limit;
        files.truncate(limit);
        let next_continuation_token = if is_truncated {
            files
                .last()
                .map(|last| encode_continuation_token(last.id, &last.name))
        } else {
            None
        };

        Ok(FilePage {
            files,
            is_truncated,
            next_continuation_token,
        })
    }

    pub async fn rename_file(&self, file_id: Uuid, name: &str) -> StorageResult<File> {
        ensure_name_safe(name)?;
        self.metadata
            .rename_file(file_id, name)
            .await?
            .ok_or(StorageError::FileNotFound(file_id))
    }

    pub async fn move_file(&self, file_id: Uuid, folder_id: Option<Uuid>) -> StorageResult<File> {
        self.metadata
            .move_file(file_id, folder_id)
            .await
            .map_err(|err| missing_folder(err, folder_id))?
            .ok_or(StorageError::FileNotFound(file_id))
    }

    /// Delete a file and its chunk rows, then remove remote chunks best-effort.
    ///
    /// Remote delete failures are logged and never surface to the caller.
    pub async fn delete_file(&self, file_id: Uuid) -> StorageResult<()> {
        let chunks = self.metadata.list_file_chunks(file_id).await?;
        if !self.metadata.delete_file(file_id).await? {
            return Err(StorageError::FileNotFound(file_id));
        }
        let handles: Vec<String> = chunks.into_iter().map(|c| c.telegram_file_id).collect();
        let deleted = self.delete_remote(&handles).await;
        info!(%file_id, chunks = handles.len(), remote_deleted = deleted, "file deleted");
        Ok(())
    }

    async fn delete_remote(&self, handles: &[String]) -> usize {
        let mut deleted = 0;
        for handle in handles {
            if delete_best_effort(self.blobs.as_ref(), handle).await == DeleteOutcome::Deleted {
                deleted += 1;
            }
        }
        deleted
    }

    // --- folders ---

    pub async fn create_folder(&self, name: &str, parent_id: Option<Uuid>) -> StorageResult<Folder> {
        ensure_name_safe(name)?;
        let folder = self
            .metadata
            .insert_folder(name, parent_id)
            .await
            .map_err(|err| missing_folder(err, parent_id))?;
        debug!(folder_id = %folder.id, "folder created");
        Ok(folder)
    }

    pub async fn get_folder(&self, folder_id: Uuid) -> StorageResult<Folder> {
        self.metadata
            .get_folder(folder_id)
            .await?
            .ok_or(StorageError::FolderNotFound(folder_id))
    }

    /// Direct children of a folder, or of the root when `folder_id` is `None`.
    pub async fn list_folder(&self, folder_id: Option<Uuid>) -> StorageResult<FolderListing> {
        let folder = match folder_id {
            Some(id) => Some(self.get_folder(id).await?),
            None => None,
        };
        let folders = self.metadata.list_child_folders(folder_id).await?;
        let files = self
            .metadata
            .list_files(folder_id, None, MAX_PAGE_SIZE as i64)
            .await?;
        Ok(FolderListing {
            folder,
            folders,
            files,
        })
    }

    pub async fn rename_folder(&self, folder_id: Uuid, name: &str) -> StorageResult<Folder> {
        ensure_name_safe(name)?;
        self.metadata
            .rename_folder(folder_id, name)
            .await?
            .ok_or(StorageError::FolderNotFound(folder_id))
    }

    /// Delete a folder subtree; remote chunks of every contained file are
    /// removed best-effort afterwards.
    pub async fn delete_folder(&self, folder_id: Uuid) -> StorageResult<()> {
        let handles = self.metadata.subtree_chunk_handles(folder_id).await?;
        if !self.metadata.delete_folder(folder_id).await? {
            return Err(StorageError::FolderNotFound(folder_id));
        }
        let deleted = self.delete_remote(&handles).await;
        info!(%folder_id, chunks = handles.len(), remote_deleted = deleted, "folder deleted");
        Ok(())
    }

    // --- health ---

    pub async fn check_metadata(&self) -> StorageResult<()> {
        self.metadata.ping().await.map_err(StorageError::from)
    }

    pub async fn check_backend(&self) -> bool {
        self.blobs.test_connection().await
    }
}

/// Reject names that cannot be displayed or downloaded sensibly.
fn ensure_name_safe(name: &str) -> StorageResult<()> {
    if name.trim().is_empty() {
        return Err(StorageError::InvalidName("name cannot be empty".into()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(StorageError::InvalidName(format!(
            "name exceeds {MAX_NAME_LEN} bytes"
        )));
    }
    if name == "." || name == ".." {
        return Err(StorageError::InvalidName(format!("`{name}` is reserved")));
    }
    if name
        .chars()
        .any(|c| c.is_control() || c == '/' || c == '\\')
    {
        return Err(StorageError::InvalidName(
            "name cannot contain slashes or control characters".into(),
        ));
    }
    Ok(())
}

/// A foreign key failure on a folder reference means the folder is gone.
fn missing_folder(err: sqlx::Error, folder_id: Option<Uuid>) -> StorageError {
    match folder_id {
        Some(id) if is_foreign_key_violation(&err) => StorageError::FolderNotFound(id),
        _ => err.into(),
    }
}

fn encode_continuation_token(id: Uuid, name: &str) -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(format!("{id}:{name}"))
}

fn decode_continuation_token(token: &str) -> StorageResult<(Uuid, String)> {
    let bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|_| StorageError::InvalidContinuationToken)?;
    let text = String::from_utf8(bytes).map_err(|_| StorageError::InvalidContinuationToken)?;
    let (id, name) = text
        .split_once(':')
        .ok_or(StorageError::InvalidContinuationToken)?;
    let id = Uuid::parse_str(id).map_err(|_| StorageError::InvalidContinuationToken)?;
    Ok((id, name.to_string()))
}
