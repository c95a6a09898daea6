//! Error taxonomy for transfer and drive operations.

use crate::blob::BlobError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("file of {size} bytes exceeds the limit of {limit} bytes")]
    SizeLimitExceeded { size: u64, limit: u64 },

    #[error("upload of chunk {index} failed: {source}")]
    ChunkUploadFailed {
        index: u64,
        #[source]
        source: BlobError,
    },

    #[error("upload `{upload_id}` is incomplete: expected {expected} chunks, found {actual}")]
    IncompleteUpload {
        upload_id: String,
        expected: u64,
        actual: u64,
    },

    #[error("upload `{upload_id}` declares {declared} bytes but {staged} bytes are staged")]
    SizeMismatch {
        upload_id: String,
        declared: u64,
        staged: u64,
    },

    #[error("invalid chunk: {0}")]
    InvalidChunk(String),

    #[error("merge of upload `{upload_id}` failed: {source}")]
    MergeFailed {
        upload_id: String,
        #[source]
        source: Box<StorageError>,
    },

    #[error("file `{0}` not found")]
    FileNotFound(Uuid),

    #[error("folder `{0}` not found")]
    FolderNotFound(Uuid),

    #[error("file `{file_id}` has no chunks")]
    MissingChunks { file_id: Uuid },

    #[error("file `{file_id}` is corrupt: expected {expected} bytes, reassembled {actual}")]
    CorruptFile {
        file_id: Uuid,
        expected: u64,
        actual: u64,
    },

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("invalid continuation token")]
    InvalidContinuationToken,

    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl StorageError {
    /// The innermost error, looking through `MergeFailed` wrappers.
    pub fn root(&self) -> &StorageError {
        match self {
            StorageError::MergeFailed { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
