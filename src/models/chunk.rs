//! Chunk records: committed file chunks and staged (resumable) chunks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One committed chunk of a [`File`](super::file::File).
///
/// For a given file the `chunk_index` values are exactly `0..N` and the sizes
/// sum to the file size. Chunks are immutable; they disappear only when the
/// owning file is deleted.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct FileChunk {
    pub id: Uuid,

    /// Owning file.
    pub file_id: Uuid,

    /// Position of this chunk within the file (0-based).
    pub chunk_index: i64,

    /// Opaque remote handle returned by the blob backend.
    #[serde(skip_serializing)]
    pub telegram_file_id: String,

    /// Size in bytes.
    pub size: i64,

    pub created_at: DateTime<Utc>,
}

/// A chunk uploaded as part of a resumable session but not yet merged.
///
/// Unique per `(upload_id, chunk_index)`. Rows are either promoted into
/// [`FileChunk`] rows at merge time or removed by the cleanup reconciler.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct TempChunk {
    pub id: Uuid,

    /// Caller-supplied session correlation key.
    pub upload_id: String,

    pub chunk_index: i64,

    #[serde(skip_serializing)]
    pub telegram_file_id: String,

    pub size: i64,

    /// Name of the file being uploaded, as declared by the first chunk call.
    pub original_file_name: String,

    /// Declared total size of the file being uploaded.
    pub original_file_size: i64,

    pub folder_id: Option<Uuid>,

    pub created_at: DateTime<Utc>,
}

/// Chunk metadata produced by an upload before it is attached to a file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredChunk {
    pub index: i64,
    pub handle: String,
    pub size: i64,
}

/// Staging progress for one upload session.
#[derive(Serialize, Debug)]
pub struct UploadStatus {
    pub upload_id: String,
    pub received_chunks: Vec<i64>,
    pub received_bytes: i64,
}
