//! Represents a committed file whose bytes live in remote chunks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A committed file.
///
/// The `File` row stores metadata only. Content is split across ordered
/// [`FileChunk`](super::chunk::FileChunk) rows, each pointing at one remote object.
/// A file row is only ever written after all of its chunks are stored.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct File {
    /// Internal UUID.
    pub id: Uuid,

    /// Display name, including extension.
    pub name: String,

    /// Owning folder, or `None` for the root.
    pub folder_id: Option<Uuid>,

    /// Declared total size in bytes. Equals the sum of chunk sizes.
    pub size: i64,

    /// MIME type reported by the uploader.
    pub mime_type: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Metadata for a file that has not been written yet.
#[derive(Clone, Debug)]
pub struct NewFile {
    pub name: String,
    pub folder_id: Option<Uuid>,
    pub size: i64,
    pub mime_type: String,
}

/// A page of files returned by a paginated listing.
#[derive(Serialize, Debug)]
pub struct FilePage {
    pub files: Vec<File>,
    pub is_truncated: bool,
    pub next_continuation_token: Option<String>,
}
