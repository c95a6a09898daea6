//! Represents a folder, a hierarchical container for files.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A folder in the drive tree.
///
/// Folders reference their parent; a `None` parent means the folder hangs
/// directly off the root. Deleting a folder cascades to its subfolders and files.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Folder {
    /// Unique identifier for this folder.
    pub id: Uuid,

    /// Display name (unique naming is not enforced).
    pub name: String,

    /// Parent folder, or `None` for top-level folders.
    pub parent_id: Option<Uuid>,

    /// When this folder was created.
    pub created_at: DateTime<Utc>,
}

/// Contents of one folder level: direct child folders and files.
#[derive(Serialize, Debug)]
pub struct FolderListing {
    /// The listed folder, or `None` when listing the root.
    pub folder: Option<Folder>,
    pub folders: Vec<Folder>,
    pub files: Vec<super::file::File>,
}
