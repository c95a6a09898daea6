//! src/services/metadata_store.rs
//!
//! MetadataStore: relational CRUD over folders, files, file chunks, and
//! staged chunks, backed by SQLite. No transfer logic lives here; callers
//! re-read what they need on every operation.

use crate::models::{
    chunk::{FileChunk, StoredChunk, TempChunk},
    file::{File, NewFile},
    folder::Folder,
};
use chrono::{DateTime, Utc};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{str::FromStr, sync::Arc};
use uuid::Uuid;

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const FILE_COLUMNS: &str = "id, name, folder_id, size, mime_type, created_at, updated_at";
const TEMP_CHUNK_COLUMNS: &str = "id, upload_id, chunk_index, telegram_file_id, size, \
     original_file_name, original_file_size, folder_id, created_at";

#[derive(Clone, Debug)]
pub struct MetadataStore {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

/// Staged chunk fields supplied by an upload call.
#[derive(Clone, Debug)]
pub struct NewTempChunk<'a> {
    pub upload_id: &'a str,
    pub chunk_index: i64,
    pub handle: &'a str,
    pub size: i64,
    pub original_file_name: &'a str,
    pub original_file_size: i64,
    pub folder_id: Option<Uuid>,
}

impl MetadataStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Open a pool with foreign keys enforced.
    ///
    /// In-memory databases are per-connection in SQLite, so they are pinned
    /// to a single connection.
    pub async fn connect(database_url: &str, max_connections: u32) -> sqlx::Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let mut pool_options = SqlitePoolOptions::new().max_connections(max_connections);
        if database_url.contains(":memory:") {
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = pool_options.connect_with(options).await?;
        Ok(Self::new(Arc::new(pool)))
    }

    /// Apply the embedded schema. Every statement is idempotent.
    pub async fn run_migrations(&self) -> sqlx::Result<usize> {
        let statements = SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        for stmt in &statements {
            tracing::debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(statements.len())
    }

    pub async fn ping(&self) -> sqlx::Result<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await
            .map(|_| ())
    }

    // --- folders ---

    pub async fn insert_folder(&self, name: &str, parent_id: Option<Uuid>) -> sqlx::Result<Folder> {
        sqlx::query_as::<_, Folder>(
            "INSERT INTO folders (id, name, parent_id, created_at)
             VALUES (?, ?, ?, ?)
             RETURNING id, name, parent_id, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(parent_id)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await
    }

    pub async fn get_folder(&self, id: Uuid) -> sqlx::Result<Option<Folder>> {
        sqlx::query_as::<_, Folder>(
            "SELECT id, name, parent_id, created_at FROM folders WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&*self.db)
        .await
    }

    pub async fn list_child_folders(&self, parent_id: Option<Uuid>) -> sqlx::Result<Vec<Folder>> {
        sqlx::query_as::<_, Folder>(
            "SELECT id, name, parent_id, created_at FROM folders
             WHERE parent_id IS ? ORDER BY name ASC, id ASC",
        )
        .bind(parent_id)
        .fetch_all(&*self.db)
        .await
    }

    pub async fn rename_folder(&self, id: Uuid, name: &str) -> sqlx::Result<Option<Folder>> {
        sqlx::query_as::<_, Folder>(
            "UPDATE folders SET name = ? WHERE id = ?
             RETURNING id, name, parent_id, created_at",
        )
        .bind(name)
        .bind(id)
        .fetch_optional(&*self.db)
        .await
    }

    /// Remote handles of every committed chunk beneath `folder_id`.
    pub async fn subtree_chunk_handles(&self, folder_id: Uuid) -> sqlx::Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "WITH RECURSIVE subtree(id) AS (
                 SELECT id FROM folders WHERE id = ?
                 UNION ALL
                 SELECT f.id FROM folders f JOIN subtree s ON f.parent_id = s.id
             )
             SELECT c.telegram_file_id FROM file_chunks c
             JOIN files fi ON fi.id = c.file_id
             WHERE fi.folder_id IN (SELECT id FROM subtree)",
        )
        .bind(folder_id)
        .fetch_all(&*self.db)
        .await
    }

    /// Delete a folder; subfolders, files, and chunks cascade.
    pub async fn delete_folder(&self, id: Uuid) -> sqlx::Result<bool> {
        let result = sqlx::query("DELETE FROM folders WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // --- files ---

    pub async fn get_file(&self, id: Uuid) -> sqlx::Result<Option<File>> {
        sqlx::query_as::<_, File>(&format!("SELECT {FILE_COLUMNS} FROM files WHERE id = ?"))
            .bind(id)
            .fetch_optional(&*self.db)
            .await
    }

    /// Files in one folder ordered by `(name, id)`, starting after `after`.
    pub async fn list_files(
        &self,
        folder_id: Option<Uuid>,
        after: Option<(&str, Uuid)>,
        limit: i64,
    ) -> sqlx::Result<Vec<File>> {
        match after {
            Some((name, id)) => {
                sqlx::query_as::<_, File>(&format!(
                    "SELECT {FILE_COLUMNS} FROM files
                     WHERE folder_id IS ? AND (name > ? OR (name = ? AND id > ?))
                     ORDER BY name ASC, id ASC LIMIT ?"
                ))
                .bind(folder_id)
                .bind(name)
                .bind(name)
                .bind(id)
                .bind(limit)
                .fetch_all(&*self.db)
                .await
            }
            None => {
                sqlx::query_as::<_, File>(&format!(
                    "SELECT {FILE_COLUMNS} FROM files
                     WHERE folder_id IS ? ORDER BY name ASC, id ASC LIMIT ?"
                ))
                .bind(folder_id)
                .bind(limit)
                .fetch_all(&*self.db)
                .await
            }
        }
    }

    pub async fn rename_file(&self, id: Uuid, name: &str) -> sqlx::Result<Option<File>> {
        sqlx::query_as::<_, File>(&format!(
            "UPDATE files SET name = ?, updated_at = ? WHERE id = ? RETURNING {FILE_COLUMNS}"
        ))
        .bind(name)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&*self.db)
        .await
    }

    pub async fn move_file(&self, id: Uuid, folder_id: Option<Uuid>) -> sqlx::Result<Option<File>> {
        sqlx::query_as::<_, File>(&format!(
            "UPDATE files SET folder_id = ?, updated_at = ? WHERE id = ? RETURNING {FILE_COLUMNS}"
        ))
        .bind(folder_id)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&*self.db)
        .await
    }

    /// Delete a file row; its chunk rows cascade.
    pub async fn delete_file(&self, id: Uuid) -> sqlx::Result<bool> {
        let result = sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Write a file row and all of its chunk rows in one transaction.
    pub async fn insert_file_with_chunks(
        &self,
        file: &NewFile,
        chunks: &[StoredChunk],
    ) -> sqlx::Result<File> {
        let mut tx = self.db.begin().await?;
        let now = Utc::now();
        let record = sqlx::query_as::<_, File>(&format!(
            "INSERT INTO files ({FILE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING {FILE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&file.name)
        .bind(file.folder_id)
        .bind(file.size)
        .bind(&file.mime_type)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        for chunk in chunks {
            sqlx::query(
                "INSERT INTO file_chunks (id, file_id, chunk_index, telegram_file_id, size, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4())
            .bind(record.id)
            .bind(chunk.index)
            .bind(&chunk.handle)
            .bind(chunk.size)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(record)
    }

    pub async fn list_file_chunks(&self, file_id: Uuid) -> sqlx::Result<Vec<FileChunk>> {
        sqlx::query_as::<_, FileChunk>(
            "SELECT id, file_id, chunk_index, telegram_file_id, size, created_at
             FROM file_chunks WHERE file_id = ? ORDER BY chunk_index ASC",
        )
        .bind(file_id)
        .fetch_all(&*self.db)
        .await
    }

    // --- staged chunks ---

    /// Stage a chunk, replacing any row already staged for the same
    /// `(upload_id, chunk_index)`.
    ///
    /// Returns the new row and the handle of the row it replaced. The old row
    /// is claimed and replaced in one transaction, so a handle returned here
    /// was never promoted by a concurrent merge.
    pub async fn replace_temp_chunk(
        &self,
        chunk: &NewTempChunk<'_>,
    ) -> sqlx::Result<(TempChunk, Option<String>)> {
        let mut tx = self.db.begin().await?;
        let superseded = sqlx::query_scalar::<_, String>(
            "DELETE FROM temp_chunks WHERE upload_id = ? AND chunk_index = ?
             RETURNING telegram_file_id",
        )
        .bind(chunk.upload_id)
        .bind(chunk.chunk_index)
        .fetch_optional(&mut *tx)
        .await?;

        let staged = sqlx::query_as::<_, TempChunk>(&format!(
            "INSERT INTO temp_chunks ({TEMP_CHUNK_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING {TEMP_CHUNK_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(chunk.upload_id)
        .bind(chunk.chunk_index)
        .bind(chunk.handle)
        .bind(chunk.size)
        .bind(chunk.original_file_name)
        .bind(chunk.original_file_size)
        .bind(chunk.folder_id)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((staged, superseded))
    }

    pub async fn list_temp_chunks(&self, upload_id: &str) -> sqlx::Result<Vec<TempChunk>> {
        sqlx::query_as::<_, TempChunk>(&format!(
            "SELECT {TEMP_CHUNK_COLUMNS} FROM temp_chunks WHERE upload_id = ? ORDER BY chunk_index ASC"
        ))
        .bind(upload_id)
        .fetch_all(&*self.db)
        .await
    }

    pub async fn delete_temp_chunks(&self, upload_id: &str) -> sqlx::Result<u64> {
        let result = sqlx::query("DELETE FROM temp_chunks WHERE upload_id = ?")
            .bind(upload_id)
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected())
    }

    /// Upload sessions whose most recent staged chunk is older than `cutoff`.
    pub async fn stale_upload_ids(&self, cutoff: DateTime<Utc>) -> sqlx::Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT upload_id FROM temp_chunks
             GROUP BY upload_id HAVING MAX(created_at) < ?
             ORDER BY upload_id",
        )
        .bind(cutoff)
        .fetch_all(&*self.db)
        .await
    }

    /// Promote the staged chunks of `upload_id` into a new file.
    ///
    /// The staging rows are claimed first, inside the transaction, and must
    /// be exactly indices `0..total_chunks` summing to `file.size`. Otherwise
    /// the transaction rolls back and the rows stay staged. On success the
    /// file, its chunk rows and the removal of the staging rows commit
    /// together.
    pub async fn promote_temp_chunks(
        &self,
        upload_id: &str,
        total_chunks: u64,
        file: &NewFile,
    ) -> sqlx::Result<Promotion> {
        let mut tx = self.db.begin().await?;
        let mut staged = sqlx::query_as::<_, TempChunk>(&format!(
            "DELETE FROM temp_chunks WHERE upload_id = ? RETURNING {TEMP_CHUNK_COLUMNS}"
        ))
        .bind(upload_id)
        .fetch_all(&mut *tx)
        .await?;
        staged.sort_by_key(|c| c.chunk_index);

        let contiguous = staged
            .iter()
            .enumerate()
            .all(|(i, c)| c.chunk_index == i as i64);
        if staged.len() as u64 != total_chunks || !contiguous {
            tx.rollback().await?;
            return Ok(Promotion::Incomplete {
                staged_chunks: staged.len() as u64,
            });
        }
        let staged_bytes: i64 = staged.iter().map(|c| c.size).sum();
        if staged_bytes != file.size {
            tx.rollback().await?;
            return Ok(Promotion::SizeMismatch {
                staged_bytes: staged_bytes.max(0) as u64,
            });
        }

        let now = Utc::now();
        let record = sqlx::query_as::<_, File>(&format!(
            "INSERT INTO files ({FILE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING {FILE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&file.name)
        .bind(file.folder_id)
        .bind(file.size)
        .bind(&file.mime_type)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        for chunk in &staged {
            sqlx::query(
                "INSERT INTO file_chunks (id, file_id, chunk_index, telegram_file_id, size, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4())
            .bind(record.id)
            .bind(chunk.chunk_index)
            .bind(&chunk.telegram_file_id)
            .bind(chunk.size)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(Promotion::Committed(record))
    }
}

/// Outcome of [`MetadataStore::promote_temp_chunks`].
#[derive(Debug)]
pub enum Promotion {
    Committed(File),
    /// The staged indices were not exactly `0..total_chunks`.
    Incomplete { staged_chunks: u64 },
    /// The staged sizes did not add up to the file size.
    SizeMismatch { staged_bytes: u64 },
}

/// Return true if the SQLx error is a foreign key violation.
pub fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err)
            if db_err.message().to_ascii_lowercase().contains("foreign key")
    )
}
