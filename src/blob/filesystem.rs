//! Local-disk blob backend.
//!
//! Objects are written beneath `base_path/{shard}/{shard}/{handle}` where the
//! shards are the first two bytes of MD5(handle). Writes go to a temp file,
//! are fsynced, and are renamed into place so a crash never exposes a torn
//! object.

use super::{BlobError, BlobHandle, BlobResult, BlobStore};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const MAX_HANDLE_LEN: usize = 128;

#[derive(Clone, Debug)]
pub struct FilesystemBlobStore {
    /// Root directory for object payloads.
    base_path: PathBuf,
    max_object_size: u64,
}

impl FilesystemBlobStore {
    /// Create the backend, ensuring `base_path` exists.
    pub async fn new(base_path: impl Into<PathBuf>, max_object_size: u64) -> BlobResult<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).await?;
        Ok(Self {
            base_path,
            max_object_size,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Handles are generated by this backend; anything else is rejected
    /// before it can be turned into a path.
    fn ensure_handle_safe(handle: &str) -> BlobResult<()> {
        if handle.is_empty() || handle.len() > MAX_HANDLE_LEN {
            return Err(BlobError::NotFound);
        }
        if !handle
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-')
        {
            return Err(BlobError::NotFound);
        }
        Ok(())
    }

    fn object_shards(handle: &str) -> (String, String) {
        let digest = md5::compute(handle);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn object_path(&self, handle: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(handle);
        let mut path = self.base_path.clone();
        path.push(shard_a);
        path.push(shard_b);
        path.push(handle);
        path
    }

    async fn write_atomically(&self, file_path: &Path, data: &[u8]) -> io::Result<()> {
        let parent = file_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| io::Error::other("object path missing parent directory"))?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        let result = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(data).await?;
            file.flush().await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, file_path).await
        }
        .await;

        if result.is_err() {
            let _ = fs::remove_file(&tmp_path).await;
        }
        result
    }

    /// Remove empty shard directories up to (not including) the base path.
    async fn prune_empty_dirs(&self, start: &Path) {
        let stop = self.base_path.as_path();
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn put(&self, data: Bytes, label: &str) -> BlobResult<BlobHandle> {
        self.ensure_within_limit(data.len())?;
        let handle = Uuid::new_v4().to_string();
        let file_path = self.object_path(&handle);
        self.write_atomically(&file_path, &data).await?;
        debug!(%label, size = data.len(), "wrote object {}", file_path.display());
        Ok(handle)
    }

    async fn get(&self, handle: &str) -> BlobResult<Bytes> {
        Self::ensure_handle_safe(handle)?;
        match fs::read(self.object_path(handle)).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(BlobError::NotFound),
            Err(err) => Err(BlobError::Io(err)),
        }
    }

    async fn delete(&self, handle: &str) -> BlobResult<()> {
        Self::ensure_handle_safe(handle)?;
        let file_path = self.object_path(handle);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed object {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("object {} already missing", file_path.display());
            }
            Err(err) => return Err(BlobError::Io(err)),
        }
        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent).await;
        }
        Ok(())
    }

    /// Write, read back, and remove a probe file under the base path.
    async fn test_connection(&self) -> bool {
        let probe = self.base_path.join(format!(".probe-{}", Uuid::new_v4()));
        let ok = match fs::write(&probe, b"probe").await {
            Ok(_) => matches!(fs::read(&probe).await, Ok(bytes) if bytes == b"probe"),
            Err(err) => {
                debug!("probe write failed: {}", err);
                false
            }
        };
        let _ = fs::remove_file(&probe).await;
        ok
    }

    fn supports_delete(&self) -> bool {
        true
    }

    fn max_object_size(&self) -> u64 {
        self.max_object_size
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}
