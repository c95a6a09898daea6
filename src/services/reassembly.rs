//! Rebuilds file content from committed chunks.
//!
//! Chunks are fetched one at a time in ascending `chunk_index` order,
//! regardless of the order the metadata store returns them in.

use super::{
    error::{StorageError, StorageResult},
    metadata_store::MetadataStore,
};
use crate::{
    blob::BlobStore,
    models::{chunk::FileChunk, file::File},
};
use bytes::{Bytes, BytesMut};
use futures::Stream;
use std::{pin::Pin, sync::Arc};
use tracing::debug;
use uuid::Uuid;

/// Chunk-by-chunk file content. Ends with `CorruptFile` if the total length
/// disagrees with the declared size.
pub type ChunkStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// A fully buffered file.
#[derive(Debug)]
pub struct ReassembledFile {
    pub file: File,
    pub data: Bytes,
}

impl ReassembledFile {
    /// Compare the reassembled length against the declared file size.
    pub fn verify(&self) -> StorageResult<()> {
        let actual = self.data.len() as u64;
        let expected = self.file.size as u64;
        if actual != expected {
            return Err(StorageError::CorruptFile {
                file_id: self.file.id,
                expected,
                actual,
            });
        }
        Ok(())
    }
}

pub struct ReassemblyEngine {
    metadata: MetadataStore,
    blobs: Arc<dyn BlobStore>,
}

impl ReassemblyEngine {
    pub fn new(metadata: MetadataStore, blobs: Arc<dyn BlobStore>) -> Self {
        Self { metadata, blobs }
    }

    /// Load the file row and its chunk rows, sorted by index.
    async fn load(&self, file_id: Uuid) -> StorageResult<(File, Vec<FileChunk>)> {
        let file = self
            .metadata
            .get_file(file_id)
            .await?
            .ok_or(StorageError::FileNotFound(file_id))?;
        let mut chunks = self.metadata.list_file_chunks(file_id).await?;
        if chunks.is_empty() {
            return Err(StorageError::MissingChunks { file_id });
        }
        chunks.sort_by_key(|c| c.chunk_index);
        Ok((file, chunks))
    }

    /// Download and concatenate every chunk of `file_id`.
    ///
    /// The caller checks the result with [`ReassembledFile::verify`].
    pub async fn reassemble(&self, file_id: Uuid) -> StorageResult<ReassembledFile> {
        let (file, chunks) = self.load(file_id).await?;
        let mut buffer = BytesMut::with_capacity(file.size.max(0) as usize);
        for chunk in &chunks {
            let data = self.blobs.get(&chunk.telegram_file_id).await?;
            debug!(%file_id, index = chunk.chunk_index, size = data.len(), "fetched chunk");
            buffer.extend_from_slice(&data);
        }
        Ok(ReassembledFile {
            file,
            data: buffer.freeze(),
        })
    }

    /// Like [`reassemble`](Self::reassemble) but yields each chunk as soon as
    /// it is fetched, holding at most one chunk in memory.
    ///
    /// `NotFound` and `MissingChunks` are reported before the stream starts.
    pub async fn stream(&self, file_id: Uuid) -> StorageResult<(File, ChunkStream)> {
        let (file, chunks) = self.load(file_id).await?;
        let state = StreamState {
            blobs: self.blobs.clone(),
            chunks: chunks.into_iter(),
            file_id,
            expected: file.size as u64,
            seen: 0,
        };

        let stream = futures::stream::try_unfold(state, |mut state| async move {
            match state.chunks.next() {
                Some(chunk) => {
                    let data = state.blobs.get(&chunk.telegram_file_id).await?;
                    state.seen += data.len() as u64;
                    Ok(Some((data, state)))
                }
                None if state.seen != state.expected => Err(StorageError::CorruptFile {
                    file_id: state.file_id,
                    expected: state.expected,
                    actual: state.seen,
                }),
                None => Ok(None),
            }
        });
        Ok((file, Box::pin(stream)))
    }
}

struct StreamState {
    blobs: Arc<dyn BlobStore>,
    chunks: std::vec::IntoIter<FileChunk>,
    file_id: Uuid,
    expected: u64,
    seen: u64,
}
