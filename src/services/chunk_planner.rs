//! Chunk boundary planning.
//!
//! Pure arithmetic: no I/O, no state. The same inputs always yield the same plan.

use serde::Serialize;

/// One planned slice of a file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ChunkDescriptor {
    /// 0-based, contiguous position.
    pub index: u64,
    /// Byte offset of the slice within the file.
    pub offset: u64,
    /// Slice length in bytes, never above the configured maximum.
    pub length: u64,
}

impl ChunkDescriptor {
    /// Byte range of this slice, for indexing into an in-memory buffer.
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset as usize..(self.offset + self.length) as usize
    }
}

/// Split `total_size` bytes into chunks of at most `max_chunk_size` bytes.
///
/// A zero-byte file still yields one zero-length chunk so that every file has
/// exactly one remote object and one chunk row at minimum.
///
/// # Panics
///
/// Panics if `max_chunk_size` is zero; configuration validation rejects that.
pub fn plan(total_size: u64, max_chunk_size: u64) -> Vec<ChunkDescriptor> {
    assert!(max_chunk_size > 0, "max_chunk_size must be positive");

    if total_size == 0 {
        return vec![ChunkDescriptor {
            index: 0,
            offset: 0,
            length: 0,
        }];
    }

    let count = chunk_count(total_size, max_chunk_size);
    (0..count)
        .map(|index| {
            let offset = index * max_chunk_size;
            ChunkDescriptor {
                index,
                offset,
                length: max_chunk_size.min(total_size - offset),
            }
        })
        .collect()
}

/// Number of chunks [`plan`] produces for `total_size`.
pub fn chunk_count(total_size: u64, max_chunk_size: u64) -> u64 {
    total_size.div_ceil(max_chunk_size).max(1)
}
