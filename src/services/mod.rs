//! Chunked transfer core and the drive operations built on it.

pub mod chunk_planner;
pub mod cleanup;
pub mod error;
pub mod metadata_store;
pub mod reassembly;
pub mod storage_service;
pub mod upload_coordinator;

pub use error::{StorageError, StorageResult};
pub use storage_service::StorageService;
pub use upload_coordinator::{ChunkUpload, MergeRequest, TransferLimits};
