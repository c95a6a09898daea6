//! Core data models for the chunked drive.
//!
//! These entities mirror the metadata tables: folders, files, committed
//! file chunks, and staged chunks of resumable uploads. They map to rows via
//! `sqlx::FromRow` and serialize as JSON via `serde`.

pub mod chunk;
pub mod file;
pub mod folder;
