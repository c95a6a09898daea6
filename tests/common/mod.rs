//! Common test utilities and fixtures.

pub mod blobs;
pub mod drive;

#[allow(unused_imports)]
pub use blobs::*;
#[allow(unused_imports)]
pub use drive::*;
