// crates/storage/src/lib.rs
//! Blob destinations for materialised query results.
//!
//! - [`FsDestination`]: local directory, temp file renamed on commit
//! - [`MemoryBlobStore`]: in-process map, for tests and dry runs

pub mod filesystem;
pub mod memory;

pub use filesystem::FsDestination;
pub use memory::{MemoryBlobStore, MemoryDestination};
