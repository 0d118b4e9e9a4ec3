// crates/core/src/blob.rs
//! Blob destination capability.

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::error::BlobError;

/// Metadata of a blob after its writer closed cleanly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlobAttributes {
    /// Final object size in bytes, if the backend reports it.
    pub size: Option<u64>,
}

/// Where a job's result is materialised.
#[async_trait]
pub trait BlobDestination: Send + Sync + 'static {
    /// Object key, for logging and snapshots.
    fn key(&self) -> &str;

    /// Open a streaming writer. Nothing becomes visible until `close` succeeds.
    async fn open_writer(&self, cancel: &CancellationToken)
        -> Result<Box<dyn BlobWriter>, BlobError>;
}

/// Streaming upload into a destination.
#[async_trait]
pub trait BlobWriter: Send {
    /// Append a chunk.
    async fn write(&mut self, data: Bytes) -> Result<(), BlobError>;

    /// Commit the object and return its attributes.
    async fn close(self: Box<Self>) -> Result<BlobAttributes, BlobError>;

    /// Discard everything written so far.
    async fn abort(self: Box<Self>);
}
