// crates/storage/src/memory.rs
//! In-memory blob store.
//!
//! Objects only appear in the map once their writer closes, mirroring the
//! commit semantics of real object stores.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use geoquery_core::{BlobAttributes, BlobDestination, BlobError, BlobWriter};
use tokio_util::sync::CancellationToken;

type Objects = Arc<RwLock<HashMap<String, Bytes>>>;

/// Shared map of committed objects. Cloning shares the same map.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    objects: Objects,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A destination for `key` inside this store.
    pub fn destination(&self, key: impl Into<String>) -> MemoryDestination {
        MemoryDestination {
            key: key.into(),
            objects: Arc::clone(&self.objects),
        }
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        read(&self.objects).get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = read(&self.objects).keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        read(&self.objects).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn read(objects: &Objects) -> RwLockReadGuard<'_, HashMap<String, Bytes>> {
    match objects.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::error!("RwLock poisoned reading blob map");
            poisoned.into_inner()
        }
    }
}

fn write(objects: &Objects) -> RwLockWriteGuard<'_, HashMap<String, Bytes>> {
    match objects.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::error!("RwLock poisoned writing blob map");
            poisoned.into_inner()
        }
    }
}

/// One key inside a [`MemoryBlobStore`].
#[derive(Clone)]
pub struct MemoryDestination {
    key: String,
    objects: Objects,
}

#[async_trait]
impl BlobDestination for MemoryDestination {
    fn key(&self) -> &str {
        &self.key
    }

    async fn open_writer(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn BlobWriter>, BlobError> {
        if cancel.is_cancelled() {
            return Err(BlobError::Cancelled);
        }
        Ok(Box::new(MemoryWriter {
            key: self.key.clone(),
            objects: Arc::clone(&self.objects),
            buf: BytesMut::new(),
        }))
    }
}

struct MemoryWriter {
    key: String,
    objects: Objects,
    buf: BytesMut,
}

#[async_trait]
impl BlobWriter for MemoryWriter {
    async fn write(&mut self, data: Bytes) -> Result<(), BlobError> {
        self.buf.extend_from_slice(&data);
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<BlobAttributes, BlobError> {
        let MemoryWriter { key, objects, buf } = *self;
        let size = buf.len() as u64;
        write(&objects).insert(key, buf.freeze());
        Ok(BlobAttributes { size: Some(size) })
    }

    async fn abort(self: Box<Self>) {}
}
