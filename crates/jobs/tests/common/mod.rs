//! Shared fixtures for job integration tests.
#![allow(dead_code)]

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use geoquery_core::{
    BlobAttributes, BlobDestination, BlobError, BlobWriter, JobConfig, JobStatus, QueryEngine,
};
use geoquery_jobs::{JobStore, StatusReceiver};
use tokio_util::sync::CancellationToken;

/// A failure a [`RecordingDestination`] writer reports instead of succeeding.
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    Io(io::ErrorKind),
    Cancelled,
}

impl Fault {
    fn error(self, key: &str) -> BlobError {
        match self {
            Fault::Io(kind) => BlobError::io(key, io::Error::new(kind, "simulated failure")),
            Fault::Cancelled => BlobError::Cancelled,
        }
    }
}

/// Blob destination that records everything done to it.
#[derive(Clone, Default)]
pub struct RecordingDestination {
    pub key: String,
    pub log: Arc<Mutex<RecordingLog>>,
    write_fault: Option<Fault>,
    close_fault: Option<Fault>,
}

#[derive(Debug, Default)]
pub struct RecordingLog {
    pub opened: bool,
    pub writes: usize,
    pub written: BytesMut,
    pub committed: Option<Bytes>,
    pub aborted: bool,
}

impl RecordingDestination {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            ..Self::default()
        }
    }

    /// Every `write` fails with `fault`.
    pub fn failing_write(mut self, fault: Fault) -> Self {
        self.write_fault = Some(fault);
        self
    }

    /// `close` fails with `fault` and commits nothing.
    pub fn failing_close(mut self, fault: Fault) -> Self {
        self.close_fault = Some(fault);
        self
    }

    pub fn committed(&self) -> Option<String> {
        let log = self.log.lock().unwrap();
        log.committed
            .as_ref()
            .map(|b| String::from_utf8(b.to_vec()).unwrap())
    }

    pub fn aborted(&self) -> bool {
        self.log.lock().unwrap().aborted
    }

    pub fn writes(&self) -> usize {
        self.log.lock().unwrap().writes
    }
}

#[async_trait]
impl BlobDestination for RecordingDestination {
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
        self.log.lock().unwrap().opened = true;
        Ok(Box::new(RecordingWriter {
            key: self.key.clone(),
            log: Arc::clone(&self.log),
            write_fault: self.write_fault,
            close_fault: self.close_fault,
        }))
    }
}

struct RecordingWriter {
    key: String,
    log: Arc<Mutex<RecordingLog>>,
    write_fault: Option<Fault>,
    close_fault: Option<Fault>,
}

#[async_trait]
impl BlobWriter for RecordingWriter {
    async fn write(&mut self, data: Bytes) -> Result<(), BlobError> {
        if let Some(fault) = self.write_fault {
            return Err(fault.error(&self.key));
        }
        let mut log = self.log.lock().unwrap();
        log.writes += 1;
        log.written.extend_from_slice(&data);
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<BlobAttributes, BlobError> {
        if let Some(fault) = self.close_fault {
            return Err(fault.error(&self.key));
        }
        let mut log = self.log.lock().unwrap();
        let body = log.written.split().freeze();
        let size = body.len() as u64;
        log.committed = Some(body);
        Ok(BlobAttributes { size: Some(size) })
    }

    async fn abort(self: Box<Self>) {
        self.log.lock().unwrap().aborted = true;
    }
}

/// Config with a one-byte write buffer so every line reaches the writer.
pub fn test_config() -> JobConfig {
    JobConfig {
        write_buffer_bytes: 1,
        status_send_timeout: Duration::from_secs(5),
        ..JobConfig::default()
    }
}

pub fn store_with(engine: impl QueryEngine, config: JobConfig) -> JobStore {
    JobStore::new(Arc::new(engine), config).unwrap()
}

/// Collect statuses until the channel closes.
pub async fn drain(mut rx: StatusReceiver) -> Vec<JobStatus> {
    tokio::time::timeout(Duration::from_secs(10), async move {
        let mut seen = Vec::new();
        while let Some(status) = rx.recv().await {
            seen.push(status);
        }
        seen
    })
    .await
    .expect("status channel should close")
}

/// Poll `cond` until it holds or fail the test after a generous timeout.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
