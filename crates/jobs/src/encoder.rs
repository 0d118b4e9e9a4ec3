// crates/jobs/src/encoder.rs
//! Comma-separated line encoder on top of a streaming blob writer.
//!
//! Lines are buffered and handed to the writer in chunks of at least
//! `flush_threshold` bytes. Fields are quoted RFC 4180 style when they
//! contain a delimiter, quote, or line break, or start with whitespace.

use bytes::Bytes;
use geoquery_core::{BlobAttributes, BlobWriter};

use crate::error::JobError;

pub struct CsvLineWriter {
    writer: Box<dyn BlobWriter>,
    buf: Vec<u8>,
    flush_threshold: usize,
    fields_per_line: Option<usize>,
    lines: u64,
}

impl CsvLineWriter {
    pub fn new(writer: Box<dyn BlobWriter>, flush_threshold: usize) -> Self {
        Self {
            writer,
            buf: Vec::with_capacity(flush_threshold.min(64 * 1024)),
            flush_threshold,
            fields_per_line: None,
            lines: 0,
        }
    }

    /// Encode one line. Every line must have as many fields as the first.
    pub async fn write_line<I, S>(&mut self, fields: I) -> Result<(), JobError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let start = self.buf.len();
        let mut count = 0usize;
        for field in fields {
            if count > 0 {
                self.buf.push(b',');
            }
            push_field(&mut self.buf, field.as_ref());
            count += 1;
        }

        let line = self.lines + 1;
        match self.fields_per_line {
            Some(expected) if expected != count => {
                self.buf.truncate(start);
                return Err(JobError::RowShape {
                    line,
                    expected,
                    found: count,
                });
            }
            Some(_) => {}
            None => self.fields_per_line = Some(count),
        }
        self.buf.push(b'\n');
        self.lines = line;

        if self.buf.len() >= self.flush_threshold {
            self.flush().await?;
        }
        Ok(())
    }

    /// Push buffered bytes to the writer.
    pub async fn flush(&mut self) -> Result<(), JobError> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = Bytes::from(std::mem::take(&mut self.buf));
        self.writer.write(chunk).await.map_err(JobError::Write)
    }

    /// Lines encoded so far.
    pub fn lines(&self) -> u64 {
        self.lines
    }

    /// Flush and commit the underlying object.
    pub async fn close(mut self) -> Result<BlobAttributes, JobError> {
        if let Err(err) = self.flush().await {
            self.writer.abort().await;
            return Err(err);
        }
        self.writer.close().await.map_err(JobError::Write)
    }

    /// Drop buffered lines and discard the partial object.
    pub async fn abort(self) {
        self.writer.abort().await;
    }
}

fn push_field(buf: &mut Vec<u8>, field: &str) {
    let needs_quotes = field.starts_with([' ', '\t'])
        || field.contains([',', '"', '\r', '\n']);
    if !needs_quotes {
        buf.extend_from_slice(field.as_bytes());
        return;
    }
    buf.push(b'"');
    for byte in field.bytes() {
        if byte == b'"' {
            buf.push(b'"');
        }
        buf.push(byte);
    }
    buf.push(b'"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use geoquery_core::BlobError;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Sink {
        chunks: Mutex<Vec<Vec<u8>>>,
        committed: Mutex<bool>,
        aborted: Mutex<bool>,
    }

    struct SinkWriter(Arc<Sink>);

    #[async_trait]
    impl BlobWriter for SinkWriter {
        async fn write(&mut self, data: Bytes) -> Result<(), BlobError> {
            self.0.chunks.lock().unwrap().push(data.to_vec());
            Ok(())
        }

        async fn close(self: Box<Self>) -> Result<BlobAttributes, BlobError> {
            *self.0.committed.lock().unwrap() = true;
            let size = self.0.chunks.lock().unwrap().iter().map(Vec::len).sum::<usize>();
            Ok(BlobAttributes {
                size: Some(size as u64),
            })
        }

        async fn abort(self: Box<Self>) {
            *self.0.aborted.lock().unwrap() = true;
        }
    }

    fn encoder(threshold: usize) -> (CsvLineWriter, Arc<Sink>) {
        let sink = Arc::new(Sink::default());
        let writer = CsvLineWriter::new(Box::new(SinkWriter(Arc::clone(&sink))), threshold);
        (writer, sink)
    }

    fn contents(sink: &Sink) -> String {
        let bytes: Vec<u8> = sink.chunks.lock().unwrap().concat();
        String::from_utf8(bytes).unwrap()
    }

    #[tokio::test]
    async fn test_lines_and_quoting() {
        let (mut enc, sink) = encoder(1024);
        enc.write_line(["name", "note"]).await.unwrap();
        enc.write_line(["Berlin, DE", "say \"hi\""]).await.unwrap();
        enc.write_line([" padded", "multi\nline"]).await.unwrap();
        enc.write_line(["", "plain"]).await.unwrap();
        let attrs = enc.close().await.unwrap();

        assert_eq!(
            contents(&sink),
            "name,note\n\"Berlin, DE\",\"say \"\"hi\"\"\"\n\" padded\",\"multi\nline\"\n,plain\n"
        );
        assert_eq!(attrs.size, Some(contents(&sink).len() as u64));
        assert!(*sink.committed.lock().unwrap());
    }

    #[tokio::test]
    async fn test_buffers_until_threshold() {
        let (mut enc, sink) = encoder(8);
        enc.write_line(["a"]).await.unwrap();
        assert!(sink.chunks.lock().unwrap().is_empty());

        enc.write_line(["bcdefgh"]).await.unwrap();
        assert_eq!(sink.chunks.lock().unwrap().len(), 1);
        assert_eq!(enc.lines(), 2);
    }

    #[tokio::test]
    async fn test_rejects_ragged_lines() {
        let (mut enc, sink) = encoder(1024);
        enc.write_line(["a", "b"]).await.unwrap();
        let err = enc.write_line(["only-one"]).await.unwrap_err();
        assert!(matches!(
            err,
            JobError::RowShape {
                line: 2,
                expected: 2,
                found: 1
            }
        ));

        enc.abort().await;
        assert!(*sink.aborted.lock().unwrap());
        assert!(!*sink.committed.lock().unwrap());
    }
}
