// crates/storage/src/filesystem.rs
//! Local filesystem destination.
//!
//! Writes go to a `.tmp.<uuid>` sibling of the target and are renamed into
//! place only when the writer closes cleanly, so readers never observe a
//! partially transcribed result.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use geoquery_core::{BlobAttributes, BlobDestination, BlobError, BlobWriter};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// A single object below a root directory.
#[derive(Debug, Clone)]
pub struct FsDestination {
    root: PathBuf,
    key: String,
}

impl FsDestination {
    /// Reject keys that are empty, absolute, or escape the root.
    pub fn new(root: impl Into<PathBuf>, key: impl Into<String>) -> Result<Self, BlobError> {
        let key = key.into();
        validate_key(&key)?;
        Ok(Self {
            root: root.into(),
            key,
        })
    }

    /// Final location of the object once committed.
    pub fn path(&self) -> PathBuf {
        self.root.join(&self.key)
    }
}

fn validate_key(key: &str) -> Result<(), BlobError> {
    if key.is_empty() {
        return Err(BlobError::InvalidKey("key is empty".into()));
    }
    let path = Path::new(key);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if escapes {
        return Err(BlobError::InvalidKey(format!(
            "key must be a relative path without '..': {key}"
        )));
    }
    Ok(())
}

#[async_trait]
impl BlobDestination for FsDestination {
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

        let final_path = self.path();
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| BlobError::io(&self.key, e))?;
        }

        // Unique temp name so concurrent writers to the same key never collide.
        let temp_name = format!(".tmp.{}", Uuid::new_v4());
        let temp_path = final_path.with_file_name(
            final_path
                .file_name()
                .map(|n| format!("{}{}", n.to_string_lossy(), temp_name))
                .unwrap_or_else(|| temp_name.clone()),
        );
        let file = fs::File::create(&temp_path)
            .await
            .map_err(|e| BlobError::io(&self.key, e))?;

        tracing::debug!(key = %self.key, temp = %temp_path.display(), "Opened filesystem writer");

        Ok(Box::new(FsWriter {
            key: self.key.clone(),
            file,
            temp_path,
            final_path,
            bytes_written: 0,
        }))
    }
}

struct FsWriter {
    key: String,
    file: fs::File,
    temp_path: PathBuf,
    final_path: PathBuf,
    bytes_written: u64,
}

#[async_trait]
impl BlobWriter for FsWriter {
    async fn write(&mut self, data: Bytes) -> Result<(), BlobError> {
        self.file
            .write_all(&data)
            .await
            .map_err(|e| BlobError::io(&self.key, e))?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    async fn close(mut self: Box<Self>) -> Result<BlobAttributes, BlobError> {
        let committed = async {
            self.file.flush().await?;
            self.file.sync_all().await?;
            fs::rename(&self.temp_path, &self.final_path).await
        }
        .await;

        if let Err(e) = committed {
            if let Err(cleanup) = fs::remove_file(&self.temp_path).await {
                tracing::warn!(
                    key = %self.key,
                    error = %cleanup,
                    "Failed to remove temp file after failed commit"
                );
            }
            return Err(BlobError::io(&self.key, e));
        }

        Ok(BlobAttributes {
            size: Some(self.bytes_written),
        })
    }

    async fn abort(self: Box<Self>) {
        let FsWriter {
            key,
            file,
            temp_path,
            ..
        } = *self;
        drop(file);
        if let Err(e) = fs::remove_file(&temp_path).await {
            tracing::warn!(key = %key, error = %e, "Failed to remove aborted upload");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_rejects_escaping_keys() {
        assert!(FsDestination::new("/tmp", "").is_err());
        assert!(FsDestination::new("/tmp", "../etc/passwd").is_err());
        assert!(FsDestination::new("/tmp", "/abs.csv").is_err());
        assert!(FsDestination::new("/tmp", "reports/r1/q1.csv").is_ok());
    }

    #[tokio::test]
    async fn test_close_commits_object() {
        let dir = tempfile::tempdir().unwrap();
        let dest = FsDestination::new(dir.path(), "out/result.csv").unwrap();
        let token = CancellationToken::new();

        let mut writer = dest.open_writer(&token).await.unwrap();
        writer.write(Bytes::from_static(b"f0\n")).await.unwrap();
        writer.write(Bytes::from_static(b"1\n")).await.unwrap();
        let attrs = writer.close().await.unwrap();

        assert_eq!(attrs.size, Some(5));
        assert_eq!(std::fs::read_to_string(dest.path()).unwrap(), "f0\n1\n");
        assert_eq!(entries(&dir.path().join("out")), vec!["result.csv"]);
    }

    #[tokio::test]
    async fn test_abort_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let dest = FsDestination::new(dir.path(), "result.csv").unwrap();

        let mut writer = dest.open_writer(&CancellationToken::new()).await.unwrap();
        writer.write(Bytes::from_static(b"partial")).await.unwrap();
        writer.abort().await;

        assert!(!dest.path().exists());
        assert!(entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_failed_commit_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = FsDestination::new(dir.path(), "result.csv").unwrap();
        // A directory at the target makes the final rename fail.
        std::fs::create_dir(dest.path()).unwrap();

        let mut writer = dest.open_writer(&CancellationToken::new()).await.unwrap();
        writer.write(Bytes::from_static(b"f0\n")).await.unwrap();
        let err = writer.close().await.err().unwrap();

        assert!(!err.is_cancellation());
        assert_eq!(entries(dir.path()), vec!["result.csv"]);
        assert!(dest.path().is_dir());
    }

    #[tokio::test]
    async fn test_open_after_cancel_fails() {
        let dir = tempfile::tempdir().unwrap();
        let dest = FsDestination::new(dir.path(), "result.csv").unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let err = dest.open_writer(&token).await.err().unwrap();
        assert!(err.is_cancellation());
    }
}
