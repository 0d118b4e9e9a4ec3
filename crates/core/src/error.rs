// crates/core/src/error.rs
use thiserror::Error;

/// Errors reported by a query execution engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Query rejected by engine: {0}")]
    Rejected(String),

    #[error("Query execution failed: {0}")]
    Execution(String),

    #[error("Reading query results failed: {0}")]
    Read(String),

    #[error("Engine operation cancelled")]
    Cancelled,
}

impl EngineError {
    /// True when the error only reflects the caller's cancellation token firing.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Errors reported by a blob destination or its streaming writer.
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("Invalid blob key: {0}")]
    InvalidKey(String),

    #[error("IO error writing blob {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Blob operation cancelled")]
    Cancelled,
}

impl BlobError {
    pub fn io(key: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            key: key.into(),
            source,
        }
    }

    /// True when the error only reflects cancellation of the in-flight write.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Errors raised when validating a [`crate::JobConfig`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration: {field} must be greater than 0")]
    MustBePositive { field: &'static str },
}
