// crates/jobs/src/error.rs
use geoquery_core::{BlobError, EngineError};
use thiserror::Error;

/// Errors surfaced by job execution and the job store.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Query submission failed: {0}")]
    Submit(#[source] EngineError),

    #[error("{0}")]
    Execution(#[source] EngineError),

    #[error("Result stream failed: {0}")]
    Read(#[source] EngineError),

    #[error("Writing query results failed: {0}")]
    Write(#[source] BlobError),

    #[error("Result line {line} has {found} fields, expected {expected}")]
    RowShape {
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("Engine contract violated: {0}")]
    EngineContract(String),

    #[error("Job already started")]
    AlreadyStarted,

    #[error("Job cancelled")]
    Cancelled,

    #[error("Admission limit of {limit} concurrent jobs reached")]
    AtCapacity { limit: usize },
}

impl JobError {
    /// True for errors that are only a symptom of the job's token firing.
    pub fn is_cancellation(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Submit(e) | Self::Execution(e) | Self::Read(e) => e.is_cancellation(),
            Self::Write(e) => e.is_cancellation(),
            Self::RowShape { .. }
            | Self::EngineContract(_)
            | Self::AlreadyStarted
            | Self::AtCapacity { .. } => false,
        }
    }
}
