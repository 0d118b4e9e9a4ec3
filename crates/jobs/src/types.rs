// crates/jobs/src/types.rs
//! Types for the query job system.

use serde::Serialize;
use tokio::sync::mpsc;

use geoquery_core::JobStatus;

/// Unique identifier for a job.
pub type JobId = uuid::Uuid;

/// Receiving end of a job's status channel. Exactly one consumer per job.
pub type StatusReceiver = mpsc::Receiver<JobStatus>;

/// Where a job is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPhase {
    #[default]
    Pending = 0,
    Running = 1,
    Succeeded = 2,
    Failed = 3,
    Cancelled = 4,
}

impl JobPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

/// Point-in-time copy of a job, safe to serialize to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub report_id: String,
    pub query_id: String,
    pub phase: JobPhase,
    pub error: Option<String>,
    pub total_rows: u64,
    pub processed_bytes: u64,
    pub result_size: u64,
    pub result_id: Option<String>,
    pub query_handle: Option<String>,
    pub destination: Option<String>,
    pub created_at: String,
    pub timestamp: String,
}
