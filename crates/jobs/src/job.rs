// crates/jobs/src/job.rs
//! A single remote query execution.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use geoquery_core::{BlobAttributes, BlobDestination, JobConfig, JobStatus, QueryEngine};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::error::JobError;
use super::state::JobState;
use super::status::StatusEmitter;
use super::types::{JobId, JobPhase, JobSnapshot, StatusReceiver};
use super::worker;

/// One query execution, from submission to a committed result.
///
/// Created by [`crate::JobStore::create`]. The caller takes the status
/// receiver, drains it for the job's whole life, and calls [`Job::run`] once.
pub struct Job {
    id: JobId,
    report_id: String,
    query_id: String,
    created_at: DateTime<Utc>,
    deadline: Instant,
    token: CancellationToken,
    engine: Arc<dyn QueryEngine>,
    config: JobConfig,
    state: JobState,
    emitter: StatusEmitter,
    receiver: Mutex<Option<StatusReceiver>>,
    started: AtomicBool,
}

impl Job {
    pub(crate) fn new(
        report_id: String,
        query_id: String,
        engine: Arc<dyn QueryEngine>,
        config: JobConfig,
    ) -> Self {
        let id = JobId::new_v4();
        let (emitter, receiver) =
            StatusEmitter::channel(id, config.status_buffer, config.status_send_timeout);
        Self {
            id,
            report_id,
            query_id,
            created_at: Utc::now(),
            deadline: Instant::now() + config.query_timeout,
            token: CancellationToken::new(),
            engine,
            config,
            state: JobState::new(),
            emitter,
            receiver: Mutex::new(Some(receiver)),
            started: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn report_id(&self) -> &str {
        &self.report_id
    }

    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Absolute deadline after which the job cancels itself.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// The job's lifecycle token. Cancelled exactly when the job is over.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_finished(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn config(&self) -> &JobConfig {
        &self.config
    }

    pub(crate) fn state(&self) -> &JobState {
        &self.state
    }

    /// Hand out the status receiver. Only the first call gets it.
    pub fn take_status_receiver(&self) -> Option<StatusReceiver> {
        match self.receiver.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => {
                tracing::error!(job_id = %self.id, "Mutex poisoned taking status receiver");
                poisoned.into_inner().take()
            }
        }
    }

    /// Submit `query_text` and start streaming its result into `destination`.
    ///
    /// Returns once the engine accepted the query and the worker is spawned.
    /// A rejected submission ends the job without emitting any status. A job
    /// runs at most once; later calls fail with [`JobError::AlreadyStarted`].
    pub async fn run(
        self: &Arc<Self>,
        query_text: &str,
        destination: Arc<dyn BlobDestination>,
    ) -> Result<(), JobError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(JobError::AlreadyStarted);
        }
        if self.token.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let submitted = tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(JobError::Cancelled),
            result = self.engine.submit(query_text) => result.map_err(JobError::Submit),
        };
        let handle = match submitted {
            Ok(handle) => handle,
            Err(err) => {
                tracing::warn!(
                    job_id = %self.id,
                    query_id = %self.query_id,
                    engine = self.engine.name(),
                    error = %err,
                    "Query submission failed"
                );
                self.emitter.close().await;
                self.state.cancel();
                self.token.cancel();
                return Err(err);
            }
        };

        if !self.state.start(handle.id(), destination.key()) {
            // Cancelled while the submission was in flight.
            tracing::debug!(
                job_id = %self.id,
                query_handle = handle.id(),
                "Job ended during submission; not starting worker"
            );
            self.emitter.close().await;
            self.token.cancel();
            return Err(JobError::Cancelled);
        }
        tracing::info!(
            job_id = %self.id,
            query_id = %self.query_id,
            report_id = %self.report_id,
            query_handle = handle.id(),
            destination = destination.key(),
            "Query submitted"
        );
        self.emitter.emit(JobStatus::Running).await;

        tokio::spawn(worker::run(Arc::clone(self), handle, destination));
        Ok(())
    }

    /// Emit a non-terminal progress status.
    pub(crate) async fn progress(&self, status: JobStatus) {
        self.emitter.emit(status).await;
    }

    /// Terminal success: expose the result, emit `DONE`, end the job.
    pub(crate) async fn succeed(&self, attrs: BlobAttributes) {
        if self.state.succeed(self.id.to_string(), attrs.size) {
            tracing::info!(
                job_id = %self.id,
                query_id = %self.query_id,
                result_size = ?attrs.size,
                "Query result written"
            );
            self.emitter.emit(JobStatus::Done).await;
        }
        self.token.cancel();
    }

    /// Terminal failure: record the error, emit the sentinel, end the job.
    pub(crate) async fn fail(&self, err: JobError) {
        if self.state.fail(err.to_string()) {
            tracing::error!(
                job_id = %self.id,
                query_id = %self.query_id,
                error = %err,
                "Job failed"
            );
            self.emitter.emit(JobStatus::Unspecified).await;
        }
        self.token.cancel();
    }

    /// Cancel the job. Returns false if it had already finished.
    pub async fn cancel(&self) -> bool {
        let won = self.state.cancel();
        if won {
            tracing::info!(job_id = %self.id, query_id = %self.query_id, "Canceling job");
            self.emitter.emit(JobStatus::Unspecified).await;
        }
        self.token.cancel();
        won
    }

    /// Called once the token ended for any reason; a job that never reached a
    /// terminal phase (deadline, external token cancel) is closed out here.
    pub(crate) async fn settle(&self) {
        if self.state.cancel() {
            tracing::info!(job_id = %self.id, query_id = %self.query_id, "Job ended without result");
            self.emitter.emit(JobStatus::Unspecified).await;
        }
    }

    pub fn phase(&self) -> JobPhase {
        self.state.phase()
    }

    /// Recorded error message, `None` while no error occurred.
    pub fn err(&self) -> Option<String> {
        self.state.err()
    }

    /// Result identifier; `None` until the result is durably written.
    pub fn result_id(&self) -> Option<String> {
        self.state.result_id()
    }

    pub fn result_size(&self) -> u64 {
        self.state.result_size()
    }

    pub fn total_rows(&self) -> u64 {
        self.state.total_rows()
    }

    pub fn processed_bytes(&self) -> u64 {
        self.state.processed_bytes()
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let view = self.state.view();
        JobSnapshot {
            job_id: self.id,
            report_id: self.report_id.clone(),
            query_id: self.query_id.clone(),
            phase: view.phase,
            error: view.err,
            total_rows: view.total_rows,
            processed_bytes: view.processed_bytes,
            result_size: view.result_size,
            result_id: view.result_id,
            query_handle: view.query_handle,
            destination: view.destination,
            created_at: self.created_at.to_rfc3339(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("report_id", &self.report_id)
            .field("query_id", &self.query_id)
            .field("phase", &self.state.phase())
            .finish_non_exhaustive()
    }
}
