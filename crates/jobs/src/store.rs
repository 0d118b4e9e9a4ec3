// crates/jobs/src/store.rs
//! Registry of live jobs with admission control and automatic reaping.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use geoquery_core::{ConfigError, JobConfig, QueryEngine};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use super::error::JobError;
use super::job::Job;
use super::types::{JobId, JobSnapshot};

struct StoreInner {
    jobs: Mutex<HashMap<JobId, Arc<Job>>>,
    engine: Arc<dyn QueryEngine>,
    config: JobConfig,
    admission: Arc<Semaphore>,
}

impl StoreInner {
    fn jobs(&self) -> MutexGuard<'_, HashMap<JobId, Arc<Job>>> {
        match self.jobs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("Mutex poisoned in JobStore; recovering");
                poisoned.into_inner()
            }
        }
    }
}

/// Owns every live [`Job`]. Cloning shares the same registry.
///
/// A job is removed as soon as its token is cancelled, which happens on
/// success, failure, cancel, rejected submission, or when its deadline
/// passes. At most `max_concurrent_jobs` jobs are live at once.
#[derive(Clone)]
pub struct JobStore {
    inner: Arc<StoreInner>,
}

impl JobStore {
    pub fn new(engine: Arc<dyn QueryEngine>, config: JobConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let admission = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        Ok(Self {
            inner: Arc::new(StoreInner {
                jobs: Mutex::new(HashMap::new()),
                engine,
                config,
                admission,
            }),
        })
    }

    pub fn config(&self) -> &JobConfig {
        &self.inner.config
    }

    /// Register a new job and arm its deadline. Waits for a free slot when
    /// the store is at capacity.
    pub async fn create(
        &self,
        report_id: impl Into<String>,
        query_id: impl Into<String>,
    ) -> Arc<Job> {
        let permit = Arc::clone(&self.inner.admission).acquire_owned().await.ok();
        self.admit(report_id.into(), query_id.into(), permit)
    }

    /// Like [`JobStore::create`] but fails instead of waiting for a slot.
    pub fn try_create(
        &self,
        report_id: impl Into<String>,
        query_id: impl Into<String>,
    ) -> Result<Arc<Job>, JobError> {
        let permit = match Arc::clone(&self.inner.admission).try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(TryAcquireError::NoPermits) => {
                return Err(JobError::AtCapacity {
                    limit: self.inner.config.max_concurrent_jobs,
                })
            }
            Err(TryAcquireError::Closed) => None,
        };
        Ok(self.admit(report_id.into(), query_id.into(), permit))
    }

    fn admit(
        &self,
        report_id: String,
        query_id: String,
        permit: Option<OwnedSemaphorePermit>,
    ) -> Arc<Job> {
        let job = Arc::new(Job::new(
            report_id,
            query_id,
            Arc::clone(&self.inner.engine),
            self.inner.config.clone(),
        ));
        self.inner.jobs().insert(job.id(), Arc::clone(&job));
        tracing::debug!(
            job_id = %job.id(),
            query_id = %job.query_id(),
            report_id = %job.report_id(),
            "Job created"
        );

        tokio::spawn(reap_when_done(
            Arc::downgrade(&self.inner),
            Arc::clone(&job),
            permit,
        ));
        job
    }

    /// Cancel every live job created for `query_id`. Returns how many jobs
    /// this call moved to a terminal state.
    pub async fn cancel(&self, query_id: &str) -> usize {
        let matching: Vec<Arc<Job>> = self
            .inner
            .jobs()
            .values()
            .filter(|job| job.query_id() == query_id)
            .cloned()
            .collect();

        let mut cancelled = 0;
        for job in matching {
            if job.cancel().await {
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            tracing::info!(query_id, cancelled, "Cancelled jobs for query");
        }
        cancelled
    }

    /// Cancel every live job.
    pub async fn shutdown(&self) -> usize {
        let all: Vec<Arc<Job>> = self.inner.jobs().values().cloned().collect();
        let mut cancelled = 0;
        for job in all {
            if job.cancel().await {
                cancelled += 1;
            }
        }
        tracing::info!(cancelled, "Job store shut down");
        cancelled
    }

    pub fn get(&self, id: JobId) -> Option<Arc<Job>> {
        self.inner.jobs().get(&id).cloned()
    }

    pub fn jobs_for_query(&self, query_id: &str) -> Vec<Arc<Job>> {
        self.inner
            .jobs()
            .values()
            .filter(|job| job.query_id() == query_id)
            .cloned()
            .collect()
    }

    /// Snapshots of all live jobs, oldest first.
    pub fn snapshots(&self) -> Vec<JobSnapshot> {
        let mut jobs: Vec<Arc<Job>> = self.inner.jobs().values().cloned().collect();
        jobs.sort_by_key(|job| job.created_at());
        jobs.iter().map(|job| job.snapshot()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.jobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Wait for the job to end, or cancel it at its deadline, then drop it from
/// the registry and free its admission slot.
async fn reap_when_done(
    store: Weak<StoreInner>,
    job: Arc<Job>,
    permit: Option<OwnedSemaphorePermit>,
) {
    tokio::select! {
        _ = job.token().cancelled() => {}
        _ = tokio::time::sleep_until(job.deadline()) => {
            tracing::warn!(
                job_id = %job.id(),
                query_id = %job.query_id(),
                timeout_secs = job.config().query_timeout.as_secs(),
                "Job deadline exceeded; cancelling"
            );
            job.token().cancel();
        }
    }
    job.settle().await;

    if let Some(store) = store.upgrade() {
        store.jobs().remove(&job.id());
    }
    tracing::debug!(job_id = %job.id(), phase = ?job.phase(), "Job reaped");
    drop(permit);
}
