// crates/jobs/src/state.rs
//! Synchronized statistics and terminal state for a single job.

use std::sync::{Mutex, MutexGuard};

use super::types::JobPhase;

#[derive(Debug, Default)]
struct Inner {
    phase: JobPhase,
    err: Option<String>,
    total_rows: u64,
    processed_bytes: u64,
    result_size: u64,
    result_id: Option<String>,
    query_handle: Option<String>,
    destination: Option<String>,
}

/// All mutable job fields behind one mutex.
///
/// Terminal transitions (`succeed`, `fail`, `cancel`) are first-wins: each
/// returns `true` only for the caller that moved the job out of a
/// non-terminal phase, so exactly one party emits the terminal status.
#[derive(Debug, Default)]
pub struct JobState {
    inner: Mutex<Inner>,
}

/// Copy of every field taken under a single lock acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateView {
    pub phase: JobPhase,
    pub err: Option<String>,
    pub total_rows: u64,
    pub processed_bytes: u64,
    pub result_size: u64,
    pub result_id: Option<String>,
    pub query_handle: Option<String>,
    pub destination: Option<String>,
}

impl JobState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("Mutex poisoned in JobState; recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Record the submitted query and its destination. Pending → Running.
    pub fn start(&self, query_handle: &str, destination: &str) -> bool {
        let mut inner = self.lock();
        if inner.phase != JobPhase::Pending {
            return false;
        }
        inner.phase = JobPhase::Running;
        inner.query_handle = Some(query_handle.to_string());
        inner.destination = Some(destination.to_string());
        true
    }

    /// Store the engine's final statistics for the query.
    pub fn record_stats(&self, total_rows: u64, processed_bytes: Option<u64>) {
        let mut inner = self.lock();
        inner.total_rows = total_rows;
        if let Some(bytes) = processed_bytes {
            inner.processed_bytes = bytes;
        }
    }

    pub fn succeed(&self, result_id: String, result_size: Option<u64>) -> bool {
        let mut inner = self.lock();
        if inner.phase.is_terminal() {
            return false;
        }
        inner.phase = JobPhase::Succeeded;
        inner.result_id = Some(result_id);
        if let Some(size) = result_size {
            inner.result_size = size;
        }
        true
    }

    pub fn fail(&self, err: impl Into<String>) -> bool {
        let mut inner = self.lock();
        if inner.phase.is_terminal() {
            return false;
        }
        inner.phase = JobPhase::Failed;
        inner.err = Some(err.into());
        true
    }

    /// Terminal without error or result.
    pub fn cancel(&self) -> bool {
        let mut inner = self.lock();
        if inner.phase.is_terminal() {
            return false;
        }
        inner.phase = JobPhase::Cancelled;
        true
    }

    pub fn phase(&self) -> JobPhase {
        self.lock().phase
    }

    pub fn err(&self) -> Option<String> {
        self.lock().err.clone()
    }

    pub fn result_id(&self) -> Option<String> {
        self.lock().result_id.clone()
    }

    pub fn result_size(&self) -> u64 {
        self.lock().result_size
    }

    pub fn total_rows(&self) -> u64 {
        self.lock().total_rows
    }

    pub fn processed_bytes(&self) -> u64 {
        self.lock().processed_bytes
    }

    pub fn view(&self) -> StateView {
        let inner = self.lock();
        StateView {
            phase: inner.phase,
            err: inner.err.clone(),
            total_rows: inner.total_rows,
            processed_bytes: inner.processed_bytes,
            result_size: inner.result_size,
            result_id: inner.result_id.clone(),
            query_handle: inner.query_handle.clone(),
            destination: inner.destination.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_job_state_lifecycle() {
        let state = JobState::new();
        assert_eq!(state.phase(), JobPhase::Pending);

        assert!(state.start("static-1", "q1.csv"));
        assert!(!state.start("static-2", "q1.csv"));
        assert_eq!(state.phase(), JobPhase::Running);

        state.record_stats(1000, Some(4096));
        assert_eq!(state.total_rows(), 1000);
        assert_eq!(state.processed_bytes(), 4096);

        assert!(state.succeed("job-1".into(), Some(12)));
        assert_eq!(state.phase(), JobPhase::Succeeded);
        assert_eq!(state.result_id().as_deref(), Some("job-1"));
        assert_eq!(state.result_size(), 12);
        assert_eq!(state.err(), None);
    }

    #[test]
    fn test_terminal_transitions_are_first_wins() {
        let state = JobState::new();
        assert!(state.fail("boom"));
        assert!(!state.succeed("job-1".into(), Some(1)));
        assert!(!state.cancel());

        let view = state.view();
        assert_eq!(view.phase, JobPhase::Failed);
        assert_eq!(view.err.as_deref(), Some("boom"));
        assert_eq!(view.result_id, None);
    }

    #[test]
    fn test_cancel_records_nothing() {
        let state = JobState::new();
        assert!(state.cancel());
        assert!(!state.fail("late"));
        assert_eq!(state.err(), None);
        assert_eq!(state.result_id(), None);
    }

    #[test]
    fn test_missing_processed_bytes_keeps_previous() {
        let state = JobState::new();
        state.record_stats(3, None);
        assert_eq!(state.processed_bytes(), 0);
        assert_eq!(state.total_rows(), 3);
    }

    #[test]
    fn test_never_both_error_and_result_under_contention() {
        for _ in 0..50 {
            let state = Arc::new(JobState::new());
            let a = Arc::clone(&state);
            let b = Arc::clone(&state);
            let t1 = std::thread::spawn(move || a.succeed("job".into(), Some(1)));
            let t2 = std::thread::spawn(move || b.fail("err"));
            let won = [t1.join().unwrap(), t2.join().unwrap()];
            assert_eq!(won.iter().filter(|w| **w).count(), 1);

            let view = state.view();
            assert!(view.err.is_none() || view.result_id.is_none());
        }
    }
}
