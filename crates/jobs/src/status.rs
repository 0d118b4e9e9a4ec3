// crates/jobs/src/status.rs
//! Ordered, bounded status emission for one job.

use std::time::Duration;

use geoquery_core::JobStatus;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tokio::sync::Mutex;

use super::types::{JobId, StatusReceiver};

/// Sending half of a job's status channel.
///
/// Sends are serialized so the worker and the cancel path cannot interleave
/// out of order, and each send gives up after `send_timeout` when the consumer
/// is not draining. The sender is dropped after the first terminal status, so
/// nothing can follow it and the consumer sees the channel close.
pub(crate) struct StatusEmitter {
    job_id: JobId,
    tx: Mutex<Option<mpsc::Sender<JobStatus>>>,
    send_timeout: Duration,
}

impl StatusEmitter {
    pub(crate) fn channel(
        job_id: JobId,
        buffer: usize,
        send_timeout: Duration,
    ) -> (Self, StatusReceiver) {
        let (tx, rx) = mpsc::channel(buffer);
        let emitter = Self {
            job_id,
            tx: Mutex::new(Some(tx)),
            send_timeout,
        };
        (emitter, rx)
    }

    /// Returns true if the status was queued for the consumer.
    pub(crate) async fn emit(&self, status: JobStatus) -> bool {
        let mut slot = self.tx.lock().await;
        let Some(tx) = slot.as_ref() else {
            tracing::debug!(job_id = %self.job_id, status = %status, "Status dropped: channel closed");
            return false;
        };

        let sent = tx.send_timeout(status, self.send_timeout).await;
        let delivered = match sent {
            Ok(()) => true,
            Err(SendTimeoutError::Timeout(_)) => {
                tracing::warn!(
                    job_id = %self.job_id,
                    status = %status,
                    timeout_secs = self.send_timeout.as_secs_f64(),
                    "Status consumer not draining; dropping status"
                );
                false
            }
            Err(SendTimeoutError::Closed(_)) => {
                tracing::debug!(job_id = %self.job_id, status = %status, "Status consumer gone");
                *slot = None;
                return false;
            }
        };

        if status.is_terminal() {
            *slot = None;
        }
        delivered
    }

    /// Close the channel without emitting anything further.
    pub(crate) async fn close(&self) {
        self.tx.lock().await.take();
    }
}
