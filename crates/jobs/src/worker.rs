// crates/jobs/src/worker.rs
//! Background task driving one submitted query to a committed result.

use std::future::Future;
use std::sync::Arc;

use futures_util::StreamExt;
use geoquery_core::{BlobDestination, EngineState, JobStatus, QueryHandle};
use tokio_util::sync::CancellationToken;

use super::encoder::CsvLineWriter;
use super::error::JobError;
use super::job::Job;

/// Why the worker stopped before committing.
enum Interrupt {
    Cancelled,
    Failed(JobError),
}

impl Interrupt {
    /// Errors caused by our own cancellation are not failures.
    fn classify(err: JobError, token: &CancellationToken) -> Self {
        if err.is_cancellation() || token.is_cancelled() {
            Self::Cancelled
        } else {
            Self::Failed(err)
        }
    }
}

async fn until_cancelled<T, F>(token: &CancellationToken, fut: F) -> Result<T, Interrupt>
where
    F: Future<Output = Result<T, JobError>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Interrupt::Cancelled),
        result = fut => result.map_err(|err| Interrupt::classify(err, token)),
    }
}

pub(crate) async fn run(
    job: Arc<Job>,
    handle: Box<dyn QueryHandle>,
    destination: Arc<dyn BlobDestination>,
) {
    match execute(&job, handle.as_ref(), destination.as_ref()).await {
        Ok(()) => {}
        Err(Interrupt::Cancelled) if job.token().is_cancelled() => {
            tracing::debug!(job_id = %job.id(), "Worker stopped by cancellation");
        }
        Err(Interrupt::Cancelled) => {
            // A capability gave up on its own while the job was still live.
            tracing::warn!(job_id = %job.id(), "Capability cancelled a live job");
            job.cancel().await;
        }
        Err(Interrupt::Failed(err)) => job.fail(err).await,
    }
}

async fn execute(
    job: &Job,
    handle: &dyn QueryHandle,
    destination: &dyn BlobDestination,
) -> Result<(), Interrupt> {
    let token = job.token();

    let stats = until_cancelled(token, async {
        handle.wait(token).await.map_err(JobError::Execution)
    })
    .await?;
    if stats.state != EngineState::Done {
        let violation = format!(
            "query {} returned from wait in state {:?}",
            handle.id(),
            stats.state
        );
        // End the job first so the consumer and the store observe it.
        job.fail(JobError::EngineContract(violation.clone())).await;
        panic!("{violation}");
    }

    let result = until_cancelled(token, async {
        handle.read(token).await.map_err(JobError::Read)
    })
    .await?;
    job.state()
        .record_stats(result.total_rows, stats.total_bytes_processed);
    job.progress(JobStatus::from(stats.state)).await;

    let writer = until_cancelled(token, async {
        destination.open_writer(token).await.map_err(JobError::Write)
    })
    .await?;
    let mut encoder = CsvLineWriter::new(writer, job.config().write_buffer_bytes);

    let header: Vec<String> = result.schema.iter().map(|f| f.name.clone()).collect();
    let mut rows = result.rows;
    let transcribed = until_cancelled(token, async {
        while let Some(row) = rows.next().await {
            let row = row.map_err(JobError::Read)?;
            if encoder.lines() == 0 {
                encoder.write_line(&header).await?;
            }
            encoder
                .write_line(row.iter().map(ToString::to_string))
                .await?;
        }
        Ok(())
    })
    .await;
    if let Err(interrupt) = transcribed {
        encoder.abort().await;
        return Err(interrupt);
    }

    // Committing is not raced against the token; a cancel that lands while
    // closing still wins the terminal transition.
    let attrs = encoder
        .close()
        .await
        .map_err(|err| Interrupt::classify(err, token))?;
    if token.is_cancelled() {
        return Err(Interrupt::Cancelled);
    }
    job.succeed(attrs).await;
    Ok(())
}
