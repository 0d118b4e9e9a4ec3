// crates/core/src/memory.rs
//! In-memory query engine serving canned result sets.
//!
//! Used by the command-line runner (fixtures loaded from JSON) and by tests
//! that need deterministic engine behaviour: slow queries, failed executions,
//! rejected submissions, or row streams that trickle in.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::engine::{
    EngineState, Field, QueryEngine, QueryHandle, QueryStats, ResultRows, Row,
};
use crate::error::EngineError;

/// Canned outcome for one query text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultFixture {
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Row>,
    #[serde(default)]
    pub total_bytes_processed: Option<u64>,
    /// Simulated execution time before `wait` returns.
    #[serde(default)]
    pub wait_ms: u64,
    /// Delay before each row is yielded.
    #[serde(default)]
    pub row_delay_ms: u64,
    /// When set, `wait` fails with this message.
    #[serde(default)]
    pub execution_error: Option<String>,
    /// When set, `submit` rejects the query with this message.
    #[serde(default)]
    pub submit_error: Option<String>,
    /// When set, the row stream fails with this message after the last row.
    #[serde(default)]
    pub read_error: Option<String>,
}

impl ResultFixture {
    pub fn new<I, S>(columns: I, rows: Vec<Row>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows,
            ..Self::default()
        }
    }

    pub fn wait_for(mut self, wait: Duration) -> Self {
        self.wait_ms = wait.as_millis() as u64;
        self
    }

    pub fn row_delay(mut self, delay: Duration) -> Self {
        self.row_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn failing_with(mut self, message: impl Into<String>) -> Self {
        self.execution_error = Some(message.into());
        self
    }

    pub fn rejected_with(mut self, message: impl Into<String>) -> Self {
        self.submit_error = Some(message.into());
        self
    }

    pub fn read_failing_with(mut self, message: impl Into<String>) -> Self {
        self.read_error = Some(message.into());
        self
    }

    pub fn processed_bytes(mut self, bytes: u64) -> Self {
        self.total_bytes_processed = Some(bytes);
        self
    }
}

/// Query engine backed by a fixed map of query text to [`ResultFixture`].
#[derive(Clone, Default)]
pub struct StaticEngine {
    fixtures: Arc<HashMap<String, ResultFixture>>,
    submitted: Arc<AtomicU64>,
}

impl StaticEngine {
    pub fn new(fixtures: HashMap<String, ResultFixture>) -> Self {
        Self {
            fixtures: Arc::new(fixtures),
            submitted: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Single-query engine.
    pub fn single(query_text: impl Into<String>, fixture: ResultFixture) -> Self {
        Self::new(HashMap::from([(query_text.into(), fixture)]))
    }

    /// Parse a JSON object mapping query text to fixtures.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let fixtures: HashMap<String, ResultFixture> = serde_json::from_str(json)?;
        Ok(Self::new(fixtures))
    }

    /// Number of queries accepted so far.
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl QueryEngine for StaticEngine {
    async fn submit(&self, query_text: &str) -> Result<Box<dyn QueryHandle>, EngineError> {
        let Some(fixture) = self.fixtures.get(query_text) else {
            return Err(EngineError::Rejected(format!(
                "no fixture for query: {query_text}"
            )));
        };
        if let Some(message) = &fixture.submit_error {
            return Err(EngineError::Rejected(message.clone()));
        }
        let seq = self.submitted.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(Box::new(StaticHandle {
            id: format!("static-{seq}"),
            fixture: fixture.clone(),
        }))
    }

    fn name(&self) -> &str {
        "static"
    }
}

struct StaticHandle {
    id: String,
    fixture: ResultFixture,
}

/// Sleep for `ms` milliseconds unless the token fires first.
async fn pause(cancel: &CancellationToken, ms: u64) -> Result<(), EngineError> {
    if ms == 0 {
        return Ok(());
    }
    tokio::select! {
        _ = cancel.cancelled() => Err(EngineError::Cancelled),
        _ = tokio::time::sleep(Duration::from_millis(ms)) => Ok(()),
    }
}

#[async_trait]
impl QueryHandle for StaticHandle {
    fn id(&self) -> &str {
        &self.id
    }

    async fn wait(&self, cancel: &CancellationToken) -> Result<QueryStats, EngineError> {
        pause(cancel, self.fixture.wait_ms).await?;
        if let Some(message) = &self.fixture.execution_error {
            return Err(EngineError::Execution(message.clone()));
        }
        Ok(QueryStats {
            state: EngineState::Done,
            total_bytes_processed: self.fixture.total_bytes_processed,
        })
    }

    async fn read(&self, cancel: &CancellationToken) -> Result<ResultRows, EngineError> {
        let rows = self.fixture.rows.clone();
        let row_delay_ms = self.fixture.row_delay_ms;
        let read_error = self.fixture.read_error.clone();
        let cancel = cancel.clone();

        let stream = async_stream::stream! {
            let mut interrupted = false;
            for row in rows {
                if let Err(err) = pause(&cancel, row_delay_ms).await {
                    interrupted = true;
                    yield Err(err);
                    break;
                }
                yield Ok(row);
            }
            if let (false, Some(message)) = (interrupted, read_error) {
                yield Err(EngineError::Read(message));
            }
        };

        Ok(ResultRows {
            schema: Field::schema(self.fixture.columns.iter().cloned()),
            total_rows: self.fixture.rows.len() as u64,
            rows: Box::pin(stream),
        })
    }
}
