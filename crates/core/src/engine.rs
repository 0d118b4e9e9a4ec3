// crates/core/src/engine.rs
//! Query execution capability.
//!
//! A job only ever talks to the remote warehouse through these traits:
//! - `QueryEngine`: accepts query text, hands back a running query
//! - `QueryHandle`: waits for completion, then exposes the result rows
//!
//! Every blocking call receives the job's cancellation token so an
//! implementation can abandon network work as soon as the job is cancelled.

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;

/// A finite, non-restartable stream of result rows.
pub type RowStream = Pin<Box<dyn Stream<Item = Result<Row, EngineError>> + Send>>;

/// One result row, values in schema order.
pub type Row = Vec<Value>;

/// Execution phase reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Pending,
    Running,
    Done,
}

/// Statistics returned once the engine reports completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryStats {
    pub state: EngineState,
    /// Bytes scanned by the engine, when it reports them.
    pub total_bytes_processed: Option<u64>,
}

/// A single column of the result schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub position: usize,
}

impl Field {
    /// Build a schema from column names, assigning positions in order.
    pub fn schema<I, S>(names: I) -> Vec<Field>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names
            .into_iter()
            .enumerate()
            .map(|(position, name)| Field {
                name: name.into(),
                position,
            })
            .collect()
    }
}

/// A scalar cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(v) => f.write_str(v),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

/// Rows of a completed query together with their schema.
pub struct ResultRows {
    pub schema: Vec<Field>,
    /// Row count as reported by the engine (may be known before streaming).
    pub total_rows: u64,
    pub rows: RowStream,
}

impl fmt::Debug for ResultRows {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultRows")
            .field("schema", &self.schema)
            .field("total_rows", &self.total_rows)
            .finish_non_exhaustive()
    }
}

/// Entry point to a remote query engine.
#[async_trait]
pub trait QueryEngine: Send + Sync + 'static {
    /// Submit the query. Errors here mean the engine refused it outright.
    async fn submit(&self, query_text: &str) -> Result<Box<dyn QueryHandle>, EngineError>;

    /// Engine name for logging.
    fn name(&self) -> &str;
}

/// A query the engine accepted.
#[async_trait]
pub trait QueryHandle: Send + Sync {
    /// Engine-side identifier of the running query.
    fn id(&self) -> &str;

    /// Block until the engine finishes executing the query.
    ///
    /// A successful return must carry `EngineState::Done`.
    async fn wait(&self, cancel: &CancellationToken) -> Result<QueryStats, EngineError>;

    /// Open the result rows. Only valid after `wait` succeeded.
    async fn read(&self, cancel: &CancellationToken) -> Result<ResultRows, EngineError>;
}
