// crates/jobs/src/lib.rs
//! Query job execution and result materialization.
//!
//! Provides:
//! - `JobStore`: registry of live jobs with admission control and reaping
//! - `Job`: one query run from submission to a committed CSV result
//! - `JobState`: synchronized statistics and first-wins terminal state
//! - `CsvLineWriter`: buffered CSV encoding onto a blob writer

pub mod encoder;
pub mod error;
pub mod job;
pub mod state;
pub(crate) mod status;
pub mod store;
pub mod types;
mod worker;

pub use encoder::CsvLineWriter;
pub use error::JobError;
pub use geoquery_core::JobStatus;
pub use job::Job;
pub use state::JobState;
pub use store::JobStore;
pub use types::{JobId, JobPhase, JobSnapshot, StatusReceiver};
