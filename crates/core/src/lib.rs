// crates/core/src/lib.rs
//! Capability contracts and shared types for the query job core.

pub mod blob;
pub mod config;
pub mod engine;
pub mod error;
pub mod memory;
pub mod status;

pub use blob::{BlobAttributes, BlobDestination, BlobWriter};
pub use config::JobConfig;
pub use engine::{
    EngineState, Field, QueryEngine, QueryHandle, QueryStats, ResultRows, Row, RowStream, Value,
};
pub use error::*;
pub use memory::{ResultFixture, StaticEngine};
pub use status::JobStatus;
