//! Diagnosis orchestration engine.
//!
//! Expands a diagnosis config into its `question × model × brand` task
//! matrix, executes the matrix against AI platform adapters with bounded
//! concurrency and retries, cleans and aggregates results incrementally,
//! tracks progress for the polling API, and checkpoints to the persistence
//! gateway so a report survives process restarts and partial failure.

mod dead_letter;
mod engine;
mod matrix;
mod persist;
mod progress;
mod registry;
mod report;
mod state;

pub use dead_letter::{DeadLetterEntry, DeadLetterFilter, DeadLetterQueue, DeadLetterStatus};
pub use engine::{DiagnosisEngine, EngineConfig, StatusSnapshot};
pub use matrix::expand_matrix;
pub use persist::{MemoryGateway, PersistenceError, PersistenceGateway};
pub use progress::{ProgressSnapshot, ProgressTracker};
pub use registry::{ExecutionHandle, ExecutionState, Registry};
pub use report::{AggregatedReport, BrandStanding, ReportBuilder};
pub use state::DiagnosisState;

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("unknown execution: {0}")]
    UnknownExecution(Uuid),

    #[error("unknown dead letter entry: {0}")]
    UnknownDeadLetter(Uuid),
}

impl From<geodx_core::ConfigError> for EngineError {
    fn from(err: geodx_core::ConfigError) -> Self {
        EngineError::Validation(err.to_string())
    }
}
