//! Engine errors.

use crate::scheduler::SchedulerError;
use longrun_storage::StorageError;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the batch runner and the dispatch table.
///
/// None of these are retried by the engine. `AlreadyInProgress` and
/// `ExecutionNotFound` mean the record lifecycle was violated (double start,
/// or a continuation outliving its record).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A record already exists for the task
    #[error("Execution already in progress for task {0}")]
    AlreadyInProgress(String),

    /// No record exists for the task (never initialised, expired or stopped)
    #[error("Execution state for task {0} not found")]
    ExecutionNotFound(String),

    /// Nothing is registered under the handler name
    #[error("No task registered for handler {0}")]
    UnknownHandler(String),

    /// Task state could not be converted to or from its stored form
    #[error("State of task {task} could not be (de)serialized: {source}")]
    State {
        /// Task name
        task: String,
        /// Underlying serde error
        #[source]
        source: serde_json::Error,
    },

    /// A batch body failed
    #[error("Batch {batch} of task {task} failed: {source}")]
    Task {
        /// Task name
        task: String,
        /// Batch number that failed
        batch: u64,
        /// Error returned by the batch body
        #[source]
        source: anyhow::Error,
    },

    /// Execution store failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Deferred scheduler failure
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
}
