//! Execution record - the checkpoint of a long-running task.

use crate::id::ContinuationId;
use crate::Time;
use serde::{Deserialize, Serialize};

/// Persisted snapshot of one in-progress run.
///
/// There is at most one record per task name. It is created when the task is
/// initialised, rewritten after every batch and once more when a continuation
/// is scheduled, and removed when the task completes or is stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Task-owned state, serialized
    pub state: serde_json::Value,

    /// Name the continuation is registered under
    pub handler: String,

    /// Batches processed so far, across all invocations
    pub batches: u64,

    /// Pending continuation, if one is scheduled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation_id: Option<ContinuationId>,

    /// When the run was initialised
    pub started_at: Time,

    /// Last time the record was written
    pub updated_at: Time,
}

impl ExecutionRecord {
    /// Create a fresh record for a run that has not processed any batch yet.
    pub fn new(state: serde_json::Value, handler: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            state,
            handler: handler.into(),
            batches: 0,
            continuation_id: None,
            started_at: now,
            updated_at: now,
        }
    }

    /// Bump `updated_at` to now.
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now();
    }

    /// Summarize the record without its state payload.
    pub fn summary(&self, task: impl Into<String>) -> ExecutionSummary {
        ExecutionSummary {
            task: task.into(),
            handler: self.handler.clone(),
            batches: self.batches,
            continuation_id: self.continuation_id,
            started_at: self.started_at,
            updated_at: self.updated_at,
        }
    }
}

/// Status view of an execution, as reported to operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// Task name (store key)
    pub task: String,
    /// Continuation handler name
    pub handler: String,
    /// Batches processed so far
    pub batches: u64,
    /// Pending continuation
    pub continuation_id: Option<ContinuationId>,
    /// When the run was initialised
    pub started_at: Time,
    /// Last checkpoint
    pub updated_at: Time,
}
