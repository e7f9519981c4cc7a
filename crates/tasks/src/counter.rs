//! Counter task - advances a number by a fixed step per batch.
//!
//! Useful for exercising the engine end to end without any data source.

use async_trait::async_trait;
use longrun_execution::BatchTask;
use serde::{Deserialize, Serialize};
use tracing::info;

/// State of a [`CounterTask`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterState {
    /// Value reached so far
    pub count: u64,
}

/// Adds `step` to the counter each batch until it reaches `target`.
#[derive(Debug, Clone)]
pub struct CounterTask {
    step: u64,
    target: u64,
}

impl CounterTask {
    /// Create a counter task. A zero step is bumped to one.
    pub fn new(step: u64, target: u64) -> Self {
        Self {
            step: step.max(1),
            target,
        }
    }
}

#[async_trait]
impl BatchTask for CounterTask {
    type State = CounterState;

    fn name(&self) -> &str {
        "CounterTask"
    }

    fn initialise_state(&self) -> CounterState {
        CounterState::default()
    }

    async fn process_batch(&self, state: &mut CounterState) -> anyhow::Result<bool> {
        if state.count >= self.target {
            return Ok(true);
        }

        state.count += self.step;
        info!("Counted to {} of {}", state.count, self.target);
        Ok(state.count >= self.target)
    }
}
