//! Batch task abstraction.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A resumable unit of logically unbounded work.
///
/// The runner calls [`BatchTask::initialise_state`] once when a run starts,
/// then [`BatchTask::process_batch`] repeatedly, checkpointing the state after
/// every call. Between invocations the state only exists in its serialized
/// form, so it must not hold handles or references.
#[async_trait]
pub trait BatchTask: Send + Sync {
    /// State carried across batches and invocations.
    type State: Serialize + DeserializeOwned + Send + Sync;

    /// Fixed task name, used as the execution store key.
    fn name(&self) -> &str;

    /// Build the state of a fresh run.
    fn initialise_state(&self) -> Self::State;

    /// Process one bounded batch of work and report whether the run is done.
    ///
    /// Must pick up from whatever `state` says, since the same checkpoint
    /// can be replayed after a crash.
    async fn process_batch(&self, state: &mut Self::State) -> anyhow::Result<bool>;
}
