//! Execution layer - batch tasks, time budget, continuations and the runner
//! that ties them together.

#![warn(missing_docs)]

pub mod error;
pub mod budget;
pub mod task;
pub mod scheduler;
pub mod runner;
pub mod registry;
pub mod dispatcher;

pub use error::{EngineError, Result};
pub use budget::{can_process_next, TimeBudget};
pub use task::BatchTask;
pub use scheduler::{Continuation, DeferredScheduler, SchedulerError, TokioScheduler};
pub use runner::{BatchRunner, RunOutcome, RunReport};
pub use registry::TaskRegistry;
pub use dispatcher::Dispatcher;
