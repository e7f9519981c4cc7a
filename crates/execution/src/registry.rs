//! Dispatch table from continuation handler names to tasks.

use crate::{BatchRunner, BatchTask, EngineError, Result, RunReport};
use async_trait::async_trait;
use longrun_core::ExecutionSummary;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Object-safe view of a registered [`BatchTask`].
#[async_trait]
trait RegisteredTask: Send + Sync {
    fn task_name(&self) -> &str;

    async fn initialise(&self, runner: &BatchRunner, handler: &str) -> Result<RunReport>;

    async fn run(&self, runner: &BatchRunner) -> Result<RunReport>;
}

struct Registered<T>(T);

#[async_trait]
impl<T: BatchTask + 'static> RegisteredTask for Registered<T> {
    fn task_name(&self) -> &str {
        self.0.name()
    }

    async fn initialise(&self, runner: &BatchRunner, handler: &str) -> Result<RunReport> {
        runner.initialise(&self.0, handler).await
    }

    async fn run(&self, runner: &BatchRunner) -> Result<RunReport> {
        runner.run(&self.0).await
    }
}

/// Tasks known to this process, keyed by handler name.
///
/// Built once at startup. A fired continuation names its handler; the
/// registry resolves it to the task and hands it to the runner.
pub struct TaskRegistry {
    runner: Arc<BatchRunner>,
    tasks: BTreeMap<String, Box<dyn RegisteredTask>>,
}

impl TaskRegistry {
    /// Create an empty registry around a runner.
    pub fn new(runner: Arc<BatchRunner>) -> Self {
        Self {
            runner,
            tasks: BTreeMap::new(),
        }
    }

    /// Register `task` under `handler`, replacing any previous registration.
    pub fn register<T: BatchTask + 'static>(mut self, handler: impl Into<String>, task: T) -> Self {
        self.tasks.insert(handler.into(), Box::new(Registered(task)));
        self
    }

    /// Register `task` under its own task name.
    pub fn register_task<T: BatchTask + 'static>(self, task: T) -> Self {
        let handler = task.name().to_string();
        self.register(handler, task)
    }

    /// Registered handler names, sorted.
    pub fn handlers(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }

    /// Name of the task registered under `handler`.
    pub fn task_name(&self, handler: &str) -> Result<&str> {
        Ok(self.lookup(handler)?.task_name())
    }

    /// Start a new run of the task registered under `handler`.
    pub async fn initialise(&self, handler: &str) -> Result<RunReport> {
        self.lookup(handler)?.initialise(&self.runner, handler).await
    }

    /// Resume the task registered under `handler`.
    pub async fn run(&self, handler: &str) -> Result<RunReport> {
        self.lookup(handler)?.run(&self.runner).await
    }

    /// Abandon the run of the task registered under `handler`.
    pub async fn stop(&self, handler: &str) -> Result<bool> {
        let name = self.task_name(handler)?;
        self.runner.stop(name).await
    }

    /// Current execution of the task registered under `handler`.
    pub async fn status(&self, handler: &str) -> Result<Option<ExecutionSummary>> {
        let name = self.task_name(handler)?;
        self.runner.status(name).await
    }

    fn lookup(&self, handler: &str) -> Result<&dyn RegisteredTask> {
        self.tasks
            .get(handler)
            .map(|task| task.as_ref())
            .ok_or_else(|| EngineError::UnknownHandler(handler.to_string()))
    }
}
