//! The batch runner - runs a task within one invocation's time budget.

use crate::{BatchTask, DeferredScheduler, EngineError, Result, TimeBudget};
use longrun_core::{ContinuationId, EngineConfig, ExecutionRecord, ExecutionSummary};
use longrun_storage::{ExecutionStore, StorageError};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};

/// How an invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The task reported completion and its record was removed
    Completed,
    /// The budget ran out; the run resumes when this continuation fires
    Scheduled(ContinuationId),
}

/// Result of a single invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Task name
    pub task: String,
    /// Batches processed by this invocation
    pub batches_run: u64,
    /// Batches processed since the run was initialised
    pub total_batches: u64,
    /// How the invocation ended
    pub outcome: RunOutcome,
}

impl RunReport {
    /// Whether the task finished during this invocation.
    pub fn is_completed(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }
}

/// Runs batch tasks against an execution store and a deferred scheduler.
///
/// Each call to [`BatchRunner::run`] is one invocation:
/// ```text
/// Load record → Cancel old continuation → [Batch → Checkpoint]* → Schedule | Remove
/// ```
pub struct BatchRunner {
    store: Arc<dyn ExecutionStore>,
    scheduler: Arc<dyn DeferredScheduler>,
    config: EngineConfig,
    budget: TimeBudget,
}

impl BatchRunner {
    /// Create a runner with the default configuration.
    pub fn new(store: Arc<dyn ExecutionStore>, scheduler: Arc<dyn DeferredScheduler>) -> Self {
        let config = EngineConfig::default();
        Self {
            store,
            scheduler,
            budget: TimeBudget::from_config(&config),
            config,
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.budget = TimeBudget::from_config(&config);
        self.config = config;
        self
    }

    /// Start a new run of `task` and perform its first invocation.
    ///
    /// `handler` is the name the continuation will be registered under. Fails
    /// with [`EngineError::AlreadyInProgress`] if a record already exists for
    /// the task, leaving that record untouched.
    pub async fn initialise<T: BatchTask>(&self, task: &T, handler: &str) -> Result<RunReport> {
        let name = task.name();

        if self.store.get(name).await?.is_some() {
            return Err(EngineError::AlreadyInProgress(name.to_string()));
        }

        let state = serde_json::to_value(task.initialise_state()).map_err(|source| EngineError::State {
            task: name.to_string(),
            source,
        })?;
        let record = ExecutionRecord::new(state, handler);

        if !self.store.put_if_absent(name, &record, self.config.record_ttl).await? {
            return Err(EngineError::AlreadyInProgress(name.to_string()));
        }
        info!("Initialised execution for task {} (handler {})", name, handler);

        self.run(task).await
    }

    /// Resume `task` from its stored record.
    ///
    /// Fails with [`EngineError::ExecutionNotFound`] if the record is gone,
    /// which is what a continuation firing after expiry or a stop runs into.
    pub async fn run<T: BatchTask>(&self, task: &T) -> Result<RunReport> {
        let start = Instant::now();
        let name = task.name();

        let Some(mut record) = self.store.get(name).await? else {
            return Err(EngineError::ExecutionNotFound(name.to_string()));
        };

        // The continuation that brought us here is used up
        if let Some(previous) = record.continuation_id.take() {
            self.scheduler.cancel(previous).await?;
            record.touch();
            self.store.put(name, &record, self.config.record_ttl).await?;
        }

        let mut state: T::State = serde_json::from_value(record.state.clone()).map_err(|source| EngineError::State {
            task: name.to_string(),
            source,
        })?;

        let mut completed = false;
        let mut batches_run = 0u64;

        while !completed && self.budget.allows_next(start.elapsed(), batches_run) {
            record.batches += 1;
            batches_run += 1;
            info!("Running batch {} of task {}...", record.batches, name);

            completed = task
                .process_batch(&mut state)
                .await
                .map_err(|source| EngineError::Task {
                    task: name.to_string(),
                    batch: record.batches,
                    source,
                })?;

            record.state = serde_json::to_value(&state).map_err(|source| EngineError::State {
                task: name.to_string(),
                source,
            })?;
            record.touch();
            self.store.put(name, &record, self.config.record_ttl).await?;

            info!("{} remaining", self.budget.format_remaining(start.elapsed()));
        }

        let outcome = if completed {
            info!("Finished execution of task {} after {} batches", name, record.batches);
            self.store.remove(name).await?;
            RunOutcome::Completed
        } else {
            let id = self
                .scheduler
                .schedule(&record.handler, self.config.trigger_delay)
                .await?;
            record.continuation_id = Some(id);
            record.touch();
            self.store.put(name, &record, self.config.record_ttl).await?;
            info!("Scheduled execution for task {} with ID {}", name, id);
            RunOutcome::Scheduled(id)
        };

        Ok(RunReport {
            task: name.to_string(),
            batches_run,
            total_batches: record.batches,
            outcome,
        })
    }

    /// Abandon the run of the task stored under `task_name`.
    ///
    /// Cancels the pending continuation and removes the record. Returns
    /// `false` if there was nothing to stop. A record that can no longer be
    /// parsed is removed as well.
    pub async fn stop(&self, task_name: &str) -> Result<bool> {
        let record = match self.store.get(task_name).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!("No execution of task {} to stop", task_name);
                return Ok(false);
            }
            Err(StorageError::Json(e)) => {
                warn!("Discarding unreadable execution record of task {}: {}", task_name, e);
                self.store.remove(task_name).await?;
                return Ok(true);
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(id) = record.continuation_id {
            self.scheduler.cancel(id).await?;
        }
        self.store.remove(task_name).await?;

        info!("Stopped execution of task {} after {} batches", task_name, record.batches);
        Ok(true)
    }

    /// Current execution of the task stored under `task_name`, if any.
    pub async fn status(&self, task_name: &str) -> Result<Option<ExecutionSummary>> {
        Ok(self
            .store
            .get(task_name)
            .await?
            .map(|record| record.summary(task_name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SchedulerError;
    use longrun_storage::{JsonFileStore, MemoryStore};
    use serde::{Deserialize, Serialize};
    use std::time::Duration;
    use tokio::sync::Mutex;

    /// Records every schedule/cancel call instead of firing anything.
    #[derive(Default)]
    struct RecordingScheduler {
        scheduled: Mutex<Vec<(ContinuationId, String)>>,
        cancelled: Mutex<Vec<ContinuationId>>,
    }

    impl RecordingScheduler {
        async fn scheduled(&self) -> Vec<(ContinuationId, String)> {
            self.scheduled.lock().await.clone()
        }

        async fn cancelled(&self) -> Vec<ContinuationId> {
            self.cancelled.lock().await.clone()
        }
    }

    #[async_trait::async_trait]
    impl DeferredScheduler for RecordingScheduler {
        async fn schedule(&self, handler: &str, _delay: Duration) -> std::result::Result<ContinuationId, SchedulerError> {
            let id = ContinuationId::new();
            self.scheduled.lock().await.push((id, handler.to_string()));
            Ok(id)
        }

        async fn cancel(&self, id: ContinuationId) -> std::result::Result<(), SchedulerError> {
            self.cancelled.lock().await.push(id);
            Ok(())
        }
    }

    /// Hands out `allowed` continuations, then reports itself down.
    struct FlakyScheduler {
        allowed: Mutex<usize>,
        cancelled: Mutex<Vec<ContinuationId>>,
    }

    impl FlakyScheduler {
        fn new(allowed: usize) -> Self {
            Self {
                allowed: Mutex::new(allowed),
                cancelled: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl DeferredScheduler for FlakyScheduler {
        async fn schedule(&self, _handler: &str, _delay: Duration) -> std::result::Result<ContinuationId, SchedulerError> {
            let mut allowed = self.allowed.lock().await;
            if *allowed == 0 {
                return Err(SchedulerError::Other("down".to_string()));
            }
            *allowed -= 1;
            Ok(ContinuationId::new())
        }

        async fn cancel(&self, id: ContinuationId) -> std::result::Result<(), SchedulerError> {
            self.cancelled.lock().await.push(id);
            Ok(())
        }
    }

    /// Memory store whose `put` fails once `puts_left` runs out.
    struct BrokenStore {
        inner: MemoryStore,
        puts_left: Mutex<usize>,
    }

    #[async_trait::async_trait]
    impl ExecutionStore for BrokenStore {
        async fn get(&self, key: &str) -> longrun_storage::Result<Option<ExecutionRecord>> {
            self.inner.get(key).await
        }

        async fn put(&self, key: &str, record: &ExecutionRecord, ttl: Duration) -> longrun_storage::Result<()> {
            let mut left = self.puts_left.lock().await;
            if *left == 0 {
                return Err(StorageError::Other("disk full".to_string()));
            }
            *left -= 1;
            self.inner.put(key, record, ttl).await
        }

        async fn put_if_absent(&self, key: &str, record: &ExecutionRecord, ttl: Duration) -> longrun_storage::Result<bool> {
            self.inner.put_if_absent(key, record, ttl).await
        }

        async fn remove(&self, key: &str) -> longrun_storage::Result<()> {
            self.inner.remove(key).await
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Count {
        count: u64,
    }

    /// Adds `step` per batch until `target` is reached.
    struct Counter {
        step: u64,
        target: u64,
        batch_time: Duration,
        seen: std::sync::Mutex<Vec<u64>>,
    }

    impl Counter {
        fn new(step: u64, target: u64) -> Self {
            Self {
                step,
                target,
                batch_time: Duration::ZERO,
                seen: std::sync::Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl BatchTask for Counter {
        type State = Count;

        fn name(&self) -> &str {
            "Counter"
        }

        fn initialise_state(&self) -> Count {
            Count { count: 0 }
        }

        async fn process_batch(&self, state: &mut Count) -> anyhow::Result<bool> {
            if !self.batch_time.is_zero() {
                tokio::time::sleep(self.batch_time).await;
            }
            state.count += self.step;
            self.seen.lock().unwrap().push(state.count);
            Ok(state.count >= self.target)
        }
    }

    /// Fails on the given batch, counts otherwise.
    struct Flaky {
        fail_at: u64,
    }

    #[async_trait::async_trait]
    impl BatchTask for Flaky {
        type State = Count;

        fn name(&self) -> &str {
            "Flaky"
        }

        fn initialise_state(&self) -> Count {
            Count { count: 0 }
        }

        async fn process_batch(&self, state: &mut Count) -> anyhow::Result<bool> {
            if state.count + 1 == self.fail_at {
                anyhow::bail!("mailbox unavailable");
            }
            state.count += 1;
            Ok(false)
        }
    }

    /// One batch per invocation: the first batch is always run, and with no
    /// budget left nothing follows it.
    fn one_batch_config() -> EngineConfig {
        EngineConfig::new()
            .with_max_execution(Duration::ZERO)
            .with_trigger_delay(Duration::ZERO)
    }

    fn setup(config: EngineConfig) -> (BatchRunner, MemoryStore, Arc<RecordingScheduler>) {
        let store = MemoryStore::new();
        let scheduler = Arc::new(RecordingScheduler::default());
        let runner = BatchRunner::new(Arc::new(store.clone()), scheduler.clone()).with_config(config);
        (runner, store, scheduler)
    }

    #[tokio::test]
    async fn test_run_to_completion_in_one_invocation() {
        let (runner, store, scheduler) = setup(EngineConfig::default());
        let task = Counter::new(10, 50);

        let report = runner.initialise(&task, "counter").await.unwrap();

        assert!(report.is_completed());
        assert_eq!(report.batches_run, 5);
        assert_eq!(report.total_batches, 5);
        assert!(store.get("Counter").await.unwrap().is_none());
        assert!(scheduler.scheduled().await.is_empty());
    }

    #[tokio::test]
    async fn test_initialise_twice_fails_without_touching_state() {
        let (runner, store, _scheduler) = setup(one_batch_config());
        let task = Counter::new(10, 50);

        runner.initialise(&task, "counter").await.unwrap();
        let before = store.get("Counter").await.unwrap().unwrap();

        let err = runner.initialise(&task, "counter").await.unwrap_err();
        assert!(matches!(err, EngineError::AlreadyInProgress(ref name) if name == "Counter"));

        let after = store.get("Counter").await.unwrap().unwrap();
        assert_eq!(after, before);
        assert_eq!(after.state, serde_json::json!({"count": 10}));
    }

    #[tokio::test]
    async fn test_resume_without_duplication() {
        let (runner, store, scheduler) = setup(one_batch_config());
        let task = Counter::new(7, 35);

        let mut report = runner.initialise(&task, "counter").await.unwrap();
        let mut invocations = 1;
        while !report.is_completed() {
            assert_eq!(report.batches_run, 1);
            let record = store.get("Counter").await.unwrap().unwrap();
            assert_eq!(record.batches, invocations);
            assert_eq!(record.state, serde_json::json!({"count": 7 * invocations}));

            report = runner.run(&task).await.unwrap();
            invocations += 1;
        }

        assert_eq!(invocations, 5);
        assert_eq!(report.total_batches, 5);
        assert_eq!(*task.seen.lock().unwrap(), vec![7, 14, 21, 28, 35]);
        assert!(store.get("Counter").await.unwrap().is_none());
        assert_eq!(scheduler.scheduled().await.len(), 4);
    }

    #[tokio::test]
    async fn test_each_continuation_cancelled_before_next() {
        let (runner, _store, scheduler) = setup(one_batch_config());
        let task = Counter::new(1, 3);

        runner.initialise(&task, "counter").await.unwrap();
        runner.run(&task).await.unwrap();
        let report = runner.run(&task).await.unwrap();
        assert!(report.is_completed());

        let scheduled: Vec<_> = scheduler.scheduled().await.into_iter().map(|(id, _)| id).collect();
        assert_eq!(scheduled.len(), 2);
        // Every continuation that was scheduled got cancelled, in order
        assert_eq!(scheduler.cancelled().await, scheduled);
    }

    #[tokio::test]
    async fn test_continuation_uses_handler_name() {
        let (runner, store, scheduler) = setup(one_batch_config());
        let task = Counter::new(1, 10);

        let report = runner.initialise(&task, "count_things").await.unwrap();

        let RunOutcome::Scheduled(id) = report.outcome else {
            panic!("expected a continuation");
        };
        assert_eq!(scheduler.scheduled().await, vec![(id, "count_things".to_string())]);

        let record = store.get("Counter").await.unwrap().unwrap();
        assert_eq!(record.continuation_id, Some(id));
        assert_eq!(record.handler, "count_things");
    }

    #[tokio::test]
    async fn test_run_without_record_fails() {
        let (runner, _store, scheduler) = setup(one_batch_config());
        let task = Counter::new(1, 10);

        runner.initialise(&task, "counter").await.unwrap();
        runner.stop("Counter").await.unwrap();

        let err = runner.run(&task).await.unwrap_err();
        assert!(matches!(err, EngineError::ExecutionNotFound(ref name) if name == "Counter"));
        // Nothing was re-initialised behind our back
        assert_eq!(scheduler.scheduled().await.len(), 1);
        assert_eq!(task.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_record_fails_resume() {
        let config = one_batch_config().with_record_ttl(Duration::from_secs(300));
        let (runner, _store, _scheduler) = setup(config);
        let task = Counter::new(1, 10);

        runner.initialise(&task, "counter").await.unwrap();
        tokio::time::advance(Duration::from_secs(301)).await;

        let err = runner.run(&task).await.unwrap_err();
        assert!(matches!(err, EngineError::ExecutionNotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_limits_batches_per_invocation() {
        let (runner, store, _scheduler) = setup(EngineConfig::default());
        let mut task = Counter::new(1, 100);
        task.batch_time = Duration::from_secs(30);

        let report = runner.initialise(&task, "counter").await.unwrap();

        // After 9 batches 90s remain, which is not more than 30s + 60s
        assert_eq!(report.batches_run, 9);
        assert!(matches!(report.outcome, RunOutcome::Scheduled(_)));
        let record = store.get("Counter").await.unwrap().unwrap();
        assert_eq!(record.state, serde_json::json!({"count": 9}));
    }

    #[tokio::test]
    async fn test_failing_batch_keeps_last_checkpoint() {
        let config = EngineConfig::default();
        let (runner, store, scheduler) = setup(config);
        let task = Flaky { fail_at: 4 };

        let err = runner.initialise(&task, "flaky").await.unwrap_err();
        assert!(matches!(err, EngineError::Task { batch: 4, .. }));
        assert!(err.to_string().contains("mailbox unavailable"));

        let record = store.get("Flaky").await.unwrap().unwrap();
        assert_eq!(record.batches, 3);
        assert_eq!(record.state, serde_json::json!({"count": 3}));
        assert!(scheduler.scheduled().await.is_empty());
    }

    #[tokio::test]
    async fn test_scheduler_failure_leaves_no_stale_continuation() {
        let store = MemoryStore::new();
        let scheduler = Arc::new(FlakyScheduler::new(1));
        let runner = BatchRunner::new(Arc::new(store.clone()), scheduler.clone()).with_config(one_batch_config());
        let task = Counter::new(1, 10);

        let report = runner.initialise(&task, "counter").await.unwrap();
        let RunOutcome::Scheduled(first) = report.outcome else {
            panic!("expected a continuation");
        };

        let err = runner.run(&task).await.unwrap_err();
        assert!(matches!(err, EngineError::Scheduler(_)));
        assert_eq!(*scheduler.cancelled.lock().await, vec![first]);

        let record = store.get("Counter").await.unwrap().unwrap();
        assert_eq!(record.continuation_id, None);
        assert_eq!(record.batches, 2);
        assert_eq!(record.state, serde_json::json!({"count": 2}));
    }

    #[tokio::test]
    async fn test_used_continuation_is_cleared_before_batches() {
        let (runner, store, scheduler) = setup(one_batch_config());
        let task = Counter::new(1, 10);
        runner.initialise(&task, "counter").await.unwrap();

        // Unreadable state stops the invocation right after the record is loaded
        let mut record = store.get("Counter").await.unwrap().unwrap();
        record.state = serde_json::json!({"count": "broken"});
        store.put("Counter", &record, Duration::from_secs(60)).await.unwrap();
        let err = runner.run(&task).await.unwrap_err();
        assert!(matches!(err, EngineError::State { .. }));

        let status = runner.status("Counter").await.unwrap().unwrap();
        assert_eq!(status.continuation_id, None);
        assert_eq!(scheduler.cancelled().await.len(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let store = BrokenStore {
            inner: MemoryStore::new(),
            puts_left: Mutex::new(2),
        };
        let scheduler = Arc::new(RecordingScheduler::default());
        let runner = BatchRunner::new(Arc::new(store), scheduler.clone());
        let task = Counter::new(1, 10);

        let err = runner.initialise(&task, "counter").await.unwrap_err();
        assert!(matches!(err, EngineError::Storage(StorageError::Other(_))));
        assert_eq!(task.seen.lock().unwrap().len(), 3);
        assert!(scheduler.scheduled().await.is_empty());
    }

    #[tokio::test]
    async fn test_stop_discards_unreadable_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path()).await.unwrap();
        let path = dir.path().join("executions").join("Counter.json");
        std::fs::write(&path, "").unwrap();

        let runner = BatchRunner::new(Arc::new(store), Arc::new(RecordingScheduler::default()))
            .with_config(one_batch_config());
        let task = Counter::new(1, 10);

        assert!(matches!(
            runner.initialise(&task, "counter").await,
            Err(EngineError::Storage(StorageError::Json(_)))
        ));

        assert!(runner.stop("Counter").await.unwrap());
        assert!(!path.exists());

        let report = runner.initialise(&task, "counter").await.unwrap();
        assert_eq!(report.total_batches, 1);
    }

    #[tokio::test]
    async fn test_stop_cancels_and_removes() {
        let (runner, store, scheduler) = setup(one_batch_config());
        let task = Counter::new(1, 10);

        let report = runner.initialise(&task, "counter").await.unwrap();
        let RunOutcome::Scheduled(id) = report.outcome else {
            panic!("expected a continuation");
        };

        assert!(runner.stop("Counter").await.unwrap());
        assert_eq!(scheduler.cancelled().await, vec![id]);
        assert!(store.get("Counter").await.unwrap().is_none());

        assert!(!runner.stop("Counter").await.unwrap());
    }

    #[tokio::test]
    async fn test_status_reports_progress() {
        let (runner, _store, _scheduler) = setup(one_batch_config());
        let task = Counter::new(1, 10);

        assert!(runner.status("Counter").await.unwrap().is_none());

        runner.initialise(&task, "counter").await.unwrap();
        runner.run(&task).await.unwrap();

        let summary = runner.status("Counter").await.unwrap().unwrap();
        assert_eq!(summary.task, "Counter");
        assert_eq!(summary.handler, "counter");
        assert_eq!(summary.batches, 2);
        assert!(summary.continuation_id.is_some());
    }

    #[tokio::test]
    async fn test_incompatible_stored_state_is_reported() {
        let (runner, store, _scheduler) = setup(one_batch_config());
        let task = Counter::new(1, 10);
        let record = ExecutionRecord::new(serde_json::json!({"senders": {}}), "counter");
        store.put("Counter", &record, Duration::from_secs(60)).await.unwrap();

        let err = runner.run(&task).await.unwrap_err();
        assert!(matches!(err, EngineError::State { .. }));
    }
}
