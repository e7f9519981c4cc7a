//! Time budget of a single invocation.

use longrun_core::EngineConfig;
use std::time::Duration;

/// Decide whether another batch fits in the invocation's time budget.
///
/// A batch is affordable when the time left exceeds the average batch
/// duration observed so far plus the delay reserved for scheduling a
/// continuation. The first batch (`batches_processed == 0`) is always
/// attempted so every invocation makes progress, even under a budget too
/// small to fit it.
pub fn can_process_next(
    elapsed: Duration,
    batches_processed: u64,
    max_duration: Duration,
    scheduling_delay: Duration,
) -> bool {
    if batches_processed == 0 {
        return true;
    }

    let remaining = max_duration.saturating_sub(elapsed);
    let nanos = elapsed.as_nanos() / u128::from(batches_processed);
    let average = Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX));
    remaining > average + scheduling_delay
}

/// Budget for one invocation of the run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBudget {
    /// Hard wall-clock limit of one invocation
    pub max_duration: Duration,
    /// Slack kept for registering the continuation
    pub scheduling_delay: Duration,
}

impl Default for TimeBudget {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl TimeBudget {
    /// Create a new budget.
    pub fn new(max_duration: Duration, scheduling_delay: Duration) -> Self {
        Self {
            max_duration,
            scheduling_delay,
        }
    }

    /// Budget described by an engine config.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.max_execution, config.trigger_delay)
    }

    /// Check if another batch can be started.
    pub fn allows_next(&self, elapsed: Duration, batches_processed: u64) -> bool {
        can_process_next(elapsed, batches_processed, self.max_duration, self.scheduling_delay)
    }

    /// Time left before the hard limit.
    pub fn remaining(&self, elapsed: Duration) -> Duration {
        self.max_duration.saturating_sub(elapsed)
    }

    /// Remaining time rendered as `"5m 12s"`.
    pub fn format_remaining(&self, elapsed: Duration) -> String {
        let secs = self.remaining(elapsed).as_secs();
        format!("{}m {}s", secs / 60, secs % 60)
    }
}
