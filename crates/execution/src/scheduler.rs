//! Deferred continuations.

use async_trait::async_trait;
use longrun_core::ContinuationId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Errors raised by a deferred scheduler.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Nobody is listening for fired continuations any more
    #[error("scheduler is closed")]
    Closed,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Creates and cancels one-shot deferred invocations of named handlers.
#[async_trait]
pub trait DeferredScheduler: Send + Sync {
    /// Arrange for `handler` to be invoked once after `delay`.
    async fn schedule(&self, handler: &str, delay: Duration) -> Result<ContinuationId, SchedulerError>;

    /// Cancel a continuation. Cancelling an unknown or already consumed id is
    /// a no-op.
    async fn cancel(&self, id: ContinuationId) -> Result<(), SchedulerError>;
}

/// A continuation whose delay has elapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Continuation {
    /// Id handed out when it was scheduled
    pub id: ContinuationId,
    /// Handler to invoke
    pub handler: String,
}

/// In-process scheduler backed by tokio timers.
///
/// Fired continuations are delivered on the channel returned by
/// [`TokioScheduler::new`]. A continuation counts as pending from the moment
/// it is scheduled until it is cancelled, including after it fired; the
/// consumer marks it consumed by cancelling its id.
#[derive(Clone)]
pub struct TokioScheduler {
    pending: Arc<Mutex<HashMap<ContinuationId, JoinHandle<()>>>>,
    fired: mpsc::UnboundedSender<Continuation>,
}

impl TokioScheduler {
    /// Create a scheduler and the receiving end of its fired continuations.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Continuation>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            fired: tx,
        };
        (scheduler, rx)
    }

    /// Number of continuations scheduled and not yet cancelled.
    pub async fn pending(&self) -> usize {
        self.pending.lock().await.len()
    }
}

#[async_trait]
impl DeferredScheduler for TokioScheduler {
    async fn schedule(&self, handler: &str, delay: Duration) -> Result<ContinuationId, SchedulerError> {
        if self.fired.is_closed() {
            return Err(SchedulerError::Closed);
        }

        let id = ContinuationId::new();
        let continuation = Continuation {
            id,
            handler: handler.to_string(),
        };
        let tx = self.fired.clone();

        let mut pending = self.pending.lock().await;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            debug!("Continuation {} for {} fired", continuation.id, continuation.handler);
            if tx.send(continuation).is_err() {
                warn!("Continuation {} fired after the receiver was dropped", id);
            }
        });
        pending.insert(id, handle);

        debug!("Scheduled {} in {:?} with ID {}", handler, delay, id);
        Ok(id)
    }

    async fn cancel(&self, id: ContinuationId) -> Result<(), SchedulerError> {
        match self.pending.lock().await.remove(&id) {
            Some(handle) => {
                handle.abort();
                info!("Deleted continuation with ID {}", id);
            }
            None => debug!("Continuation {} already gone", id),
        }
        Ok(())
    }
}
