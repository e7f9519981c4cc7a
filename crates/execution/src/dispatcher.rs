//! Dispatch of fired continuations.

use crate::{Continuation, DeferredScheduler, Result, RunReport, TaskRegistry, TokioScheduler};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Feeds fired continuations from a [`TokioScheduler`] back into the registry.
///
/// Every fired continuation is one fresh invocation of the run loop for its
/// handler. Failures are logged and do not stop the dispatcher.
pub struct Dispatcher {
    registry: Arc<TaskRegistry>,
    scheduler: TokioScheduler,
    fired: mpsc::UnboundedReceiver<Continuation>,
}

impl Dispatcher {
    /// Create a dispatcher over the scheduler the registry's runner uses.
    pub fn new(
        registry: Arc<TaskRegistry>,
        scheduler: TokioScheduler,
        fired: mpsc::UnboundedReceiver<Continuation>,
    ) -> Self {
        Self {
            registry,
            scheduler,
            fired,
        }
    }

    /// Handle fired continuations until none is pending.
    ///
    /// Returns the number of invocations performed.
    pub async fn run_until_idle(&mut self) -> usize {
        let mut invocations = 0;

        loop {
            let next = if self.scheduler.pending().await == 0 {
                // Nothing can fire any more; drain what already did
                match self.fired.try_recv() {
                    Ok(continuation) => continuation,
                    Err(_) => break,
                }
            } else {
                match self.fired.recv().await {
                    Some(continuation) => continuation,
                    None => break,
                }
            };

            if let Err(e) = self.dispatch(next).await {
                error!("Invocation failed: {}", e);
            }
            invocations += 1;
        }

        debug!("Dispatcher idle after {} invocations", invocations);
        invocations
    }

    /// Consume one fired continuation and run its handler.
    pub async fn dispatch(&self, continuation: Continuation) -> Result<RunReport> {
        info!("Continuation {} fired for {}", continuation.id, continuation.handler);
        self.scheduler.cancel(continuation.id).await?;
        self.registry.run(&continuation.handler).await
    }
}
