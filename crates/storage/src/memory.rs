//! In-memory execution store.
//!
//! Expiry is measured with `tokio::time::Instant`, so tests running on a
//! paused clock can expire entries with `tokio::time::advance`.

use super::{ExecutionStore, Result};
use longrun_core::ExecutionRecord;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

struct Entry {
    record: ExecutionRecord,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Process-local execution store.
///
/// Cloning shares the underlying map.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.lock().await.values().filter(|e| e.is_live(now)).count()
    }

    /// Whether the store holds no live entry.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait::async_trait]
impl ExecutionStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<ExecutionRecord>> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.record.clone())),
            Some(_) => {
                debug!("Entry {} expired", key);
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, record: &ExecutionRecord, ttl: Duration) -> Result<()> {
        let entry = Entry {
            record: record.clone(),
            expires_at: Instant::now() + ttl,
        };
        self.entries.lock().await.insert(key.to_string(), entry);
        debug!("Stored {} (batches: {})", key, record.batches);
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, record: &ExecutionRecord, ttl: Duration) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        if entries.get(key).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            Entry {
                record: record.clone(),
                expires_at: now + ttl,
            },
        );
        debug!("Created {}", key);
        Ok(true)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        debug!("Removed {}", key);
        Ok(())
    }
}
