//! Execution store trait abstraction.

use async_trait::async_trait;
use longrun_core::ExecutionRecord;
use std::time::Duration;

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Key that cannot be mapped onto the backend
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Durable key-value store for execution records.
///
/// Keys are task names. Every entry expires `ttl` after its last write; an
/// expired entry behaves exactly like a missing one. Writes are
/// last-write-wins.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Load the record stored under `key`, if present and not expired.
    async fn get(&self, key: &str) -> Result<Option<ExecutionRecord>>;

    /// Store `record` under `key`, replacing any previous value.
    async fn put(&self, key: &str, record: &ExecutionRecord, ttl: Duration) -> Result<()>;

    /// Store `record` only if no live entry exists under `key`.
    ///
    /// Returns `false` without writing when an entry already exists. The check
    /// and the write are atomic with respect to other callers of the same store.
    async fn put_if_absent(&self, key: &str, record: &ExecutionRecord, ttl: Duration) -> Result<bool>;

    /// Remove the entry under `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
}
