//! JSON file execution store.
//!
//! Stores one JSON file per key in a directory. Each file carries the record
//! and its expiry timestamp; expired files are treated as missing and removed
//! the next time they are read.

use std::path::{Path, PathBuf};
use std::time::Duration;
use longrun_core::{ExecutionRecord, Time};
use serde::{Deserialize, Serialize};
use super::{ExecutionStore, StorageError, Result};
use tokio::fs;
use tracing::debug;

/// On-disk layout of one entry.
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    expires_at: Time,
    record: ExecutionRecord,
}

impl StoredEntry {
    fn new(record: &ExecutionRecord, ttl: Duration) -> Result<Self> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| StorageError::Other(format!("TTL out of range: {}", e)))?;
        Ok(Self {
            expires_at: chrono::Utc::now() + ttl,
            record: record.clone(),
        })
    }

    fn is_live(&self) -> bool {
        chrono::Utc::now() < self.expires_at
    }
}

/// File-based JSON execution store backend.
///
/// Survives process restarts, which is what lets a continuation fired in a
/// fresh process pick up where the previous invocation stopped.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    /// Create storage rooted at `root`, creating the directory if needed.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("executions")).await?;
        Ok(Self { root })
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
            && !key.starts_with('.');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join("executions").join(format!("{}.json", key)))
    }

    async fn read_live(&self, path: &Path) -> Result<Option<StoredEntry>> {
        let Some(entry) = read_json::<StoredEntry>(path).await? else {
            return Ok(None);
        };

        if entry.is_live() {
            return Ok(Some(entry));
        }

        debug!("Entry {} expired at {}", path.display(), entry.expires_at);
        remove_if_exists(path).await?;
        Ok(None)
    }
}

#[async_trait::async_trait]
impl ExecutionStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<ExecutionRecord>> {
        let path = self.entry_path(key)?;
        Ok(self.read_live(&path).await?.map(|e| e.record))
    }

    async fn put(&self, key: &str, record: &ExecutionRecord, ttl: Duration) -> Result<()> {
        let path = self.entry_path(key)?;
        let json = serde_json::to_string_pretty(&StoredEntry::new(record, ttl)?)?;

        // Write-then-rename so readers never observe a half-written file
        let tmp = tmp_path(&path);
        fs::write(&tmp, json.as_bytes()).await?;
        fs::rename(&tmp, &path).await?;

        debug!("Stored {} (batches: {})", key, record.batches);
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, record: &ExecutionRecord, ttl: Duration) -> Result<bool> {
        let path = self.entry_path(key)?;

        if self.read_live(&path).await?.is_some() {
            return Ok(false);
        }

        let json = serde_json::to_string_pretty(&StoredEntry::new(record, ttl)?)?;

        // hard_link fails with AlreadyExists rather than replacing an entry
        let tmp = tmp_path(&path);
        fs::write(&tmp, json.as_bytes()).await?;
        let linked = fs::hard_link(&tmp, &path).await;
        remove_if_exists(&tmp).await?;

        match linked {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        debug!("Created {}", key);
        Ok(true)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.entry_path(key)?;
        remove_if_exists(&path).await?;
        debug!("Removed {}", key);
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    path.with_extension(format!("{}.tmp", ulid::Ulid::new()))
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    fs::remove_file(path).await.or_else(|e| {
        if e.kind() == std::io::ErrorKind::NotFound { Ok(()) } else { Err(e) }
    })?;
    Ok(())
}
