//! longrun core data models.
//!
//! This crate defines the execution record persisted between invocations of
//! a long-running task, the identifiers handed out by deferred schedulers and
//! the engine configuration shared by every other crate.

#![warn(missing_docs)]

// Core identities
mod id;

// Persisted execution state
mod execution;

// Engine configuration
mod config;

// Re-exports
pub use id::*;
pub use execution::{ExecutionRecord, ExecutionSummary};
pub use config::{ConfigError, EngineConfig};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
