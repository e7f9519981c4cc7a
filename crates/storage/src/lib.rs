//! Execution store abstraction and implementations for longrun.
//!
//! This crate provides the trait-based key-value store execution records are
//! checkpointed to, with an in-memory and a JSON file implementation.

#![warn(missing_docs)]

pub mod trait_;
pub mod memory;
pub mod json_storage;

pub use trait_::{ExecutionStore, StorageError, Result};
pub use memory::MemoryStore;
pub use json_storage::JsonFileStore;
