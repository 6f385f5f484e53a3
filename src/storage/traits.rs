//! Storage traits and error types
//!
//! This module defines the trait interface for state backends and
//! associated error types.

use crate::model::{Classification, Entity};
use crate::state::{FrontierCounts, FrontierStatus};
use crate::storage::{RunRecord, RunStatus};
use crate::taxonomy::AssignedId;
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Corrupt row in {table}: {message}")]
    Corrupt { table: &'static str, message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for run-state backends
///
/// Frontier methods follow the transition rules of [`FrontierStatus`]:
/// a transition that does not apply to the row's current status changes
/// nothing and is reported as `false`.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new run and returns its id
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    /// Sets a final status and the finish timestamp
    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    // ===== Frontier =====

    /// Inserts a pending URL; returns false if the URL is already known
    fn frontier_insert(&mut self, url: &str) -> StorageResult<bool>;

    /// Atomically moves the oldest pending URL to in_progress
    fn frontier_claim(&mut self) -> StorageResult<Option<String>>;

    fn frontier_status(&self, url: &str) -> StorageResult<Option<FrontierStatus>>;

    /// Moves a URL from `from` to `to`
    fn frontier_transition(
        &mut self,
        url: &str,
        from: FrontierStatus,
        to: FrontierStatus,
    ) -> StorageResult<bool>;

    /// Resets every in_progress URL to pending, returning how many changed
    fn frontier_reset_in_progress(&mut self) -> StorageResult<usize>;

    fn frontier_counts(&self) -> StorageResult<FrontierCounts>;

    /// Removes frontier, entities and assignments
    fn clear_state(&mut self) -> StorageResult<()>;

    // ===== Entities =====

    /// Persists a fetched entity; an entity with the same key is kept
    fn save_entity(&mut self, entity: &Entity) -> StorageResult<()>;

    /// Loads entities in the order they were first saved
    fn load_entities(&self) -> StorageResult<Vec<Entity>>;

    fn count_entities(&self) -> StorageResult<u64>;

    // ===== Assignments =====

    fn save_assignment(&mut self, assigned: &AssignedId) -> StorageResult<()>;

    /// Records the `has_subclassification` flip of a diagnosis
    fn mark_subclassified(&mut self, diagnosis_id: u32) -> StorageResult<()>;

    fn load_assignments(&self) -> StorageResult<Vec<AssignedId>>;

    fn count_assignments(&self) -> StorageResult<HashMap<Classification, u64>>;
}
