//! Storage traits and error types
//!
//! This module defines the trait interfaces for storage backends and
//! associated error types.

use crate::storage::{RunRecord, RunStatus, RunTotals, StoredTokens};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Stored token is corrupt: {0}")]
    CorruptToken(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Persistence for token material
///
/// The token manager owns its store exclusively, so implementations only
/// need to be `Send`.
pub trait TokenStore: Send {
    /// Loads whatever token material was saved last
    ///
    /// An empty store yields `StoredTokens::default()`, not an error.
    fn load_tokens(&self) -> StorageResult<StoredTokens>;

    /// Replaces the saved token material
    fn save_tokens(&mut self, tokens: &StoredTokens) -> StorageResult<()>;
}

/// Run bookkeeping
pub trait Storage {
    /// Creates a new crawl run
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Lists the most recent runs, newest first
    fn list_runs(&self, limit: usize) -> StorageResult<Vec<RunRecord>>;

    /// Marks a run finished with its final status and counters
    fn finish_run(&mut self, run_id: i64, status: RunStatus, totals: &RunTotals)
        -> StorageResult<()>;
}
