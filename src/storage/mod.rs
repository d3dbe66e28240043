//! Storage module for persisting archiver state
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Token persistence (the access token and any rotated refresh token)
//! - Run tracking with per-run counters

mod memory;
mod schema;
mod sqlite;
mod traits;

pub use memory::MemoryTokenStore;
pub use sqlite::{init_database, SqliteStorage};
pub use traits::{Storage, StorageError, StorageResult, TokenStore};

use crate::auth::Token;
use crate::ArchiverError;

use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(ArchiverError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, ArchiverError> {
    SqliteStorage::new(path)
}

/// Token material as persisted between runs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredTokens {
    /// Last access token obtained, fresh or not
    pub access: Option<Token>,

    /// Refresh token returned by the provider, when it rotated one
    pub refresh_token: Option<String>,
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub totals: RunTotals,
}

/// Counters stored with a finished run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTotals {
    pub unique_items: u64,
    pub ledger_rows: u64,
    pub images_downloaded: u64,
    pub download_failures: u64,
    pub windows_failed: u64,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
