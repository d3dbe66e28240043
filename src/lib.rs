//! Listing Archiver: a resumable image backup for marketplace listings
//!
//! This crate walks a seller's listings through the eBay Trading API in
//! month-sized windows, records every (item, image URL) pair in an
//! append-only ledger and downloads each image exactly once. A token manager
//! keeps the short-lived OAuth access token valid for the whole crawl.

pub mod auth;
pub mod config;
pub mod crawler;
pub mod download;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Listing Archiver operations
#[derive(Debug, Error)]
pub enum ArchiverError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Credential error: {0}")]
    Credential(#[from] auth::CredentialError),

    #[error("Storage error: {0}")]
    StorageError(#[from] storage::StorageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Ledger error: {0}")]
    Ledger(#[from] output::LedgerError),

    #[error("Listing API error: {0}")]
    Fetch(crawler::FetchError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<crawler::FetchError> for ArchiverError {
    fn from(err: crawler::FetchError) -> Self {
        match err {
            crawler::FetchError::Credential(e) => Self::Credential(e),
            other => Self::Fetch(other),
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid date in config: {0}")]
    InvalidDate(String),
}

/// Result type alias for Listing Archiver operations
pub type Result<T> = std::result::Result<T, ArchiverError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use auth::{RefreshCredential, Token, TokenManager};
pub use config::Config;
pub use crawler::{plan_windows, CrawlEngine, CrawlWindow, PassKind};
pub use download::{DownloadManager, DownloadOutcome};
pub use state::SeenSet;
