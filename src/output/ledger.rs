//! Append-only CSV ledger of recorded image URLs
//!
//! One row per (item, image URL) pair. The header is written only when the
//! file is created, so successive runs keep appending to the same ledger.

use crate::crawler::CrawlWindow;
use crate::state::SeenSet;
use csv::WriterBuilder;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Column names, in file order
pub const LEDGER_HEADER: [&str; 6] = [
    "item_id",
    "sku",
    "image_url",
    "source",
    "window_start",
    "window_end",
];

/// Errors raised while reading or writing the ledger
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Ledger CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Ledger {path} has an unexpected header: {found}")]
    BadHeader { path: PathBuf, found: String },
}

/// One ledger row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub item_id: String,
    pub sku: String,
    pub image_url: String,

    /// Name of the pass that first produced the pair
    pub source: String,
    pub window_start: String,
    pub window_end: String,
}

impl LedgerRecord {
    pub fn new(item_id: &str, sku: Option<&str>, image_url: &str, window: &CrawlWindow) -> Self {
        Self {
            item_id: item_id.to_string(),
            sku: sku.unwrap_or("").to_string(),
            image_url: image_url.to_string(),
            source: window.kind.as_str().to_string(),
            window_start: window.from_iso(),
            window_end: window.to_iso(),
        }
    }
}

/// Writer appending to the ledger file
pub struct LedgerWriter {
    path: PathBuf,
    writer: csv::Writer<File>,
    rows_written: u64,
}

impl LedgerWriter {
    /// Opens the ledger for appending, creating it with a header if missing
    ///
    /// # Arguments
    ///
    /// * `path` - Ledger file path; parent directories are created
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        let io_err = |source| LedgerError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        let is_new = std::fs::metadata(path)
            .map(|meta| meta.len() == 0)
            .unwrap_or(true);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(io_err)?;

        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        if is_new {
            debug!(path = %path.display(), "Creating ledger");
            writer.write_record(LEDGER_HEADER)?;
            writer.flush().map_err(io_err)?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            rows_written: 0,
        })
    }

    /// Appends rows and flushes them to disk
    pub fn append(&mut self, records: &[LedgerRecord]) -> Result<(), LedgerError> {
        if records.is_empty() {
            return Ok(());
        }

        for record in records {
            self.writer.serialize(record)?;
        }
        self.writer.flush().map_err(|source| LedgerError::Io {
            path: self.path.clone(),
            source,
        })?;

        self.rows_written += records.len() as u64;
        Ok(())
    }

    /// Rows appended through this writer
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Reads every row of an existing ledger
///
/// A missing file reads as empty.
pub fn read_ledger(path: &Path) -> Result<Vec<LedgerRecord>, LedgerError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    if headers.iter().ne(LEDGER_HEADER.iter().copied()) {
        return Err(LedgerError::BadHeader {
            path: path.to_path_buf(),
            found: headers.iter().collect::<Vec<_>>().join(","),
        });
    }

    let mut records = Vec::new();
    for row in reader.deserialize() {
        records.push(row?);
    }
    Ok(records)
}

/// Rebuilds the seen set from a previous run's ledger
///
/// Rows are replayed in file order, so every item keeps the label and image
/// ordinals it had when its files were first named.
pub fn load_seen(path: &Path) -> Result<SeenSet, LedgerError> {
    let mut seen = SeenSet::new();
    for record in read_ledger(path)? {
        let sku = Some(record.sku.as_str()).filter(|s| !s.is_empty());
        seen.record(&record.item_id, sku, std::slice::from_ref(&record.image_url));
    }
    Ok(seen)
}
