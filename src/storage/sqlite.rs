//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the `Storage` and
//! `TokenStore` traits.

use crate::auth::Token;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult, TokenStore};
use crate::storage::{RunRecord, RunStatus, RunTotals, StoredTokens};
use crate::ArchiverError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const RUN_COLUMNS: &str = "id, started_at, finished_at, config_hash, status, \
     unique_items, ledger_rows, images_downloaded, download_failures, windows_failed";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// Missing parent directories are created.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(ArchiverError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, ArchiverError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = init_database(path)?;
        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, ArchiverError> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Running),
        totals: RunTotals {
            unique_items: row.get::<_, i64>(5)? as u64,
            ledger_rows: row.get::<_, i64>(6)? as u64,
            images_downloaded: row.get::<_, i64>(7)? as u64,
            download_failures: row.get::<_, i64>(8)? as u64,
            windows_failed: row.get::<_, i64>(9)? as u64,
        },
    })
}

impl Storage for SqliteStorage {
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS))?;

        stmt.query_row(params![run_id], run_from_row)
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM runs ORDER BY id DESC LIMIT 1",
            RUN_COLUMNS
        ))?;

        Ok(stmt.query_row([], run_from_row).optional()?)
    }

    fn list_runs(&self, limit: usize) -> StorageResult<Vec<RunRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM runs ORDER BY id DESC LIMIT ?1",
            RUN_COLUMNS
        ))?;

        let runs = stmt
            .query_map(params![limit as i64], run_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        totals: &RunTotals,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, unique_items = ?3, ledger_rows = ?4,
                images_downloaded = ?5, download_failures = ?6, windows_failed = ?7
             WHERE id = ?8",
            params![
                status.to_db_string(),
                now,
                totals.unique_items as i64,
                totals.ledger_rows as i64,
                totals.images_downloaded as i64,
                totals.download_failures as i64,
                totals.windows_failed as i64,
                run_id
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }
}

impl TokenStore for SqliteStorage {
    fn load_tokens(&self) -> StorageResult<StoredTokens> {
        let row = self
            .conn
            .query_row(
                "SELECT access_token, obtained_at, expires_in, refresh_token FROM tokens WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<i64>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((access_token, obtained_at, expires_in, refresh_token)) = row else {
            return Ok(StoredTokens::default());
        };

        let access = match (access_token, obtained_at, expires_in) {
            (Some(value), Some(obtained_at), Some(expires_in)) => {
                let obtained_at = DateTime::parse_from_rfc3339(&obtained_at)
                    .map_err(|e| StorageError::CorruptToken(format!("obtained_at: {}", e)))?
                    .with_timezone(&Utc);
                Some(Token::new(value, obtained_at, expires_in))
            }
            _ => None,
        };

        Ok(StoredTokens {
            access,
            refresh_token,
        })
    }

    fn save_tokens(&mut self, tokens: &StoredTokens) -> StorageResult<()> {
        let (access_token, obtained_at, expires_in) = match &tokens.access {
            Some(token) => (
                Some(token.value.as_str()),
                Some(token.obtained_at.to_rfc3339()),
                Some(token.expires_in_secs),
            ),
            None => (None, None, None),
        };

        self.conn.execute(
            "INSERT INTO tokens (id, access_token, obtained_at, expires_in, refresh_token, updated_at)
             VALUES (1, ?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                access_token = excluded.access_token,
                obtained_at = excluded.obtained_at,
                expires_in = excluded.expires_in,
                refresh_token = excluded.refresh_token,
                updated_at = excluded.updated_at",
            params![
                access_token,
                obtained_at,
                expires_in,
                tokens.refresh_token,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }
}

/// Initializes a database connection with the schema
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(Connection)` - Successfully opened/created database
/// * `Err(rusqlite::Error)` - Failed to open database
pub fn init_database(path: &Path) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open(path)?;

    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
    ",
    )?;

    initialize_schema(&conn)?;

    Ok(conn)
}
