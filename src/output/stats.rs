//! Run statistics
//!
//! This module holds the counters a crawl accumulates and prints them, along
//! with the run history kept in the database.

use crate::storage::{RunRecord, RunTotals};

/// Counters accumulated over one crawl
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlStatistics {
    /// Items in the seen set at the end of the run, including restored ones
    pub unique_items: u64,

    /// Items that produced new rows (or were new) during this run
    pub items_recorded: u64,

    /// Rows appended to the ledger during this run
    pub ledger_rows: u64,

    pub images_downloaded: u64,
    pub images_already_present: u64,
    pub download_failures: u64,

    /// Windows abandoned after a request-level failure
    pub windows_failed: u64,

    /// Listing pages fetched successfully
    pub pages_fetched: u64,

    /// Requests retried after a token rejection
    pub auth_retries: u64,

    /// `GetItem` calls made for items listed without pictures
    pub item_lookups: u64,
}

impl CrawlStatistics {
    /// Counters persisted with the run record
    pub fn to_run_totals(&self) -> RunTotals {
        RunTotals {
            unique_items: self.unique_items,
            ledger_rows: self.ledger_rows,
            images_downloaded: self.images_downloaded,
            download_failures: self.download_failures,
            windows_failed: self.windows_failed,
        }
    }
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Listings:");
    println!("  Unique items: {}", stats.unique_items);
    println!("  Items recorded this run: {}", stats.items_recorded);
    println!("  Ledger rows appended: {}", stats.ledger_rows);
    println!("  Pages fetched: {}", stats.pages_fetched);
    println!("  Windows failed: {}", stats.windows_failed);
    println!("  Auth retries: {}", stats.auth_retries);
    println!("  Item lookups: {}", stats.item_lookups);
    println!();

    println!("Images:");
    println!("  Downloaded: {}", stats.images_downloaded);
    println!("  Already present: {}", stats.images_already_present);
    println!("  Failed: {}", stats.download_failures);
}

/// Prints the run history, newest first
pub fn print_run_history(runs: &[RunRecord]) {
    println!("=== Run History ===\n");

    if runs.is_empty() {
        println!("No runs recorded.");
        return;
    }

    for run in runs {
        println!(
            "Run {} [{}] started {}",
            run.id,
            run.status.to_db_string(),
            run.started_at
        );
        if let Some(finished) = &run.finished_at {
            println!("  Finished: {}", finished);
        }
        println!(
            "  Items: {}  Rows: {}  Downloaded: {}  Failed downloads: {}  Failed windows: {}",
            run.totals.unique_items,
            run.totals.ledger_rows,
            run.totals.images_downloaded,
            run.totals.download_failures,
            run.totals.windows_failed
        );
    }
}
