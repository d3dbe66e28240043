//! Output module for the crawl's durable records
//!
//! This module handles:
//! - The append-only CSV ledger of (item, image URL) pairs
//! - Run statistics and their console summary

mod ledger;
pub mod stats;

pub use ledger::{load_seen, read_ledger, LedgerError, LedgerRecord, LedgerWriter, LEDGER_HEADER};
pub use stats::{print_run_history, print_statistics, CrawlStatistics};
