//! Crawl engine - main crawl orchestration logic
//!
//! This module drives the passes over the listing API:
//! - The optional unbounded scan over the seller's selling lists
//! - The windowed passes, one month-sized window at a time
//! - Paging within a window, trusting the reported page count
//! - Picture lookups through `GetItem` for selling-list items that omit them
//! - Deduplication through the seen set, ledger appends and image downloads
//!
//! A request-level failure abandons the current window only. Only credential
//! failures (and a ledger that cannot be written) stop the run.
//!
//! The first time an item shows up in a run, every image already recorded for
//! it is queued again. Downloads of files already on disk return at once, and
//! images that an earlier run failed to fetch (or never reached before an
//! interrupt) are retried.

use crate::config::CrawlConfig;
use crate::crawler::fetcher::{FetchError, ListingClient, SellingList};
use crate::crawler::parser::{ListingItem, ParsedResponse};
use crate::crawler::planner::{clamp_to, plan_windows, CrawlWindow, PassKind};
use crate::download::{DownloadManager, DownloadOutcome, DownloadTarget};
use crate::output::{CrawlStatistics, LedgerRecord, LedgerWriter};
use crate::state::{RecordOutcome, SeenSet};
use crate::{ArchiverError, ConfigError};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What a crawl covers and how fast it goes
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Run the unbounded scan before the windowed passes
    pub initial_scan: bool,

    /// Windowed passes, in order
    pub passes: Vec<PassKind>,
    pub start: NaiveDate,
    pub end: NaiveDate,

    /// Pause after every listing page
    pub page_delay: Duration,

    /// Check the token before the first page
    pub validate_token: bool,
}

impl CrawlOptions {
    /// Resolves the `[crawl]` table, using `today` when no end date is set
    pub fn from_config(config: &CrawlConfig, today: NaiveDate) -> Result<Self, ConfigError> {
        Ok(Self {
            initial_scan: config.initial_scan,
            passes: config.passes.clone(),
            start: config.start()?,
            end: config.end(today)?,
            page_delay: Duration::from_millis(config.page_delay_ms),
            validate_token: config.validate_token,
        })
    }
}

/// Every window the crawl will request, per pass, in execution order
///
/// The unbounded scan appears as a single nominal window spanning the range.
pub fn plan_passes(options: &CrawlOptions, now: DateTime<Utc>) -> Vec<(PassKind, Vec<CrawlWindow>)> {
    let mut plan = Vec::new();

    if options.initial_scan {
        plan.push((PassKind::Unbounded, vec![unbounded_window(options, now)]));
    }

    for kind in &options.passes {
        let windows = clamp_to(plan_windows(*kind, options.start, options.end), now);
        plan.push((*kind, windows));
    }

    plan
}

fn unbounded_window(options: &CrawlOptions, now: DateTime<Utc>) -> CrawlWindow {
    let from = options
        .start
        .and_hms_opt(0, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .unwrap_or(now);
    CrawlWindow::unbounded(from, now)
}

/// Where a page of listings comes from
#[derive(Debug, Clone, Copy)]
enum PageSource {
    Window(CrawlWindow),
    Selling(SellingList),
}

impl fmt::Display for PageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Window(window) => write!(f, "{}", window),
            Self::Selling(list) => write!(f, "Unbounded {}", list),
        }
    }
}

/// Walks every pass and window, recording and downloading new images
pub struct CrawlEngine {
    client: ListingClient,
    downloads: Option<DownloadManager>,
    ledger: LedgerWriter,
    seen: SeenSet,
    options: CrawlOptions,
    stats: CrawlStatistics,

    /// Items whose recorded images were already queued during this run
    queued: HashSet<String>,
}

impl CrawlEngine {
    /// Creates an engine
    ///
    /// # Arguments
    ///
    /// * `client` - Listing API client, bound to the token manager
    /// * `downloads` - Download manager, or `None` to only record URLs
    /// * `ledger` - Ledger opened for appending
    /// * `seen` - Seen set, empty or restored from the ledger
    /// * `options` - Range, passes and pacing
    pub fn new(
        client: ListingClient,
        downloads: Option<DownloadManager>,
        ledger: LedgerWriter,
        seen: SeenSet,
        options: CrawlOptions,
    ) -> Self {
        Self {
            client,
            downloads,
            ledger,
            seen,
            options,
            stats: CrawlStatistics::default(),
            queued: HashSet::new(),
        }
    }

    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }

    pub fn statistics(&self) -> &CrawlStatistics {
        &self.stats
    }

    /// Runs every configured pass to completion
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlStatistics)` - All passes ran; some windows may have failed
    /// * `Err(ArchiverError)` - Credentials failed or the ledger could not be
    ///   written
    pub async fn run(&mut self) -> Result<CrawlStatistics, ArchiverError> {
        let now = Utc::now();
        info!(
            start = %self.options.start,
            end = %self.options.end,
            restored_items = self.seen.len(),
            "Starting crawl"
        );

        if self.options.validate_token {
            let client = &self.client;
            let valid = client
                .tokens()
                .validate(|token| async move { client.probe(&token).await })
                .await?;
            if !valid {
                info!("Access token failed validation and will be refreshed");
            }
        }

        for (kind, windows) in plan_passes(&self.options, now) {
            info!(pass = %kind, windows = windows.len(), "Starting pass");

            for window in windows {
                if kind == PassKind::Unbounded {
                    for list in SellingList::ALL {
                        self.crawl_source(PageSource::Selling(list), &window).await?;
                    }
                } else {
                    self.crawl_source(PageSource::Window(window), &window).await?;
                }
            }

            info!(
                pass = %kind,
                unique_items = self.seen.len(),
                "Pass complete"
            );
        }

        self.stats.unique_items = self.seen.len() as u64;
        self.stats.auth_retries = self.client.auth_retries();

        info!(
            unique_items = self.stats.unique_items,
            ledger = %self.ledger.path().display(),
            ledger_rows = self.ledger.rows_written(),
            windows_failed = self.stats.windows_failed,
            "Crawl complete"
        );
        Ok(self.stats.clone())
    }

    /// Pages through one window or selling list
    ///
    /// `window` is what the ledger records as the rows' origin.
    async fn crawl_source(
        &mut self,
        source: PageSource,
        window: &CrawlWindow,
    ) -> Result<(), ArchiverError> {
        let mut page: u32 = 1;

        loop {
            let parsed = match self.fetch_page(source, page).await {
                Ok(parsed) => parsed,
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    warn!(source = %source, page, error = %e, "Abandoning window");
                    self.stats.windows_failed += 1;
                    return Ok(());
                }
            };

            // A missing or malformed page count means this is the last page
            let total = parsed.total_pages.unwrap_or(page);
            self.stats.pages_fetched += 1;

            let mut items = parsed.items;
            if let PageSource::Selling(_) = source {
                self.complete_pictures(&mut items).await?;
            }

            let (recorded, rows) = self.process_items(&items, window).await?;
            info!(
                source = %source,
                page,
                total,
                items = items.len(),
                recorded,
                rows,
                "Page processed"
            );

            if !self.options.page_delay.is_zero() {
                tokio::time::sleep(self.options.page_delay).await;
            }

            if page >= total {
                return Ok(());
            }
            page += 1;
        }
    }

    async fn fetch_page(&self, source: PageSource, page: u32) -> Result<ParsedResponse, FetchError> {
        match source {
            PageSource::Window(window) => self.client.seller_list_page(&window, page).await,
            PageSource::Selling(list) => self.client.selling_page(list, page).await,
        }
    }

    /// Fetches pictures through `GetItem` for items listed without any
    ///
    /// Selling lists often carry only the item id. Items that already have
    /// recorded images are not looked up again.
    async fn complete_pictures(&mut self, items: &mut [ListingItem]) -> Result<(), ArchiverError> {
        for item in items.iter_mut() {
            let id = item.id.trim().to_string();
            if id.is_empty() || !item.image_urls.is_empty() || self.seen.image_count(&id) > 0 {
                continue;
            }

            match self.client.item_details(&id).await {
                Ok(details) => {
                    self.stats.item_lookups += 1;
                    if let Some(full) = details.items.into_iter().find(|d| d.id.trim() == id) {
                        debug!(item_id = %id, images = full.image_urls.len(), "Resolved pictures");
                        item.image_urls = full.image_urls;
                        if item.sku.is_none() {
                            item.sku = full.sku;
                        }
                    }
                }
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    warn!(item_id = %id, error = %e, "Item lookup failed, recording without pictures");
                }
            }

            if !self.options.page_delay.is_zero() {
                tokio::time::sleep(self.options.page_delay).await;
            }
        }
        Ok(())
    }

    /// Records a page's items and downloads their images
    ///
    /// Seen-set and ledger updates happen here, in order, before any
    /// download is dispatched.
    ///
    /// # Returns
    ///
    /// The number of items recorded and ledger rows appended
    async fn process_items(
        &mut self,
        items: &[ListingItem],
        window: &CrawlWindow,
    ) -> Result<(u64, u64), ArchiverError> {
        let mut recorded = 0u64;
        let mut rows = Vec::new();
        let mut targets: Vec<DownloadTarget> = Vec::new();

        for item in items {
            let id = item.id.trim();
            if id.is_empty() {
                debug!("Skipping item without an id");
                continue;
            }

            let outcome = self.seen.record(id, item.sku.as_deref(), &item.image_urls);
            let new_images = match outcome {
                RecordOutcome::Skipped => Vec::new(),
                RecordOutcome::Recorded { new_images, .. } => {
                    recorded += 1;
                    for image in &new_images {
                        rows.push(LedgerRecord::new(id, item.sku.as_deref(), &image.url, window));
                    }
                    new_images
                }
            };

            let Some(downloads) = &self.downloads else {
                continue;
            };
            let images = if self.queued.insert(id.to_string()) {
                self.seen.recorded_images(id)
            } else {
                new_images
            };
            let label = self.seen.label(id).unwrap_or(id);
            for image in images {
                targets.push(downloads.target(label, image.ordinal, &image.url));
            }
        }

        self.ledger.append(&rows)?;
        self.stats.items_recorded += recorded;
        self.stats.ledger_rows += rows.len() as u64;

        if let Some(downloads) = &self.downloads {
            for (target, outcome) in downloads.fetch_all(targets).await {
                match outcome {
                    DownloadOutcome::Downloaded { .. } => self.stats.images_downloaded += 1,
                    DownloadOutcome::AlreadyPresent => self.stats.images_already_present += 1,
                    DownloadOutcome::Failed { .. } => {
                        debug!(url = %target.url, "Counting failed download");
                        self.stats.download_failures += 1;
                    }
                }
            }
        }

        Ok((recorded, rows.len() as u64))
    }
}
