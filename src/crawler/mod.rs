//! Crawler module for walking the listing API
//!
//! This module contains the core crawling logic, including:
//! - Month-aligned window planning for the windowed passes
//! - The Trading API client and its auth-retry protocol
//! - XML response parsing
//! - Overall crawl coordination

mod coordinator;
mod fetcher;
mod parser;
mod planner;

pub use coordinator::{plan_passes, CrawlEngine, CrawlOptions};
pub use fetcher::{build_http_client, FetchError, ListingClient, ListingRequest, SellingList};
pub use parser::{parse_response, Ack, ApiErrorDetail, ListingItem, ParseError, ParsedResponse};
pub use planner::{clamp_to, plan_windows, CrawlWindow, PassKind};
