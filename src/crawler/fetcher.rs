//! Trading API client
//!
//! This module handles all listing API requests, including:
//! - Building the HTTP client with the configured timeout
//! - Rendering `GetSellerList`, `GetMyeBaySelling`, `GetItem` and
//!   `GeteBayOfficialTime` request bodies
//! - The auth-retry protocol: one refresh and one retry per request when the
//!   token is rejected
//! - Error classification into fatal and window-level failures

use crate::auth::{CredentialError, TokenManager};
use crate::config::ApiConfig;
use crate::crawler::parser::{parse_response, ParseError, ParsedResponse};
use crate::crawler::planner::CrawlWindow;
use quick_xml::escape::escape;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

const XML_HEADER: &str = r#"<?xml version="1.0" encoding="utf-8"?>"#;
const EBAY_NAMESPACE: &str = "urn:ebay:apis:eBLBaseComponents";

/// Errors from a single listing request
#[derive(Debug, Error)]
pub enum FetchError {
    /// The token manager could not supply a token; aborts the run
    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {0}")]
    HttpStatus(u16),

    #[error("Unreadable response: {0}")]
    Parse(#[from] ParseError),

    #[error("{call} failed: {summary}")]
    Api { call: &'static str, summary: String },

    #[error("{call} rejected the token again after a refresh: {summary}")]
    TokenRejected { call: &'static str, summary: String },
}

impl FetchError {
    /// True when the whole run must stop
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Credential(_))
    }
}

/// Seller lists walked by the unbounded scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SellingList {
    Active,
    Sold,
    Unsold,
    DeletedFromSold,
    DeletedFromUnsold,
}

impl SellingList {
    pub const ALL: [SellingList; 5] = [
        SellingList::Active,
        SellingList::Sold,
        SellingList::Unsold,
        SellingList::DeletedFromSold,
        SellingList::DeletedFromUnsold,
    ];

    /// Container element name in the request and response
    pub fn element(&self) -> &'static str {
        match self {
            Self::Active => "ActiveList",
            Self::Sold => "SoldList",
            Self::Unsold => "UnsoldList",
            Self::DeletedFromSold => "DeletedFromSoldList",
            Self::DeletedFromUnsold => "DeletedFromUnsoldList",
        }
    }
}

impl fmt::Display for SellingList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.element())
    }
}

/// One listing API call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingRequest {
    /// A page of `GetSellerList` filtered by a window
    SellerList { window: CrawlWindow, page: u32 },

    /// A page of one `GetMyeBaySelling` list
    Selling { list: SellingList, page: u32 },

    /// `GetItem` for one listing, used when a selling list omits pictures
    Item { item_id: String },

    /// `GeteBayOfficialTime`, used to check a token
    OfficialTime,
}

impl ListingRequest {
    pub fn call_name(&self) -> &'static str {
        match self {
            Self::SellerList { .. } => "GetSellerList",
            Self::Selling { .. } => "GetMyeBaySelling",
            Self::Item { .. } => "GetItem",
            Self::OfficialTime => "GeteBayOfficialTime",
        }
    }

    /// Renders the XML request body
    pub fn to_xml(&self, entries_per_page: u32) -> String {
        let call = self.call_name();
        let inner = match self {
            Self::SellerList { window, page } => {
                let filter = match window.kind.filter_prefix() {
                    Some(prefix) => format!(
                        "  <{p}From>{from}</{p}From>\n  <{p}To>{to}</{p}To>\n",
                        p = prefix,
                        from = window.from_iso(),
                        to = window.to_iso()
                    ),
                    None => String::new(),
                };
                format!(
                    "  <DetailLevel>ReturnAll</DetailLevel>\n  \
                     <GranularityLevel>Fine</GranularityLevel>\n{}{}  \
                     <IncludeVariations>true</IncludeVariations>\n",
                    pagination("  ", entries_per_page, *page),
                    filter
                )
            }
            Self::Selling { list, page } => format!(
                "  <DetailLevel>ReturnAll</DetailLevel>\n  <{el}>\n    <Include>true</Include>\n{}  </{el}>\n",
                pagination("    ", entries_per_page, *page),
                el = list.element()
            ),
            Self::Item { item_id } => format!(
                "  <ItemID>{}</ItemID>\n  <IncludeItemSpecifics>false</IncludeItemSpecifics>\n  \
                 <DetailLevel>ReturnAll</DetailLevel>\n",
                escape(item_id.as_str())
            ),
            Self::OfficialTime => String::new(),
        };

        format!(
            "{}\n<{call}Request xmlns=\"{}\">\n{}</{call}Request>",
            XML_HEADER,
            EBAY_NAMESPACE,
            inner,
            call = call
        )
    }
}

fn pagination(indent: &str, entries_per_page: u32, page: u32) -> String {
    format!(
        "{i}<Pagination>\n{i}  <EntriesPerPage>{}</EntriesPerPage>\n{i}  <PageNumber>{}</PageNumber>\n{i}</Pagination>\n",
        entries_per_page,
        page,
        i = indent
    )
}

/// Builds an HTTP client for the listing API
///
/// # Arguments
///
/// * `config` - The `[api]` configuration table
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &ApiConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(concat!("listing-archiver/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Outcome of one HTTP exchange before the retry decision
enum Attempt {
    Done(ParsedResponse),
    TokenRejected(String),
}

/// Listing API client bound to a token manager
pub struct ListingClient {
    client: Client,
    endpoint: String,
    site_id: u32,
    compatibility_level: u32,
    entries_per_page: u32,
    tokens: Arc<TokenManager>,
    auth_retries: AtomicU64,
}

impl ListingClient {
    pub fn new(client: Client, config: &ApiConfig, tokens: Arc<TokenManager>) -> Self {
        Self {
            client,
            endpoint: config.trading_endpoint.clone(),
            site_id: config.site_id,
            compatibility_level: config.compatibility_level,
            entries_per_page: config.entries_per_page,
            tokens,
            auth_retries: AtomicU64::new(0),
        }
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// Requests retried after a token rejection so far
    pub fn auth_retries(&self) -> u64 {
        self.auth_retries.load(Ordering::Relaxed)
    }

    /// Issues a request under the auth-retry protocol
    ///
    /// # Request Flow
    ///
    /// 1. Send with the manager's current token
    /// 2. On HTTP 401, or `Ack=Failure` with a token error, report the token
    ///    invalid, fetch a fresh one and send the identical body once more
    /// 3. A second rejection is this request's terminal failure
    ///
    /// Any other non-success `Ack` is returned as [`FetchError::Api`].
    pub async fn call(&self, request: &ListingRequest) -> Result<ParsedResponse, FetchError> {
        let call = request.call_name();
        let body = request.to_xml(self.entries_per_page);

        let token = self.tokens.current_token().await?;
        let parsed = match self.send(call, &body, &token).await? {
            Attempt::Done(parsed) => parsed,
            Attempt::TokenRejected(reason) => {
                info!(call, reason = %reason, "Token rejected, refreshing and retrying once");
                self.tokens.mark_invalid(&token).await;
                self.auth_retries.fetch_add(1, Ordering::Relaxed);

                let token = self.tokens.current_token().await?;
                match self.send(call, &body, &token).await? {
                    Attempt::Done(parsed) => parsed,
                    Attempt::TokenRejected(summary) => {
                        return Err(FetchError::TokenRejected { call, summary })
                    }
                }
            }
        };

        if !parsed.ack.is_success() {
            return Err(FetchError::Api {
                call,
                summary: parsed.error_summary(),
            });
        }

        if !parsed.errors.is_empty() {
            debug!(call, warnings = %parsed.error_summary(), "Call succeeded with warnings");
        }
        Ok(parsed)
    }

    /// One page of `GetSellerList` for `window`
    pub async fn seller_list_page(
        &self,
        window: &CrawlWindow,
        page: u32,
    ) -> Result<ParsedResponse, FetchError> {
        self.call(&ListingRequest::SellerList {
            window: *window,
            page,
        })
        .await
    }

    /// One page of a `GetMyeBaySelling` list
    pub async fn selling_page(
        &self,
        list: SellingList,
        page: u32,
    ) -> Result<ParsedResponse, FetchError> {
        self.call(&ListingRequest::Selling { list, page }).await
    }

    /// Full details of one listing through `GetItem`
    pub async fn item_details(&self, item_id: &str) -> Result<ParsedResponse, FetchError> {
        self.call(&ListingRequest::Item {
            item_id: item_id.to_string(),
        })
        .await
    }

    /// Checks `token` with `GeteBayOfficialTime`, without any retry
    pub async fn probe(&self, token: &str) -> bool {
        let request = ListingRequest::OfficialTime;
        let body = request.to_xml(self.entries_per_page);

        match self.send(request.call_name(), &body, token).await {
            Ok(Attempt::Done(parsed)) => parsed.ack.is_success(),
            Ok(Attempt::TokenRejected(reason)) => {
                debug!(reason = %reason, "Token check rejected");
                false
            }
            Err(e) => {
                warn!(error = %e, "Token check failed");
                false
            }
        }
    }

    async fn send(&self, call: &'static str, body: &str, token: &str) -> Result<Attempt, FetchError> {
        debug!(call, endpoint = %self.endpoint, "Sending request");

        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "text/xml")
            .header("X-EBAY-API-CALL-NAME", call)
            .header("X-EBAY-API-SITEID", self.site_id.to_string())
            .header(
                "X-EBAY-API-COMPATIBILITY-LEVEL",
                self.compatibility_level.to_string(),
            )
            .header("X-EBAY-API-IAF-TOKEN", token)
            .body(body.to_string())
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Ok(Attempt::TokenRejected("HTTP 401".to_string()));
        }
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let text = response.text().await?;
        let parsed = parse_response(&text)?;
        if parsed.is_token_failure() {
            return Ok(Attempt::TokenRejected(parsed.error_summary()));
        }
        Ok(Attempt::Done(parsed))
    }
}
