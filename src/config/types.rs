use crate::crawler::PassKind;
use crate::ConfigError;
use chrono::NaiveDate;
use serde::Deserialize;

/// Production Trading API endpoint
pub const DEFAULT_TRADING_ENDPOINT: &str = "https://api.ebay.com/ws/api.dll";

/// Production OAuth token endpoint
pub const DEFAULT_TOKEN_ENDPOINT: &str = "https://api.ebay.com/identity/v1/oauth2/token";

/// Production user consent page
pub const DEFAULT_CONSENT_ENDPOINT: &str = "https://auth.ebay.com/oauth2/authorize";

/// Scopes requested on consent and refresh unless the config overrides them
pub const DEFAULT_SCOPES: &[&str] = &[
    "https://api.ebay.com/oauth/api_scope",
    "https://api.ebay.com/oauth/api_scope/sell.inventory.readonly",
    "https://api.ebay.com/oauth/api_scope/sell.inventory",
    "https://api.ebay.com/oauth/api_scope/sell.marketing.readonly",
    "https://api.ebay.com/oauth/api_scope/sell.marketing",
    "https://api.ebay.com/oauth/api_scope/sell.account.readonly",
    "https://api.ebay.com/oauth/api_scope/sell.account",
    "https://api.ebay.com/oauth/api_scope/sell.fulfillment.readonly",
    "https://api.ebay.com/oauth/api_scope/sell.fulfillment",
];

/// Main configuration structure for Listing Archiver
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    pub credentials: CredentialsConfig,
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub token: TokenConfig,
}

/// Listing API and identity endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// XML-over-HTTP endpoint of the Trading API
    #[serde(rename = "trading-endpoint", default = "default_trading_endpoint")]
    pub trading_endpoint: String,

    /// OAuth token endpoint used for refresh and code exchange
    #[serde(rename = "token-endpoint", default = "default_token_endpoint")]
    pub token_endpoint: String,

    /// User consent page for the authorization-code flow
    #[serde(rename = "consent-endpoint", default = "default_consent_endpoint")]
    pub consent_endpoint: String,

    #[serde(rename = "site-id", default)]
    pub site_id: u32,

    #[serde(rename = "compatibility-level", default = "default_compatibility_level")]
    pub compatibility_level: u32,

    /// Page size for listing calls (provider maximum is 200)
    #[serde(rename = "entries-per-page", default = "default_entries_per_page")]
    pub entries_per_page: u32,

    /// Timeout for a single API call (seconds)
    #[serde(rename = "timeout-secs", default = "default_api_timeout")]
    pub timeout_secs: u64,
}

/// Application keys and the long-lived refresh token
#[derive(Clone, Deserialize)]
pub struct CredentialsConfig {
    #[serde(rename = "client-id")]
    pub client_id: String,

    #[serde(rename = "client-secret")]
    pub client_secret: String,

    /// Redirect URI (RuName) registered with the provider
    #[serde(rename = "redirect-uri")]
    pub redirect_uri: String,

    /// Optional when the token store already holds a refresh token
    #[serde(rename = "refresh-token", default)]
    pub refresh_token: Option<String>,

    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
}

impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Crawl range and pass selection
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlConfig {
    /// First day of the crawl range (YYYY-MM-DD, UTC)
    #[serde(rename = "start-date")]
    pub start_date: String,

    /// Last day of the crawl range; today (UTC) when omitted
    #[serde(rename = "end-date", default)]
    pub end_date: Option<String>,

    /// Run the unbounded scan across all selling lists before the windowed passes
    #[serde(rename = "initial-scan", default = "default_true")]
    pub initial_scan: bool,

    /// Windowed passes, in the order they run
    #[serde(default = "default_passes")]
    pub passes: Vec<PassKind>,

    /// Delay between two listing page requests (milliseconds)
    #[serde(rename = "page-delay-ms", default = "default_page_delay")]
    pub page_delay_ms: u64,

    /// Check the cached token against the API before crawling
    #[serde(rename = "validate-token", default = "default_true")]
    pub validate_token: bool,
}

/// Image download behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Root directory for downloaded images
    #[serde(rename = "images-dir", default = "default_images_dir")]
    pub images_dir: String,

    /// Attempts per image before it is reported as failed
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Linear backoff unit: attempt N waits N times this (milliseconds)
    #[serde(rename = "base-delay-ms", default = "default_base_delay")]
    pub base_delay_ms: u64,

    #[serde(rename = "timeout-secs", default = "default_download_timeout")]
    pub timeout_secs: u64,

    /// Delay after each download (milliseconds)
    #[serde(rename = "delay-ms", default = "default_download_delay")]
    pub delay_ms: u64,

    /// Maximum downloads in flight
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
}

/// Output locations
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database holding tokens and run records
    #[serde(rename = "database-path", default = "default_database_path")]
    pub database_path: String,

    /// Path to the append-only CSV ledger
    #[serde(rename = "ledger-path", default = "default_ledger_path")]
    pub ledger_path: String,
}

/// Access token bookkeeping
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    /// Refresh this many seconds before the computed expiry
    #[serde(rename = "leeway-secs", default = "default_leeway")]
    pub leeway_secs: u64,
}

impl CrawlConfig {
    /// Parses the configured start date
    pub fn start(&self) -> Result<NaiveDate, ConfigError> {
        parse_date(&self.start_date)
    }

    /// Parses the configured end date, falling back to `today`
    pub fn end(&self, today: NaiveDate) -> Result<NaiveDate, ConfigError> {
        match &self.end_date {
            Some(date) => parse_date(date),
            None => Ok(today),
        }
    }
}

/// Parses a `YYYY-MM-DD` calendar date
pub(crate) fn parse_date(value: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| ConfigError::InvalidDate(format!("'{}': {}", value, e)))
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            trading_endpoint: default_trading_endpoint(),
            token_endpoint: default_token_endpoint(),
            consent_endpoint: default_consent_endpoint(),
            site_id: 0,
            compatibility_level: default_compatibility_level(),
            entries_per_page: default_entries_per_page(),
            timeout_secs: default_api_timeout(),
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            images_dir: default_images_dir(),
            retries: default_retries(),
            base_delay_ms: default_base_delay(),
            timeout_secs: default_download_timeout(),
            delay_ms: default_download_delay(),
            concurrency: default_concurrency(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            ledger_path: default_ledger_path(),
        }
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            leeway_secs: default_leeway(),
        }
    }
}

fn default_trading_endpoint() -> String {
    DEFAULT_TRADING_ENDPOINT.to_string()
}

fn default_token_endpoint() -> String {
    DEFAULT_TOKEN_ENDPOINT.to_string()
}

fn default_consent_endpoint() -> String {
    DEFAULT_CONSENT_ENDPOINT.to_string()
}

fn default_compatibility_level() -> u32 {
    967
}

fn default_entries_per_page() -> u32 {
    100
}

fn default_api_timeout() -> u64 {
    90
}

fn default_scopes() -> Vec<String> {
    DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()
}

fn default_true() -> bool {
    true
}

fn default_passes() -> Vec<PassKind> {
    PassKind::WINDOWED.to_vec()
}

fn default_page_delay() -> u64 {
    600
}

fn default_images_dir() -> String {
    "out/images".to_string()
}

fn default_retries() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    1200
}

fn default_download_timeout() -> u64 {
    30
}

fn default_download_delay() -> u64 {
    200
}

fn default_concurrency() -> u32 {
    1
}

fn default_database_path() -> String {
    "out/archiver.db".to_string()
}

fn default_ledger_path() -> String {
    "out/image_urls.csv".to_string()
}

fn default_leeway() -> u64 {
    60
}
