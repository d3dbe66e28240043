use crate::config::types::{
    parse_date, ApiConfig, Config, CrawlConfig, CredentialsConfig, DownloadConfig, OutputConfig,
    TokenConfig,
};
use crate::crawler::PassKind;
use crate::ConfigError;
use url::Url;

/// Provider maximum for `EntriesPerPage`
const MAX_ENTRIES_PER_PAGE: u32 = 200;

/// Smallest leeway accepted before the computed token expiry
const MIN_LEEWAY_SECS: u64 = 60;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_api_config(&config.api)?;
    validate_credentials(&config.credentials)?;
    validate_crawl_config(&config.crawl)?;
    validate_download_config(&config.download)?;
    validate_output_config(&config.output)?;
    validate_token_config(&config.token)?;
    Ok(())
}

/// Validates endpoints and paging
fn validate_api_config(config: &ApiConfig) -> Result<(), ConfigError> {
    validate_endpoint("trading-endpoint", &config.trading_endpoint)?;
    validate_endpoint("token-endpoint", &config.token_endpoint)?;
    validate_endpoint("consent-endpoint", &config.consent_endpoint)?;

    if config.entries_per_page < 1 || config.entries_per_page > MAX_ENTRIES_PER_PAGE {
        return Err(ConfigError::Validation(format!(
            "entries-per-page must be between 1 and {}, got {}",
            MAX_ENTRIES_PER_PAGE, config.entries_per_page
        )));
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "api timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates the application keys
fn validate_credentials(config: &CredentialsConfig) -> Result<(), ConfigError> {
    for (name, value) in [
        ("client-id", &config.client_id),
        ("client-secret", &config.client_secret),
        ("redirect-uri", &config.redirect_uri),
    ] {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation(format!("{} cannot be empty", name)));
        }
    }

    if matches!(&config.refresh_token, Some(token) if token.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "refresh-token cannot be empty when present".to_string(),
        ));
    }

    if config.scopes.is_empty() {
        return Err(ConfigError::Validation(
            "scopes must list at least one scope".to_string(),
        ));
    }

    Ok(())
}

/// Validates the crawl range and pass list
fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    let start = parse_date(&config.start_date)?;
    if let Some(end) = &config.end_date {
        let end = parse_date(end)?;
        if end < start {
            return Err(ConfigError::Validation(format!(
                "end-date {} is before start-date {}",
                end, start
            )));
        }
    }

    for (i, pass) in config.passes.iter().enumerate() {
        if *pass == PassKind::Unbounded {
            return Err(ConfigError::Validation(
                "passes may only list windowed passes; use initial-scan for the unbounded scan"
                    .to_string(),
            ));
        }
        if config.passes[..i].contains(pass) {
            return Err(ConfigError::Validation(format!(
                "pass '{}' is listed more than once",
                pass
            )));
        }
    }

    if config.passes.is_empty() && !config.initial_scan {
        return Err(ConfigError::Validation(
            "nothing to crawl: passes is empty and initial-scan is disabled".to_string(),
        ));
    }

    Ok(())
}

/// Validates download settings
fn validate_download_config(config: &DownloadConfig) -> Result<(), ConfigError> {
    if config.images_dir.is_empty() {
        return Err(ConfigError::Validation(
            "images-dir cannot be empty".to_string(),
        ));
    }

    if config.retries < 1 {
        return Err(ConfigError::Validation(format!(
            "download retries must be >= 1, got {}",
            config.retries
        )));
    }

    if config.concurrency < 1 || config.concurrency > 32 {
        return Err(ConfigError::Validation(format!(
            "download concurrency must be between 1 and 32, got {}",
            config.concurrency
        )));
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "download timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    if config.ledger_path.is_empty() {
        return Err(ConfigError::Validation(
            "ledger-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_token_config(config: &TokenConfig) -> Result<(), ConfigError> {
    if config.leeway_secs < MIN_LEEWAY_SECS {
        return Err(ConfigError::Validation(format!(
            "leeway-secs must be >= {}, got {}",
            MIN_LEEWAY_SECS, config.leeway_secs
        )));
    }
    Ok(())
}

/// Validates an HTTP(S) endpoint URL
fn validate_endpoint(name: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", name, value, e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            name, value
        )));
    }

    Ok(())
}
