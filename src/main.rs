//! Listing Archiver main entry point
//!
//! This is the command-line interface for the listing image backup.

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use listing_archiver::auth::{RefreshCredential, TokenEndpoint, TokenManager};
use listing_archiver::config::{load_config_with_hash, Config};
use listing_archiver::crawler::{
    build_http_client, plan_passes, CrawlEngine, CrawlOptions, ListingClient,
};
use listing_archiver::download::DownloadManager;
use listing_archiver::output::{
    load_seen, print_run_history, print_statistics, read_ledger, LedgerWriter,
};
use listing_archiver::state::SeenSet;
use listing_archiver::storage::{open_storage, RunRecord, RunStatus, Storage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Listing Archiver: resumable image backup for marketplace listings
///
/// Walks every listing of a seller account through the Trading API, records
/// each image URL once in a CSV ledger and downloads the images. The OAuth
/// access token is refreshed automatically during long crawls.
#[derive(Parser, Debug)]
#[command(name = "listing-archiver")]
#[command(version)]
#[command(about = "Resumable image backup for marketplace listings", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl all passes and download new images (default)
    Crawl {
        /// Ignore the existing ledger when deciding what is new
        #[arg(long)]
        fresh: bool,

        /// Skip the unbounded scan over the selling lists
        #[arg(long)]
        no_initial_scan: bool,

        /// Record image URLs without downloading them
        #[arg(long)]
        no_download: bool,
    },

    /// Print the consent URL that yields an authorization code
    ConsentUrl {
        /// Opaque value echoed back on the redirect
        #[arg(long, default_value = "listing-archiver")]
        state: String,
    },

    /// Exchange an authorization code for access and refresh tokens
    Exchange {
        /// Code copied from the redirect URL, percent-encoded or not
        code: String,
    },

    /// Force a token refresh
    Refresh,

    /// Check the current token against the API
    CheckToken,

    /// Validate config and show the windows a crawl would request
    DryRun,

    /// Show run history and ledger totals
    Stats,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let command = cli.command.unwrap_or(Command::Crawl {
        fresh: false,
        no_initial_scan: false,
        no_download: false,
    });

    match command {
        Command::Crawl {
            fresh,
            no_initial_scan,
            no_download,
        } => handle_crawl(config, &config_hash, fresh, no_initial_scan, no_download).await?,
        Command::ConsentUrl { state } => handle_consent_url(&config, &state)?,
        Command::Exchange { code } => handle_exchange(&config, &code).await?,
        Command::Refresh => handle_refresh(&config).await?,
        Command::CheckToken => handle_check_token(&config).await?,
        Command::DryRun => handle_dry_run(&config)?,
        Command::Stats => handle_stats(&config)?,
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("listing_archiver=info,warn"),
            1 => EnvFilter::new("listing_archiver=debug,info"),
            2 => EnvFilter::new("listing_archiver=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Builds the token manager over the SQLite token store
fn build_token_manager(config: &Config) -> anyhow::Result<TokenManager> {
    let store = open_storage(Path::new(&config.output.database_path))
        .context("Failed to open the token store")?;
    let endpoint =
        TokenEndpoint::from_config(&config.api).context("Failed to build the token client")?;

    Ok(TokenManager::new(
        endpoint,
        RefreshCredential::from_config(&config.credentials),
        config.credentials.scopes.clone(),
        config.token.leeway_secs,
        Box::new(store),
    ))
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: Config,
    config_hash: &str,
    fresh: bool,
    no_initial_scan: bool,
    no_download: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let database_path = Path::new(&config.output.database_path);
    let ledger_path = Path::new(&config.output.ledger_path);

    let mut storage = open_storage(database_path)?;
    if let Some(previous) = storage.get_latest_run()? {
        match previous.status {
            RunStatus::Completed => {}
            status if fresh => tracing::info!("Previous run {} ended {}", previous.id, status.to_db_string()),
            status => tracing::warn!(
                "Previous run {} ended {}; resuming from the ledger and retrying its downloads",
                previous.id,
                status.to_db_string()
            ),
        }
    }
    let run_id = storage.create_run(config_hash)?;
    tracing::info!("Starting run {}", run_id);

    let seen = if fresh {
        tracing::info!("Starting fresh (ignoring the existing ledger)");
        SeenSet::new()
    } else {
        let seen = load_seen(ledger_path)
            .with_context(|| format!("Failed to read ledger {}", ledger_path.display()))?;
        tracing::info!(
            "Restored {} items and {} image URLs from the ledger",
            seen.len(),
            seen.url_count()
        );
        seen
    };

    let tokens = Arc::new(build_token_manager(&config)?);
    let client = ListingClient::new(build_http_client(&config.api)?, &config.api, tokens);

    let downloads = if config.download.enabled && !no_download {
        Some(DownloadManager::from_config(&config.download)?)
    } else {
        tracing::info!("Downloads disabled; only recording image URLs");
        None
    };

    let mut options = CrawlOptions::from_config(&config.crawl, Utc::now().date_naive())?;
    if no_initial_scan {
        options.initial_scan = false;
    }

    let ledger = LedgerWriter::open(ledger_path)?;
    let mut engine = CrawlEngine::new(client, downloads, ledger, seen, options);

    let outcome = tokio::select! {
        result = engine.run() => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    match outcome {
        Some(Ok(stats)) => {
            storage.finish_run(run_id, RunStatus::Completed, &stats.to_run_totals())?;
            log_finished_run(&storage.get_run(run_id)?);
            print_statistics(&stats);
            Ok(())
        }
        Some(Err(e)) => {
            let totals = engine.statistics().to_run_totals();
            storage.finish_run(run_id, RunStatus::Failed, &totals)?;
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
        None => {
            let mut stats = engine.statistics().clone();
            stats.unique_items = engine.seen().len() as u64;
            storage.finish_run(run_id, RunStatus::Interrupted, &stats.to_run_totals())?;
            log_finished_run(&storage.get_run(run_id)?);
            tracing::warn!("Crawl interrupted; the ledger is complete up to the last page");
            print_statistics(&stats);
            Ok(())
        }
    }
}

fn log_finished_run(run: &RunRecord) {
    tracing::info!(
        "Run {} {} at {}",
        run.id,
        run.status.to_db_string(),
        run.finished_at.as_deref().unwrap_or("?")
    );
}

/// Prints the consent URL
fn handle_consent_url(config: &Config, state: &str) -> Result<(), Box<dyn std::error::Error>> {
    let endpoint = TokenEndpoint::from_config(&config.api)?;
    let credential = RefreshCredential::from_config(&config.credentials);
    let url = endpoint.consent_url(&credential, &config.credentials.scopes, state)?;

    println!("Open this URL, sign in and accept:\n");
    println!("{}\n", url);
    println!("Then run `exchange <CODE>` with the `code` parameter of the redirect URL.");
    Ok(())
}

/// Exchanges an authorization code and stores the tokens
async fn handle_exchange(config: &Config, code: &str) -> Result<(), Box<dyn std::error::Error>> {
    let manager = build_token_manager(config)?;
    let token = manager.exchange_code(code).await?;
    let status = manager.status().await?;

    println!("✓ Access token stored (expires {})", token.expires_at());
    if status.has_refresh_token {
        println!("✓ Refresh token available for unattended refreshes");
    } else {
        println!("! No refresh token available; crawls will stop when this token expires");
    }
    Ok(())
}

/// Forces a refresh and reports the new expiry
async fn handle_refresh(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let manager = build_token_manager(config)?;
    manager.refresh().await?;
    let status = manager.status().await?;

    match status.expires_at {
        Some(expires_at) => println!("✓ Access token refreshed (expires {})", expires_at),
        None => println!("✓ Access token refreshed"),
    }
    Ok(())
}

/// Checks the current token with a cheap authenticated call
async fn handle_check_token(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let tokens = Arc::new(build_token_manager(config)?);
    let client = ListingClient::new(build_http_client(&config.api)?, &config.api, tokens.clone());

    let valid = tokens
        .validate(|token| {
            let client = &client;
            async move { client.probe(&token).await }
        })
        .await?;
    let status = tokens.status().await?;

    println!("Token state: {}", status.state);
    if let (Some(expires_at), Some(remaining)) = (status.expires_at, status.remaining_secs) {
        println!("Expires: {} ({} minutes left)", expires_at, remaining / 60);
    }
    println!(
        "Refresh token: {}",
        if status.has_refresh_token { "available" } else { "missing" }
    );

    if valid {
        println!("\n✓ Token accepted by the API");
    } else {
        println!("\n✗ Token rejected by the API; the next crawl will refresh it");
    }
    Ok(())
}

/// Handles the dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Listing Archiver Dry Run ===\n");

    let options = CrawlOptions::from_config(&config.crawl, Utc::now().date_naive())?;

    println!("API:");
    println!("  Trading endpoint: {}", config.api.trading_endpoint);
    println!("  Site ID: {}", config.api.site_id);
    println!("  Entries per page: {}", config.api.entries_per_page);

    println!("\nCrawl:");
    println!("  Range: {} -> {}", options.start, options.end);
    println!("  Page delay: {}ms", config.crawl.page_delay_ms);
    println!("  Validate token first: {}", options.validate_token);

    println!("\nDownloads:");
    println!("  Enabled: {}", config.download.enabled);
    println!("  Images directory: {}", config.download.images_dir);
    println!("  Retries: {}", config.download.retries);
    println!("  Concurrency: {}", config.download.concurrency);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Ledger: {}", config.output.ledger_path);

    let plan = plan_passes(&options, Utc::now());
    let total: usize = plan.iter().map(|(_, windows)| windows.len()).sum();

    println!("\nPasses ({}):", plan.len());
    for (kind, windows) in &plan {
        println!("  - {} ({} windows)", kind, windows.len());
        for window in windows {
            println!("    * {} -> {}", window.from_iso(), window.to_iso());
        }
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would request {} windows", total);

    Ok(())
}

/// Handles the stats mode: shows run history and ledger totals
fn handle_stats(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("Database: {}", config.output.database_path);
    println!("Ledger: {}\n", config.output.ledger_path);

    let storage = open_storage(Path::new(&config.output.database_path))?;
    print_run_history(&storage.list_runs(10)?);

    let records = read_ledger(Path::new(&config.output.ledger_path))?;
    let seen = load_seen(Path::new(&config.output.ledger_path))?;
    println!("\n=== Ledger ===\n");
    println!("  Rows: {}", records.len());
    println!("  Unique items: {}", seen.len());

    Ok(())
}
