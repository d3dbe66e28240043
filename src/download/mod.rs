//! Image download manager
//!
//! Fetches each image at most once: a destination that already exists is
//! never requested again. Bodies are written to a `.part` file and renamed
//! into place, so a destination only ever holds a complete download.

mod error;
mod paths;
mod retry;

pub use error::DownloadError;
pub use paths::{image_extension, part_path, sanitize_label, target_for, DownloadTarget};
pub use retry::{retry_with_backoff, RetryAction, RetryFailure, RetryPolicy};

use crate::config::DownloadConfig;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Result of one [`DownloadManager::fetch`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The image was fetched and stored
    Downloaded { bytes: u64 },

    /// The destination existed; nothing was requested
    AlreadyPresent,

    /// Every attempt failed
    Failed { attempts: u32, error: String },
}

/// Builds the HTTP client used for image downloads
pub fn build_download_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Downloads images with retries and bounded concurrency
#[derive(Debug, Clone)]
pub struct DownloadManager {
    client: Client,
    images_dir: PathBuf,
    policy: RetryPolicy,
    delay: Duration,
    concurrency: usize,
}

impl DownloadManager {
    pub fn new(
        client: Client,
        images_dir: impl Into<PathBuf>,
        policy: RetryPolicy,
        delay: Duration,
        concurrency: usize,
    ) -> Self {
        Self {
            client,
            images_dir: images_dir.into(),
            policy,
            delay,
            concurrency: concurrency.max(1),
        }
    }

    /// Builds a manager from the `[download]` configuration table
    pub fn from_config(config: &DownloadConfig) -> Result<Self, reqwest::Error> {
        let client = build_download_client(Duration::from_secs(config.timeout_secs))?;
        Ok(Self::new(
            client,
            &config.images_dir,
            RetryPolicy {
                attempts: config.retries,
                base_delay: Duration::from_millis(config.base_delay_ms),
            },
            Duration::from_millis(config.delay_ms),
            config.concurrency as usize,
        ))
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    /// Target for the `ordinal`-th image of the item labelled `label`
    pub fn target(&self, label: &str, ordinal: usize, url: &str) -> DownloadTarget {
        target_for(&self.images_dir, label, ordinal, url)
    }

    /// Fetches one image unless its destination already exists
    ///
    /// Never fails: exhausted retries are reported as
    /// [`DownloadOutcome::Failed`].
    pub async fn fetch(&self, url: &str, destination: &Path) -> DownloadOutcome {
        if tokio::fs::try_exists(destination).await.unwrap_or(false) {
            debug!(path = %destination.display(), "Image already present");
            return DownloadOutcome::AlreadyPresent;
        }

        let result = retry_with_backoff(
            &self.policy,
            |e: &DownloadError| {
                if e.is_retryable() {
                    RetryAction::Retry
                } else {
                    RetryAction::Abort
                }
            },
            || self.attempt(url, destination),
        )
        .await;

        match result {
            Ok(bytes) => {
                debug!(url, path = %destination.display(), bytes, "Image downloaded");
                DownloadOutcome::Downloaded { bytes }
            }
            Err(failure) => {
                warn!(
                    url,
                    attempts = failure.attempts,
                    error = %failure.last_error,
                    "Image download failed"
                );
                DownloadOutcome::Failed {
                    attempts: failure.attempts,
                    error: failure.last_error.to_string(),
                }
            }
        }
    }

    /// Fetches a batch of targets with bounded concurrency
    ///
    /// Targets sharing a destination are never in flight together; a later
    /// duplicate runs after the first one finished and normally finds the
    /// file present. Results come back in completion order.
    pub async fn fetch_all(
        &self,
        targets: Vec<DownloadTarget>,
    ) -> Vec<(DownloadTarget, DownloadOutcome)> {
        let mut results = Vec::with_capacity(targets.len());
        let mut pending = targets;

        while !pending.is_empty() {
            let mut destinations = HashSet::new();
            let (wave, rest): (Vec<_>, Vec<_>) = pending
                .into_iter()
                .partition(|t| destinations.insert(t.destination.clone()));
            pending = rest;

            let done: Vec<_> = stream::iter(wave)
                .map(|target| async move {
                    let outcome = self.fetch(&target.url, &target.destination).await;
                    if !matches!(outcome, DownloadOutcome::AlreadyPresent) && !self.delay.is_zero() {
                        tokio::time::sleep(self.delay).await;
                    }
                    (target, outcome)
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;
            results.extend(done);
        }

        results
    }

    async fn attempt(&self, url: &str, destination: &Path) -> Result<u64, DownloadError> {
        let http_err = |source| DownloadError::Http {
            url: url.to_string(),
            source,
        };

        let response = self.client.get(url).send().await.map_err(http_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.bytes().await.map_err(http_err)?;
        if body.is_empty() {
            return Err(DownloadError::EmptyBody(url.to_string()));
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let part = part_path(destination);
        tokio::fs::write(&part, &body).await?;
        if let Err(e) = tokio::fs::rename(&part, destination).await {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(e.into());
        }

        Ok(body.len() as u64)
    }
}
