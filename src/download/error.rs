use thiserror::Error;

/// Typed download errors enabling retry classification
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("HTTP error {status} fetching {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Empty response body from {0}")]
    EmptyBody(String),

    #[error("Request failed for {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Disk error: {0}")]
    Disk(#[from] std::io::Error),
}

impl DownloadError {
    /// Whether another attempt could succeed
    ///
    /// Any network-side failure is retried; a failing disk is not.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Disk(_))
    }
}
