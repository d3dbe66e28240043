use crate::storage::StorageError;
use thiserror::Error;

/// Failures that stop the token lifecycle
///
/// Any of these reaching the crawl engine aborts the run.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("No refresh token available; run `consent-url` and `exchange` first")]
    MissingRefreshToken,

    #[error("Token endpoint rejected the request (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Token endpoint response carried no access_token")]
    MissingAccessToken,

    #[error("Token endpoint returned an unreadable response: {0}")]
    InvalidResponse(String),

    #[error("Authorization code is not valid percent-encoded UTF-8")]
    InvalidCode,

    #[error("Credentials were rejected earlier in this run")]
    Unrefreshable,

    #[error("Token endpoint unreachable: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Token store failure: {0}")]
    Store(#[from] StorageError),

    #[error("Invalid consent endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
}

impl CredentialError {
    /// True when retrying with the same credentials cannot succeed
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::MissingRefreshToken
                | Self::Rejected { .. }
                | Self::MissingAccessToken
                | Self::Unrefreshable
        )
    }
}
