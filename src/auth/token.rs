//! Token and credential value types

use crate::config::CredentialsConfig;
use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// Lifetime assumed when the token endpoint omits `expires_in`
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 7200;

/// A short-lived bearer token
///
/// Tokens are replaced wholesale on every refresh; nothing mutates one in
/// place.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    pub value: String,
    pub obtained_at: DateTime<Utc>,
    pub expires_in_secs: i64,
}

impl Token {
    pub fn new(value: impl Into<String>, obtained_at: DateTime<Utc>, expires_in_secs: i64) -> Self {
        Self {
            value: value.into(),
            obtained_at,
            expires_in_secs,
        }
    }

    /// Hard expiry reported by the provider
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.obtained_at + Duration::seconds(self.expires_in_secs)
    }

    /// Returns true if the token is still usable at `now` with `leeway` to spare
    pub fn is_fresh_at(&self, now: DateTime<Utc>, leeway: Duration) -> bool {
        !self.value.is_empty() && now + leeway < self.expires_at()
    }

    /// Seconds left before the hard expiry, negative once expired
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at() - now).num_seconds()
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &"<redacted>")
            .field("obtained_at", &self.obtained_at)
            .field("expires_in_secs", &self.expires_in_secs)
            .finish()
    }
}

/// Long-lived material used to mint new access tokens
#[derive(Clone)]
pub struct RefreshCredential {
    /// Refresh token from the configuration, if any
    pub refresh_token: Option<String>,
    pub client_id: String,
    pub client_secret: String,

    /// RuName registered for the application
    pub redirect_uri: String,
}

impl RefreshCredential {
    pub fn from_config(config: &CredentialsConfig) -> Self {
        Self {
            refresh_token: config.refresh_token.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
        }
    }
}

impl fmt::Debug for RefreshCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshCredential")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

/// Lifecycle of the cached access token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// The store has not been consulted yet
    Unknown,

    /// A cached token is usable
    Fresh,

    /// The cached token is missing, expired or was reported invalid
    Stale,

    /// The provider refused to refresh, or there is nothing to refresh with
    Unrefreshable,
}

impl TokenState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Fresh => "fresh",
            Self::Stale => "stale",
            Self::Unrefreshable => "unrefreshable",
        }
    }
}

impl fmt::Display for TokenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
