//! Access token lifecycle
//!
//! The manager caches one access token and refreshes it on demand. Its state
//! sits behind an async mutex that stays locked for the whole refresh call,
//! so concurrent callers queue up behind a single in-flight refresh and then
//! observe its result.

use crate::auth::endpoint::{TokenEndpoint, TokenGrant};
use crate::auth::error::CredentialError;
use crate::auth::token::{RefreshCredential, Token, TokenState};
use crate::storage::{StoredTokens, TokenStore};
use chrono::{DateTime, Duration, Utc};
use std::future::Future;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

struct Inner {
    store: Box<dyn TokenStore>,
    state: TokenState,
    cached: Option<Token>,

    /// Refresh token saved by an earlier refresh or code exchange
    stored_refresh_token: Option<String>,
    refreshes: u64,
}

/// Point-in-time view of the manager, for reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenStatus {
    pub state: TokenState,
    pub expires_at: Option<DateTime<Utc>>,

    /// Seconds left on the cached token, negative once expired
    pub remaining_secs: Option<i64>,
    pub has_refresh_token: bool,
    pub refreshes: u64,
}

/// Supplies a valid bearer token, refreshing it transparently
pub struct TokenManager {
    endpoint: TokenEndpoint,
    credential: RefreshCredential,
    scopes: Vec<String>,
    leeway: Duration,
    inner: Mutex<Inner>,
}

impl TokenManager {
    /// Creates a manager; the store is not read until the first token request
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Token endpoint client
    /// * `credential` - Application keys and the configured refresh token
    /// * `scopes` - Scopes requested on every refresh
    /// * `leeway_secs` - Safety margin before the hard expiry
    /// * `store` - Where tokens are persisted between runs
    pub fn new(
        endpoint: TokenEndpoint,
        credential: RefreshCredential,
        scopes: Vec<String>,
        leeway_secs: u64,
        store: Box<dyn TokenStore>,
    ) -> Self {
        Self {
            endpoint,
            credential,
            scopes,
            leeway: Duration::seconds(leeway_secs as i64),
            inner: Mutex::new(Inner {
                store,
                state: TokenState::Unknown,
                cached: None,
                stored_refresh_token: None,
                refreshes: 0,
            }),
        }
    }

    /// Returns a token that is fresh now, refreshing first if needed
    ///
    /// # Errors
    ///
    /// Fails when no refresh path exists, when the provider rejects the
    /// refresh, or when the new token cannot be saved. After a rejection
    /// every further call fails immediately without contacting the provider.
    pub async fn current_token(&self) -> Result<String, CredentialError> {
        let mut inner = self.inner.lock().await;
        self.ensure_loaded(&mut inner)?;

        match inner.state {
            TokenState::Unrefreshable => return Err(CredentialError::Unrefreshable),
            TokenState::Fresh => {
                if let Some(token) = &inner.cached {
                    if token.is_fresh_at(Utc::now(), self.leeway) {
                        return Ok(token.value.clone());
                    }
                }
                debug!("Cached access token reached its expiry margin");
                inner.state = TokenState::Stale;
            }
            TokenState::Stale | TokenState::Unknown => {}
        }

        self.refresh_locked(&mut inner).await
    }

    /// Reports that `token` was refused by the API
    ///
    /// Only the token currently cached is affected; a report about a token
    /// that has already been replaced is ignored.
    pub async fn mark_invalid(&self, token: &str) {
        let mut inner = self.inner.lock().await;

        let is_current = inner
            .cached
            .as_ref()
            .map(|cached| cached.value == token)
            .unwrap_or(false);

        if is_current && inner.state == TokenState::Fresh {
            info!("Access token rejected by the API, will refresh before the next call");
            inner.state = TokenState::Stale;
        } else if !is_current {
            debug!("Ignoring rejection of a superseded access token");
        }
    }

    /// Checks the current token with a cheap authenticated call
    ///
    /// A failed check marks the token stale, so the following
    /// [`current_token`](Self::current_token) refreshes it.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The check accepted the token
    /// * `Ok(false)` - The check failed and the token was marked stale
    pub async fn validate<F, Fut>(&self, check: F) -> Result<bool, CredentialError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = bool>,
    {
        let token = self.current_token().await?;
        if check(token.clone()).await {
            debug!("Access token validated");
            return Ok(true);
        }

        warn!("Access token failed validation");
        self.mark_invalid(&token).await;
        Ok(false)
    }

    /// Refreshes unconditionally
    pub async fn refresh(&self) -> Result<String, CredentialError> {
        let mut inner = self.inner.lock().await;
        self.ensure_loaded(&mut inner)?;

        if inner.state == TokenState::Unrefreshable {
            return Err(CredentialError::Unrefreshable);
        }
        self.refresh_locked(&mut inner).await
    }

    /// Redeems an authorization code and persists the resulting tokens
    ///
    /// A successful exchange also clears an earlier rejection.
    pub async fn exchange_code(&self, code: &str) -> Result<Token, CredentialError> {
        let mut inner = self.inner.lock().await;
        self.ensure_loaded(&mut inner)?;

        let grant = self.endpoint.exchange_code(&self.credential, code).await?;
        if grant.refresh_token.is_none() {
            warn!("Code exchange returned no refresh token");
        }

        let token = self.install_grant(&mut inner, grant)?;
        info!(expires_at = %token.expires_at(), "Authorization code exchanged");
        Ok(token)
    }

    /// Builds the consent URL for this application
    pub fn consent_url(&self, state: &str) -> Result<String, CredentialError> {
        self.endpoint
            .consent_url(&self.credential, &self.scopes, state)
    }

    /// Current lifecycle snapshot
    pub async fn status(&self) -> Result<TokenStatus, CredentialError> {
        let mut inner = self.inner.lock().await;
        self.ensure_loaded(&mut inner)?;

        Ok(TokenStatus {
            state: inner.state,
            expires_at: inner.cached.as_ref().map(Token::expires_at),
            remaining_secs: inner.cached.as_ref().map(|t| t.remaining_secs(Utc::now())),
            has_refresh_token: self.refresh_token(&inner).is_some(),
            refreshes: inner.refreshes,
        })
    }

    /// Number of successful refreshes performed by this manager
    pub async fn refresh_count(&self) -> u64 {
        self.inner.lock().await.refreshes
    }

    fn ensure_loaded(&self, inner: &mut Inner) -> Result<(), CredentialError> {
        if inner.state != TokenState::Unknown {
            return Ok(());
        }

        let stored = inner.store.load_tokens()?;
        inner.stored_refresh_token = stored.refresh_token;
        inner.state = match &stored.access {
            Some(token) if token.is_fresh_at(Utc::now(), self.leeway) => {
                debug!(expires_at = %token.expires_at(), "Loaded cached access token");
                TokenState::Fresh
            }
            _ => TokenState::Stale,
        };
        inner.cached = stored.access;
        Ok(())
    }

    /// Refresh token to redeem; a rotated one saved in the store wins
    fn refresh_token<'a>(&'a self, inner: &'a Inner) -> Option<&'a str> {
        inner
            .stored_refresh_token
            .as_deref()
            .or(self.credential.refresh_token.as_deref())
    }

    async fn refresh_locked(&self, inner: &mut Inner) -> Result<String, CredentialError> {
        let Some(refresh_token) = self.refresh_token(inner).map(str::to_string) else {
            error!("No refresh token configured or stored");
            inner.state = TokenState::Unrefreshable;
            return Err(CredentialError::MissingRefreshToken);
        };

        info!("Refreshing access token");
        let grant = match self
            .endpoint
            .refresh(&self.credential, &refresh_token, &self.scopes)
            .await
        {
            Ok(grant) => grant,
            Err(e) => {
                error!(error = %e, "Access token refresh failed");
                if e.is_permanent() {
                    inner.state = TokenState::Unrefreshable;
                }
                return Err(e);
            }
        };

        let token = self.install_grant(inner, grant)?;
        inner.refreshes += 1;
        info!(
            expires_in_secs = token.expires_in_secs,
            "Access token refreshed"
        );
        Ok(token.value)
    }

    /// Replaces the cached token and persists it
    fn install_grant(&self, inner: &mut Inner, grant: TokenGrant) -> Result<Token, CredentialError> {
        let token = Token::new(grant.access_token, Utc::now(), grant.expires_in);
        if let Some(rotated) = grant.refresh_token {
            inner.stored_refresh_token = Some(rotated);
        }

        inner.store.save_tokens(&StoredTokens {
            access: Some(token.clone()),
            refresh_token: inner.stored_refresh_token.clone(),
        })?;

        inner.cached = Some(token.clone());
        inner.state = TokenState::Fresh;
        Ok(token)
    }
}
