//! OAuth token endpoint client
//!
//! Speaks the provider's `identity/v1/oauth2/token` contract: a form-encoded
//! POST authenticated with HTTP Basic `client_id:client_secret`, answering
//! with a JSON body.

use crate::auth::error::CredentialError;
use crate::auth::token::{RefreshCredential, DEFAULT_EXPIRES_IN_SECS};
use crate::config::ApiConfig;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use percent_encoding::percent_decode_str;
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Timeout applied to token endpoint calls
const TOKEN_TIMEOUT: Duration = Duration::from_secs(60);

/// Longest error body kept in a `CredentialError::Rejected`
const MAX_ERROR_BODY: usize = 500;

/// Successful token endpoint answer
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,

    /// Present when the provider issued or rotated a refresh token
    pub refresh_token: Option<String>,
    pub expires_in: i64,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

/// Client for the token and consent endpoints
#[derive(Debug, Clone)]
pub struct TokenEndpoint {
    client: Client,
    token_url: String,
    consent_url: String,
}

impl TokenEndpoint {
    pub fn new(client: Client, token_url: impl Into<String>, consent_url: impl Into<String>) -> Self {
        Self {
            client,
            token_url: token_url.into(),
            consent_url: consent_url.into(),
        }
    }

    /// Builds an endpoint client with its own HTTP client
    pub fn from_config(config: &ApiConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(TOKEN_TIMEOUT)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self::new(
            client,
            config.token_endpoint.clone(),
            config.consent_endpoint.clone(),
        ))
    }

    /// Mints a new access token from a refresh token
    ///
    /// # Arguments
    ///
    /// * `credential` - Application keys
    /// * `refresh_token` - The refresh token to redeem
    /// * `scopes` - Scopes requested for the new access token
    pub async fn refresh(
        &self,
        credential: &RefreshCredential,
        refresh_token: &str,
        scopes: &[String],
    ) -> Result<TokenGrant, CredentialError> {
        let scope = scopes.join(" ");
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("scope", scope.as_str()),
        ];
        self.post_grant(credential, &form).await
    }

    /// Redeems an authorization code obtained through the consent page
    ///
    /// The code is accepted exactly as copied from the redirect URL, so it is
    /// percent-decoded before use.
    pub async fn exchange_code(
        &self,
        credential: &RefreshCredential,
        code: &str,
    ) -> Result<TokenGrant, CredentialError> {
        let code = decode_code(code)?;
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", credential.redirect_uri.as_str()),
        ];
        self.post_grant(credential, &form).await
    }

    /// Builds the URL the seller opens to grant access
    pub fn consent_url(
        &self,
        credential: &RefreshCredential,
        scopes: &[String],
        state: &str,
    ) -> Result<String, CredentialError> {
        let scope = scopes.join(" ");
        let url = Url::parse_with_params(
            &self.consent_url,
            &[
                ("client_id", credential.client_id.as_str()),
                ("redirect_uri", credential.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("state", state),
                ("prompt", "login"),
            ],
        )?;
        Ok(url.into())
    }

    async fn post_grant(
        &self,
        credential: &RefreshCredential,
        form: &[(&str, &str)],
    ) -> Result<TokenGrant, CredentialError> {
        debug!(grant = form.first().map(|(_, v)| *v).unwrap_or(""), "Calling token endpoint");

        let response = self
            .client
            .post(&self.token_url)
            .header(AUTHORIZATION, basic_auth(credential))
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(CredentialError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        let parsed: TokenResponse = serde_json::from_str(&text)
            .map_err(|e| CredentialError::InvalidResponse(e.to_string()))?;

        let access_token = parsed
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or(CredentialError::MissingAccessToken)?;

        Ok(TokenGrant {
            access_token,
            refresh_token: parsed.refresh_token.filter(|t| !t.is_empty()),
            expires_in: parsed.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS),
        })
    }
}

fn basic_auth(credential: &RefreshCredential) -> String {
    let pair = format!("{}:{}", credential.client_id, credential.client_secret);
    format!("Basic {}", BASE64.encode(pair))
}

fn decode_code(code: &str) -> Result<String, CredentialError> {
    percent_decode_str(code.trim())
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| CredentialError::InvalidCode)
}
