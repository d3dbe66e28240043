//! OAuth credential lifecycle
//!
//! This module keeps a short-lived access token valid for the whole crawl:
//! - [`Token`] and [`RefreshCredential`] value types
//! - [`TokenEndpoint`], the token and consent endpoint client
//! - [`TokenManager`], the cache with single-flight refresh

mod endpoint;
mod error;
mod manager;
mod token;

pub use endpoint::{TokenEndpoint, TokenGrant};
pub use error::CredentialError;
pub use manager::{TokenManager, TokenStatus};
pub use token::{RefreshCredential, Token, TokenState, DEFAULT_EXPIRES_IN_SECS};
