//! OAuth refresh-token exchange
//!
//! Accounts carry a long-lived refresh token and the client ID it was issued
//! to. Before the mailbox can be read, the refresh token is exchanged at the
//! token endpoint for a short-lived access token. Nothing is cached: every
//! verification attempt performs a fresh exchange.

use std::future::Future;
use std::pin::Pin;

use common::Secret;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Response from the token endpoint for a refresh grant.
///
/// Only `access_token` is required. Providers that rotate refresh tokens
/// return a new one; the pool does not persist it, since the stored refresh
/// token stays valid for the short life of a lease.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// First collaborator stage: refresh credential in, access token out.
///
/// Uses `Pin<Box<dyn Future>>` so the pool can hold an `Arc<dyn TokenSource>`.
pub trait TokenSource: Send + Sync {
    fn access_token<'a>(
        &'a self,
        refresh_credential: &'a str,
        client_identifier: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Secret<String>>> + Send + 'a>>;
}

/// Token source backed by an OAuth 2.0 token endpoint.
#[derive(Clone)]
pub struct OAuthTokenSource {
    client: reqwest::Client,
    endpoint: String,
    scope: String,
}

impl OAuthTokenSource {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            scope: scope.into(),
        }
    }

    /// Exchange a refresh token for an access token.
    ///
    /// 400/401/403 mean the refresh token or client ID was rejected and map to
    /// `InvalidCredentials`; other failures are `TokenExchange` or `Http`.
    pub async fn refresh(&self, refresh_token: &str, client_id: &str) -> Result<TokenResponse> {
        let response = self
            .client
            .post(&self.endpoint)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", client_id),
                ("scope", self.scope.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));

            if matches!(status.as_u16(), 400 | 401 | 403) {
                return Err(Error::InvalidCredentials(format!(
                    "refresh token rejected ({status}): {body}"
                )));
            }

            return Err(Error::TokenExchange(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let token = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| Error::TokenExchange(format!("invalid token response: {e}")))?;

        debug!(
            expires_in = token.expires_in,
            rotated = token.refresh_token.is_some(),
            "access token issued"
        );
        Ok(token)
    }
}

impl TokenSource for OAuthTokenSource {
    fn access_token<'a>(
        &'a self,
        refresh_credential: &'a str,
        client_identifier: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Secret<String>>> + Send + 'a>> {
        Box::pin(async move {
            let token = self.refresh(refresh_credential, client_identifier).await?;
            if token.access_token.is_empty() {
                return Err(Error::TokenExchange("empty access_token in response".into()));
            }
            Ok(Secret::new(token.access_token))
        })
    }
}
