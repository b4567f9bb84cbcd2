//! OAuth credential store backed by the provider token endpoint
//!
//! Hands out a refreshed-or-valid access credential for an auth-token
//! record. The refresh-token grant is posted to the token endpoint stored on
//! the record itself; a rejected refresh is terminal
//! ([`DaylineError::TokenExpired`]) and requires the user to re-authenticate
//! out of band.

use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use dayline_core::{Credential, CredentialStore};
use dayline_domain::{AuthToken, DaylineError, Result};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

const REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(15);
const DEFAULT_REFRESH_THRESHOLD_SECONDS: i64 = 300;

/// Credential store implementing the OAuth refresh-token grant.
pub struct OAuthCredentialStore {
    client: Client,
    /// Tokens expiring within this many seconds are refreshed eagerly.
    refresh_threshold_seconds: i64,
}

impl Default for OAuthCredentialStore {
    fn default() -> Self {
        Self::new(DEFAULT_REFRESH_THRESHOLD_SECONDS)
    }
}

impl OAuthCredentialStore {
    pub fn new(refresh_threshold_seconds: i64) -> Self {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build().unwrap_or_default();
        Self { client, refresh_threshold_seconds }
    }

    async fn refresh(&self, token: &AuthToken, refresh_token: &str) -> Result<Credential> {
        let endpoint = Url::parse(&token.token_endpoint).map_err(|err| {
            DaylineError::Config(format!(
                "invalid token endpoint on auth token {}: {err}",
                token.id
            ))
        })?;

        let mut form: Vec<(&str, &str)> = vec![
            ("client_id", token.client_id.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        if let Some(secret) = token.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }

        let response = self
            .client
            .post(endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|err| {
                DaylineError::Network(format!("token refresh request failed: {err}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            // The provider rejected the grant; only re-authentication helps.
            return Err(DaylineError::TokenExpired(format!(
                "refresh rejected for token {} ({status}): {body}",
                token.id
            )));
        }

        let payload: TokenRefreshResponse = response.json().await.map_err(|err| {
            DaylineError::Auth(format!("failed to parse token refresh response: {err}"))
        })?;

        debug!(token_id = %token.id, expires_in = payload.expires_in, "access token refreshed");

        Ok(Credential {
            access_token: payload.access_token,
            expires_at: Utc::now() + Duration::seconds(payload.expires_in),
        })
    }
}

#[async_trait]
impl CredentialStore for OAuthCredentialStore {
    #[instrument(skip(self, token), fields(token_id = %token.id))]
    async fn ensure_valid(&self, token: &AuthToken) -> Result<Credential> {
        let now = Utc::now();
        if !token.expires_within(Duration::seconds(self.refresh_threshold_seconds), now) {
            return Ok(Credential {
                access_token: token.access_token.clone(),
                expires_at: token.expires_at,
            });
        }

        let Some(refresh_token) = token.refresh_token.as_deref().filter(|t| !t.is_empty())
        else {
            return Err(DaylineError::TokenExpired(format!(
                "auth token {} is expired and has no refresh token",
                token.id
            )));
        };

        self.refresh(token, refresh_token).await
    }
}

#[derive(Debug, Deserialize)]
struct TokenRefreshResponse {
    access_token: String,
    expires_in: i64,
}
