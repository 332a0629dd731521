//! Skydropx OAuth client-credentials authentication.

use std::future::Future;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use url::Url;

use super::{ProviderErrorKind, SkydropxError};

/// Token endpoint, relative to the API base URL.
pub const TOKEN_PATH: &str = "/api/v1/oauth/token";

/// Seconds before expiry at which a token is treated as expired.
const EXPIRY_BUFFER_SECS: i64 = 60;

/// Lifetime assumed when the provider omits `expires_in`.
const DEFAULT_EXPIRES_IN: i64 = 7200;

/// Bearer token obtained from the token endpoint.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub access_token: SecretString,
    /// Unix timestamp when the token expires.
    pub expires_at: i64,
}

impl AccessToken {
    /// Check if the token has expired, with a 60 second safety margin.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_within(EXPIRY_BUFFER_SECS)
    }

    /// Check if the token will expire within the given number of seconds.
    #[must_use]
    pub fn expires_within(&self, seconds: i64) -> bool {
        let now = chrono::Utc::now().timestamp();
        now >= self.expires_at - seconds
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Request a fresh token with client credentials.
///
/// # Errors
///
/// Returns `SkydropxError::AuthenticationFailed` if the credentials are rejected,
/// `SkydropxError::RateLimited` when throttled, and `SkydropxError::Api` for
/// any other non-success status.
#[instrument(skip(client, client_secret), fields(client_id = %client_id))]
pub async fn request_token(
    client: &reqwest::Client,
    base_url: &Url,
    client_id: &str,
    client_secret: &SecretString,
) -> Result<AccessToken, SkydropxError> {
    let now = chrono::Utc::now().timestamp();
    let url = base_url.join(TOKEN_PATH)?;

    let response = client
        .post(url)
        .form(&[
            ("grant_type", "client_credentials"),
            ("client_id", client_id),
            ("client_secret", client_secret.expose_secret()),
        ])
        .send()
        .await?;

    let status = response.status();

    if status.is_success() {
        let token: TokenResponse = response.json().await?;
        debug!("Obtained Skydropx access token");
        return Ok(AccessToken {
            access_token: SecretString::from(token.access_token),
            expires_at: now + token.expires_in.unwrap_or(DEFAULT_EXPIRES_IN),
        });
    }

    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());

    match ProviderErrorKind::from_status(status.as_u16()) {
        ProviderErrorKind::Unauthorized | ProviderErrorKind::BadRequest => Err(
            SkydropxError::AuthenticationFailed(format!("HTTP {status}: {error_text}")),
        ),
        kind => Err(SkydropxError::Api {
            kind,
            status: status.as_u16(),
            message: error_text,
        }),
    }
}

/// Short-lived credential cache owned by one client.
#[derive(Debug, Default)]
pub struct TokenCache {
    token: RwLock<Option<AccessToken>>,
}

impl TokenCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached token, or run `refresh` and cache its result.
    ///
    /// Concurrent callers that find the cache empty wait for a single refresh.
    ///
    /// # Errors
    ///
    /// Propagates the error returned by `refresh`.
    pub async fn get_valid_token<F, Fut>(&self, refresh: F) -> Result<SecretString, SkydropxError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AccessToken, SkydropxError>>,
    {
        if let Some(token) = self.token.read().await.as_ref()
            && !token.is_expired()
        {
            return Ok(token.access_token.clone());
        }

        let mut guard = self.token.write().await;
        if let Some(token) = guard.as_ref()
            && !token.is_expired()
        {
            return Ok(token.access_token.clone());
        }

        let fresh = refresh().await?;
        let value = fresh.access_token.clone();
        *guard = Some(fresh);
        Ok(value)
    }

    /// Drop the cached token (after a 401).
    pub async fn invalidate(&self) {
        *self.token.write().await = None;
    }

    /// Check if a non-expired token is cached.
    pub async fn has_valid_token(&self) -> bool {
        self.token
            .read()
            .await
            .as_ref()
            .is_some_and(|token| !token.is_expired())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn token(value: &str, expires_in: i64) -> AccessToken {
        AccessToken {
            access_token: SecretString::from(value),
            expires_at: chrono::Utc::now().timestamp() + expires_in,
        }
    }

    #[test]
    fn test_token_is_expired() {
        assert!(token("old", -3600).is_expired());
        assert!(!token("fresh", 3600).is_expired());
        // Inside the 60 second buffer
        assert!(token("almost", 30).is_expired());
    }

    #[tokio::test]
    async fn test_cache_refreshes_once_then_reuses() {
        let cache = TokenCache::new();
        let first = cache
            .get_valid_token(|| async { Ok(token("first", 3600)) })
            .await
            .unwrap();
        let second = cache
            .get_valid_token(|| async { Ok(token("second", 3600)) })
            .await
            .unwrap();

        assert_eq!(first.expose_secret(), "first");
        assert_eq!(second.expose_secret(), "first");
        assert!(cache.has_valid_token().await);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refresh() {
        let cache = TokenCache::new();
        cache
            .get_valid_token(|| async { Ok(token("first", 3600)) })
            .await
            .unwrap();
        cache.invalidate().await;
        assert!(!cache.has_valid_token().await);

        let next = cache
            .get_valid_token(|| async { Ok(token("second", 3600)) })
            .await
            .unwrap();
        assert_eq!(next.expose_secret(), "second");
    }

    #[tokio::test]
    async fn test_expired_token_is_replaced() {
        let cache = TokenCache::new();
        cache
            .get_valid_token(|| async { Ok(token("stale", 10)) })
            .await
            .unwrap();
        let next = cache
            .get_valid_token(|| async { Ok(token("renewed", 3600)) })
            .await
            .unwrap();
        assert_eq!(next.expose_secret(), "renewed");
    }
}
