//! Skydropx REST client.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;

use super::auth::{TokenCache, request_token};
use super::types::{CreateShipmentInput, CreatedShipment};
use super::{ProviderErrorKind, SkydropxError};
use crate::config::SkydropxConfig;

const SHIPMENTS_PATH: &str = "/api/v1/shipments";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Skydropx API client.
///
/// Cheap to clone; clones share the HTTP connection pool and token cache.
#[derive(Clone)]
pub struct SkydropxClient {
    inner: Arc<SkydropxClientInner>,
}

struct SkydropxClientInner {
    client: reqwest::Client,
    base_url: Url,
    client_id: String,
    client_secret: SecretString,
    tokens: TokenCache,
}

impl SkydropxClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `SkydropxError::Http` if the HTTP client cannot be built.
    pub fn new(config: &SkydropxConfig) -> Result<Self, SkydropxError> {
        Self::with_base_url(
            config.base_url.clone(),
            &config.client_id,
            config.client_secret.clone(),
        )
    }

    /// Create a client against an explicit base URL (tests point this at a mock server).
    ///
    /// # Errors
    ///
    /// Returns `SkydropxError::Http` if the HTTP client cannot be built.
    pub fn with_base_url(
        base_url: Url,
        client_id: &str,
        client_secret: SecretString,
    ) -> Result<Self, SkydropxError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            inner: Arc::new(SkydropxClientInner {
                client,
                base_url,
                client_id: client_id.to_string(),
                client_secret,
                tokens: TokenCache::new(),
            }),
        })
    }

    /// Return a cached token, requesting a new one when missing or expired.
    ///
    /// # Errors
    ///
    /// Returns `SkydropxError::AuthenticationFailed` if the credentials are rejected.
    pub async fn get_valid_token(&self) -> Result<SecretString, SkydropxError> {
        let inner = &self.inner;
        inner
            .tokens
            .get_valid_token(|| {
                request_token(
                    &inner.client,
                    &inner.base_url,
                    &inner.client_id,
                    &inner.client_secret,
                )
            })
            .await
    }

    /// Check if a non-expired token is cached.
    pub async fn has_valid_token(&self) -> bool {
        self.inner.tokens.has_valid_token().await
    }

    /// Fetch a shipment as raw JSON.
    ///
    /// # Errors
    ///
    /// Returns a classified `SkydropxError` on any non-success response.
    #[instrument(skip(self))]
    pub async fn get_shipment(&self, shipment_id: &str) -> Result<Value, SkydropxError> {
        let url = self.shipment_url(Some(shipment_id))?;
        self.send_json(Method::GET, url, None).await
    }

    /// Purchase a label for a quoted rate.
    ///
    /// # Errors
    ///
    /// Returns a classified `SkydropxError` on any non-success response.
    #[instrument(skip(self, input), fields(reference = %input.reference, rate_id = %input.rate_id))]
    pub async fn create_shipment(
        &self,
        input: &CreateShipmentInput,
    ) -> Result<CreatedShipment, SkydropxError> {
        let url = self.shipment_url(None)?;
        let body = input.to_body();
        let raw = self.send_json(Method::POST, url, Some(&body)).await?;
        let created = CreatedShipment::from_response(raw);

        debug!(
            shipment_id = created.shipment_id.as_deref().unwrap_or("none"),
            has_tracking = created.has_tracking(),
            polling = created.polling.as_deref().unwrap_or("none"),
            "Skydropx shipment created"
        );
        Ok(created)
    }

    fn shipment_url(&self, shipment_id: Option<&str>) -> Result<Url, SkydropxError> {
        let mut url = self.inner.base_url.join(SHIPMENTS_PATH)?;
        if let Some(id) = shipment_id {
            url.path_segments_mut()
                .map_err(|()| SkydropxError::InvalidUrl(self.inner.base_url.to_string()))?
                .push(id);
        }
        Ok(url)
    }

    /// Send an authenticated request, retrying once with a fresh token on 401.
    async fn send_json(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<Value, SkydropxError> {
        let mut retried = false;
        loop {
            let token = self.get_valid_token().await?;
            let mut request = self
                .inner
                .client
                .request(method.clone(), url.clone())
                .bearer_auth(token.expose_secret())
                .header("Accept", "application/json");
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED && !retried {
                warn!("Skydropx rejected cached token, refreshing");
                self.inner.tokens.invalidate().await;
                retried = true;
                continue;
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.trim().parse().ok())
                    .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
                return Err(SkydropxError::RateLimited(retry_after));
            }

            if !status.is_success() {
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err(SkydropxError::Api {
                    kind: ProviderErrorKind::from_status(status.as_u16()),
                    status: status.as_u16(),
                    message,
                });
            }

            let text = response.text().await?;
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return Ok(serde_json::from_str(&text)?);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client(base: &str) -> SkydropxClient {
        SkydropxClient::with_base_url(
            Url::parse(base).unwrap(),
            "client",
            SecretString::from("s3cr3t-value"),
        )
        .unwrap()
    }

    #[test]
    fn test_shipment_url_escapes_id() {
        let client = client("https://pro.skydropx.com");
        let url = client.shipment_url(Some("shp/1 2")).unwrap();
        assert_eq!(url.as_str(), "https://pro.skydropx.com/api/v1/shipments/shp%2F1%202");
    }

    #[test]
    fn test_collection_url() {
        let client = client("http://127.0.0.1:9000/");
        let url = client.shipment_url(None).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9000/api/v1/shipments");
    }

    #[tokio::test]
    async fn test_no_token_before_first_call() {
        let client = client("https://pro.skydropx.com");
        assert!(!client.has_valid_token().await);
    }
}
