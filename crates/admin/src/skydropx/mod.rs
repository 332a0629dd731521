//! Skydropx shipping API client.
//!
//! # Architecture
//!
//! - OAuth client-credentials tokens, cached in an explicit [`TokenCache`]
//!   owned by the client (no process-wide singleton)
//! - A 401 invalidates the cache and the request is retried once
//! - Shipment responses are returned as raw JSON; tracking data is pulled out
//!   with the tolerant extractors in `nopal_core::shipping::extract`
//!
//! Failures are classified into [`ProviderErrorKind`] so the write paths can
//! surface a stable error code instead of raw provider error shapes.

pub mod auth;
pub mod client;
pub mod types;

pub use auth::{AccessToken, TokenCache};
pub use client::SkydropxClient;
pub use types::{CreateShipmentInput, CreatedShipment, ShipmentAddress};

use nopal_core::ShippingErrorCode;
use thiserror::Error;

/// Classified provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    Unauthorized,
    NotFound,
    BadRequest,
    UnprocessableEntity,
    RateLimited,
    /// Any other non-2xx status, transport failure or unreadable body.
    Upstream,
}

impl ProviderErrorKind {
    /// Classify an HTTP status code returned by the provider.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Unauthorized,
            404 => Self::NotFound,
            400 => Self::BadRequest,
            422 => Self::UnprocessableEntity,
            429 => Self::RateLimited,
            _ => Self::Upstream,
        }
    }

    /// Stable error code surfaced to callers.
    #[must_use]
    pub const fn code(self) -> ShippingErrorCode {
        match self {
            Self::Unauthorized => ShippingErrorCode::SkydropxUnauthorized,
            Self::NotFound => ShippingErrorCode::SkydropxNotFound,
            Self::BadRequest => ShippingErrorCode::SkydropxBadRequest,
            Self::UnprocessableEntity => ShippingErrorCode::SkydropxUnprocessableEntity,
            Self::RateLimited => ShippingErrorCode::SkydropxRateLimited,
            Self::Upstream => ShippingErrorCode::SkydropxUpstreamError,
        }
    }
}

/// Errors that can occur when interacting with the Skydropx API.
#[derive(Debug, Error)]
pub enum SkydropxError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The provider answered with a non-success status.
    #[error("Skydropx returned HTTP {status}: {message}")]
    Api {
        kind: ProviderErrorKind,
        status: u16,
        message: String,
    },

    /// Rate limited by Skydropx.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Client credentials were rejected.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The configured base URL cannot address API paths.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl SkydropxError {
    #[must_use]
    pub const fn kind(&self) -> ProviderErrorKind {
        match self {
            Self::Api { kind, .. } => *kind,
            Self::RateLimited(_) => ProviderErrorKind::RateLimited,
            Self::AuthenticationFailed(_) => ProviderErrorKind::Unauthorized,
            Self::Http(_) | Self::Parse(_) | Self::InvalidUrl(_) => ProviderErrorKind::Upstream,
        }
    }
}

impl From<url::ParseError> for SkydropxError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}
