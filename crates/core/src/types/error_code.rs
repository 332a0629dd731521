//! Stable error codes surfaced by the shipping write paths.
//!
//! These strings are part of the admin API contract: clients branch on them,
//! so variants may be added but never renamed.

use serde::{Deserialize, Serialize};

/// Error taxonomy for shipping operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingErrorCode {
    /// Order resolution failed against every lookup strategy.
    OrderNotFound,
    /// The operation requires a provider shipment that does not exist yet.
    MissingShipmentId,
    /// Local pre-flight validation rejected the request before calling the provider.
    InvalidShippingPayload,
    /// Provider rejected our credentials.
    SkydropxUnauthorized,
    /// Provider does not know the requested resource.
    SkydropxNotFound,
    /// Provider rejected the request as malformed.
    SkydropxBadRequest,
    /// Provider understood the request but refused to process it.
    SkydropxUnprocessableEntity,
    /// Provider is throttling us.
    SkydropxRateLimited,
    /// Any other provider or transport failure.
    SkydropxUpstreamError,
    /// Provider accepted the request but has no tracking number or label yet.
    TrackingPending,
    /// Required configuration or credentials are absent.
    ConfigError,
    /// Catch-all.
    UnknownError,
}

impl ShippingErrorCode {
    /// Wire representation of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OrderNotFound => "order_not_found",
            Self::MissingShipmentId => "missing_shipment_id",
            Self::InvalidShippingPayload => "invalid_shipping_payload",
            Self::SkydropxUnauthorized => "skydropx_unauthorized",
            Self::SkydropxNotFound => "skydropx_not_found",
            Self::SkydropxBadRequest => "skydropx_bad_request",
            Self::SkydropxUnprocessableEntity => "skydropx_unprocessable_entity",
            Self::SkydropxRateLimited => "skydropx_rate_limited",
            Self::SkydropxUpstreamError => "skydropx_upstream_error",
            Self::TrackingPending => "tracking_pending",
            Self::ConfigError => "config_error",
            Self::UnknownError => "unknown_error",
        }
    }

    /// Whether the caller may simply retry later.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::TrackingPending | Self::SkydropxRateLimited | Self::SkydropxUpstreamError
        )
    }
}

impl std::fmt::Display for ShippingErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_matches_as_str() {
        for code in [
            ShippingErrorCode::OrderNotFound,
            ShippingErrorCode::MissingShipmentId,
            ShippingErrorCode::InvalidShippingPayload,
            ShippingErrorCode::SkydropxUnauthorized,
            ShippingErrorCode::SkydropxNotFound,
            ShippingErrorCode::SkydropxBadRequest,
            ShippingErrorCode::SkydropxUnprocessableEntity,
            ShippingErrorCode::SkydropxRateLimited,
            ShippingErrorCode::SkydropxUpstreamError,
            ShippingErrorCode::TrackingPending,
            ShippingErrorCode::ConfigError,
            ShippingErrorCode::UnknownError,
        ] {
            let json = serde_json::to_value(code).unwrap();
            assert_eq!(json, serde_json::Value::String(code.as_str().to_string()));
        }
    }

    #[test]
    fn test_tracking_pending_is_retryable() {
        assert!(ShippingErrorCode::TrackingPending.is_retryable());
        assert!(!ShippingErrorCode::OrderNotFound.is_retryable());
    }
}
