//! Errors surfaced by the shipping write paths.

use nopal_core::ShippingErrorCode;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::skydropx::SkydropxError;

/// Failure of a shipping orchestrator. Every variant maps to one stable code.
#[derive(Debug, Error)]
pub enum ShippingError {
    #[error("order not found: {0}")]
    OrderNotFound(String),

    #[error("order has no shipment yet")]
    MissingShipmentId,

    #[error("shipping payload is missing required fields: {}", missing_fields.join(", "))]
    InvalidPayload { missing_fields: Vec<String> },

    /// Request body could not be read as the expected JSON shape.
    #[error("malformed request body: {0}")]
    MalformedBody(String),

    #[error("shipping provider error: {0}")]
    Provider(#[from] SkydropxError),

    /// Provider accepted the request but has no tracking number yet.
    #[error("tracking number not available yet")]
    TrackingPending { shipment_id: Option<String> },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("{0}")]
    Unknown(String),
}

impl ShippingError {
    #[must_use]
    pub fn invalid_payload<S: ToString>(fields: &[S]) -> Self {
        Self::InvalidPayload {
            missing_fields: fields.iter().map(ToString::to_string).collect(),
        }
    }

    #[must_use]
    pub const fn code(&self) -> ShippingErrorCode {
        match self {
            Self::OrderNotFound(_) => ShippingErrorCode::OrderNotFound,
            Self::MissingShipmentId => ShippingErrorCode::MissingShipmentId,
            Self::InvalidPayload { .. } | Self::MalformedBody(_) => {
                ShippingErrorCode::InvalidShippingPayload
            }
            Self::Provider(err) => err.kind().code(),
            Self::TrackingPending { .. } => ShippingErrorCode::TrackingPending,
            Self::Config(_) => ShippingErrorCode::ConfigError,
            Self::Repository(_) | Self::Unknown(_) => ShippingErrorCode::UnknownError,
        }
    }

    /// HTTP status for the admin JSON response.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self.code() {
            ShippingErrorCode::OrderNotFound => 404,
            ShippingErrorCode::MissingShipmentId => 409,
            ShippingErrorCode::InvalidShippingPayload => 422,
            ShippingErrorCode::SkydropxRateLimited => 429,
            ShippingErrorCode::SkydropxUnauthorized
            | ShippingErrorCode::SkydropxNotFound
            | ShippingErrorCode::SkydropxBadRequest
            | ShippingErrorCode::SkydropxUnprocessableEntity
            | ShippingErrorCode::SkydropxUpstreamError => 502,
            ShippingErrorCode::TrackingPending => 202,
            ShippingErrorCode::ConfigError | ShippingErrorCode::UnknownError => 500,
        }
    }

    #[must_use]
    pub fn missing_fields(&self) -> Option<&[String]> {
        match self {
            Self::InvalidPayload { missing_fields } => Some(missing_fields),
            _ => None,
        }
    }

    /// Whether this should be reported to Sentry.
    #[must_use]
    pub const fn is_server_fault(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Repository(_) | Self::Unknown(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skydropx::ProviderErrorKind;

    #[test]
    fn test_provider_errors_keep_their_classification() {
        let err = ShippingError::from(SkydropxError::Api {
            kind: ProviderErrorKind::NotFound,
            status: 404,
            message: "missing".to_string(),
        });
        assert_eq!(err.code(), ShippingErrorCode::SkydropxNotFound);
        assert_eq!(err.http_status(), 502);

        let limited = ShippingError::from(SkydropxError::RateLimited(10));
        assert_eq!(limited.http_status(), 429);
    }

    #[test]
    fn test_invalid_payload_lists_fields() {
        let err = ShippingError::invalid_payload(&["rate_id", "address_to.phone"]);
        assert_eq!(err.code(), ShippingErrorCode::InvalidShippingPayload);
        assert_eq!(err.http_status(), 422);
        assert_eq!(
            err.to_string(),
            "shipping payload is missing required fields: rate_id, address_to.phone"
        );
        assert_eq!(err.missing_fields().map(<[String]>::len), Some(2));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ShippingError::OrderNotFound("x".to_string()).http_status(), 404);
        assert_eq!(ShippingError::MissingShipmentId.http_status(), 409);
        assert_eq!(
            ShippingError::TrackingPending { shipment_id: None }.http_status(),
            202
        );
        assert_eq!(ShippingError::Config("x".to_string()).http_status(), 500);
        assert!(ShippingError::Unknown("boom".to_string()).is_server_fault());
    }
}
