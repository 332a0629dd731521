//! Unified error handling for admin.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::services::shipping::ShippingError;

/// Application-level error type for the admin service.
#[derive(Debug, Error)]
pub enum AppError {
    /// A shipping action failed; rendered as `{ok: false, code, message}`.
    #[error(transparent)]
    Shipping(#[from] ShippingError),

    /// Caller is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::Shipping(err) => {
                if err.is_server_fault() {
                    report(&err);
                }
                shipping_error_response(&err)
            }
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, self.to_string()).into_response(),
            Self::Internal(_) => {
                report(&self);
                // Don't expose internal error details to clients
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}

fn report(err: &(dyn std::error::Error + 'static)) {
    let event_id = sentry::capture_error(err);
    tracing::error!(
        error = %err,
        sentry_event_id = %event_id,
        "Admin request error"
    );
}

fn shipping_error_response(err: &ShippingError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let code = err.code();
    // Storage errors carry SQL details
    let message = if matches!(err, ShippingError::Repository(_)) {
        "Internal server error".to_string()
    } else {
        err.to_string()
    };

    let mut body = json!({
        "ok": false,
        "code": code,
        "message": message,
        "retryable": code.is_retryable(),
    });
    if let Some(fields) = err.missing_fields() {
        body["missingFields"] = json!(fields);
    }
    if let ShippingError::TrackingPending {
        shipment_id: Some(shipment_id),
    } = err
    {
        body["shipmentId"] = json!(shipment_id);
    }

    (status, Json(body)).into_response()
}
