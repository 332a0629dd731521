//! Shipping webhook and admin action routes.
//!
//! Admin actions answer with `{ok: true, ...}` on success and
//! `{ok: false, code, message, missingFields?}` on failure (see [`AppError`]).

use axum::{
    Json, Router,
    extract::{FromRequest, Request, State, rejection::JsonRejection},
    http::{HeaderMap, header},
    routing::post,
};
use nopal_core::OrderId;
use nopal_core::shipping::RateSelection;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use subtle::ConstantTimeEq;
use tracing::{info, instrument, warn};

use crate::config::AppEnvironment;
use crate::error::AppError;
use crate::services::ShippingError;
use crate::services::shipping::WebhookOutcome;
use crate::state::AppState;

/// Header carrying the webhook shared secret.
pub const WEBHOOK_SECRET_HEADER: &str = "x-skydropx-secret";

/// Create shipping routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/shipping/webhooks/skydropx", post(skydropx_webhook))
        .route("/api/orders/shipping/sync", post(sync_shipping))
        .route("/api/orders/shipping/label", post(create_label))
        .route("/api/orders/shipping/rate", post(apply_rate))
}

/// Body of the order-scoped admin actions.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderActionRequest {
    #[serde(default)]
    pub order_id: Option<String>,
}

/// Body of `POST /api/orders/shipping/rate`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRateRequest {
    #[serde(default)]
    pub order_id: Option<String>,
    pub rate: RateSelection,
}

/// [`Json`] whose rejection is answered with the shipping error body.
#[derive(Debug)]
pub struct ActionJson<T>(pub T);

impl<S, T> FromRequest<S> for ActionJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                warn!(status = %rejection.status(), "Rejected shipping action body");
                Err(ShippingError::MalformedBody(rejection.body_text()).into())
            }
        }
    }
}

fn parse_order_id(raw: Option<&str>) -> Result<OrderId, ShippingError> {
    let raw = raw
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ShippingError::invalid_payload(&["orderId"]))?;
    // A malformed id cannot name an existing order.
    OrderId::parse(raw).map_err(|_| ShippingError::OrderNotFound(raw.to_string()))
}

/// Serialize an outcome and mark it `ok: true`.
fn ok_body<T: Serialize>(outcome: &T) -> Result<Json<Value>, AppError> {
    let mut body = serde_json::to_value(outcome)
        .map_err(|e| AppError::Internal(format!("Failed to serialize response: {e}")))?;
    match body.as_object_mut() {
        Some(map) => {
            map.insert("ok".to_string(), Value::Bool(true));
            Ok(Json(body))
        }
        None => Ok(Json(json!({ "ok": true, "result": body }))),
    }
}

/// The secret presented by the sender, from either accepted header.
fn presented_secret(headers: &HeaderMap) -> Option<&str> {
    if let Some(secret) = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        return Some(secret.trim());
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Check the webhook shared secret.
///
/// Without a configured secret, production rejects every delivery while
/// development accepts it with a warning.
///
/// # Errors
///
/// Returns `AppError::Unauthorized` when the secret is missing or wrong.
pub fn verify_webhook_secret(
    headers: &HeaderMap,
    expected: Option<&SecretString>,
    environment: AppEnvironment,
) -> Result<(), AppError> {
    let Some(expected) = expected else {
        if environment.is_production() {
            return Err(AppError::Unauthorized(
                "Webhook secret is not configured".into(),
            ));
        }
        warn!("SKYDROPX_WEBHOOK_SECRET not set, accepting unauthenticated webhook");
        return Ok(());
    };

    let presented = presented_secret(headers)
        .ok_or_else(|| AppError::Unauthorized("Missing webhook secret".into()))?;

    let matches: bool = presented
        .as_bytes()
        .ct_eq(expected.expose_secret().as_bytes())
        .into();
    if matches {
        Ok(())
    } else {
        Err(AppError::Unauthorized("Invalid webhook secret".into()))
    }
}

/// Receive a Skydropx shipment event.
///
/// Once authenticated the sender always gets a 200 so that processing
/// failures do not trigger redelivery storms.
#[instrument(skip(state, headers, body))]
async fn skydropx_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<Value>, AppError> {
    let config = state.config();
    verify_webhook_secret(&headers, config.webhook_secret.as_ref(), config.environment)?;

    let outcome = match serde_json::from_str::<Value>(&body) {
        Ok(payload) => state.shipping().handle_webhook(&payload).await,
        Err(e) => {
            warn!(error = %e, "Webhook body is not JSON");
            WebhookOutcome::Ignored {
                reason: "invalid_json",
            }
        }
    };

    let mut body = ok_body(&outcome)?;
    if matches!(outcome, WebhookOutcome::Failed { .. }) {
        body.0["ok"] = Value::Bool(false);
    }
    Ok(body)
}

/// Pull the latest shipment state for an order from Skydropx.
#[instrument(skip(state, request))]
async fn sync_shipping(
    State(state): State<AppState>,
    ActionJson(request): ActionJson<OrderActionRequest>,
) -> Result<Json<Value>, AppError> {
    let order_id = parse_order_id(request.order_id.as_deref())?;
    let outcome = state.shipping().sync_order(order_id).await?;
    info!(order_id = %order_id, written = outcome.written, "Sync requested");
    ok_body(&outcome)
}

/// Buy a label for an order (at most once).
#[instrument(skip(state, request))]
async fn create_label(
    State(state): State<AppState>,
    ActionJson(request): ActionJson<OrderActionRequest>,
) -> Result<Json<Value>, AppError> {
    let order_id = parse_order_id(request.order_id.as_deref())?;
    let outcome = state.shipping().create_label(order_id).await?;
    ok_body(&outcome)
}

/// Store a selected rate on an order.
#[instrument(skip(state, request))]
async fn apply_rate(
    State(state): State<AppState>,
    ActionJson(request): ActionJson<ApplyRateRequest>,
) -> Result<Json<Value>, AppError> {
    let order_id = parse_order_id(request.order_id.as_deref())?;
    let outcome = state.shipping().apply_rate(order_id, &request.rate).await?;
    ok_body(&outcome)
}
