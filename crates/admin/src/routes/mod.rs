//! HTTP route handlers for admin.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                          - Liveness
//! GET  /health/ready                    - Database readiness
//!
//! # Shipping
//! POST /api/shipping/webhooks/skydropx  - Provider webhook (shared secret)
//! POST /api/orders/shipping/sync        - Resync an order's shipment
//! POST /api/orders/shipping/label       - Buy a label (one-shot)
//! POST /api/orders/shipping/rate        - Apply a selected rate
//! ```

pub mod shipping;

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Router, routing::get};

use crate::state::AppState;

/// All admin routes, without state or middleware.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(shipping::router())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the database is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match sqlx::query("SELECT 1").fetch_one(state.pool()).await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use secrecy::SecretString;
    use serde_json::Value;
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    use crate::config::{AdminConfig, AppEnvironment, ShippingSettings};

    fn test_config(environment: AppEnvironment, webhook_secret: Option<&str>) -> AdminConfig {
        AdminConfig {
            database_url: SecretString::from("postgres://localhost/nopal_test"),
            host: "127.0.0.1".parse().unwrap(),
            port: 3001,
            environment,
            skydropx: None,
            webhook_secret: webhook_secret.map(SecretString::from),
            email: None,
            shipping: ShippingSettings::default(),
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.0,
            tls: None,
        }
    }

    /// Router over a lazy pool; requests that reach the database would fail.
    fn app(config: AdminConfig) -> Router {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/nopal_test")
            .unwrap();
        routes().with_state(AppState::new(config, pool).unwrap())
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app(test_config(AppEnvironment::Development, None))
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_webhook_rejected_without_secret_in_production() {
        let response = app(test_config(AppEnvironment::Production, None))
            .oneshot(post_json("/api/shipping/webhooks/skydropx", "{}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_webhook_rejected_with_wrong_secret() {
        let mut request = post_json("/api/shipping/webhooks/skydropx", "{}");
        request
            .headers_mut()
            .insert("x-skydropx-secret", "nope".parse().unwrap());
        let response = app(test_config(AppEnvironment::Development, Some("whsec-9f3kQ2mZ7x")))
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_webhook_acknowledges_non_json_body() {
        let mut request = post_json("/api/shipping/webhooks/skydropx", "not json");
        request
            .headers_mut()
            .insert("authorization", "Bearer whsec-9f3kQ2mZ7x".parse().unwrap());
        let response = app(test_config(AppEnvironment::Production, Some("whsec-9f3kQ2mZ7x")))
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["ok"], true);
        assert_eq!(body["result"], "ignored");
    }

    #[tokio::test]
    async fn test_sync_without_order_id_is_invalid_payload() {
        let response = app(test_config(AppEnvironment::Development, None))
            .oneshot(post_json("/api/orders/shipping/sync", "{}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(response).await;
        assert_eq!(body["ok"], false);
        assert_eq!(body["code"], "invalid_shipping_payload");
        assert_eq!(body["missingFields"], serde_json::json!(["orderId"]));
    }

    #[tokio::test]
    async fn test_label_with_malformed_order_id_is_not_found() {
        let response = app(test_config(AppEnvironment::Development, None))
            .oneshot(post_json(
                "/api/orders/shipping/label",
                r#"{"orderId":"order-123"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert_eq!(body["code"], "order_not_found");
    }

    #[tokio::test]
    async fn test_sync_with_non_json_body_is_invalid_payload() {
        let response = app(test_config(AppEnvironment::Development, None))
            .oneshot(post_json("/api/orders/shipping/sync", "not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(response).await;
        assert_eq!(body["ok"], false);
        assert_eq!(body["code"], "invalid_shipping_payload");
        assert_eq!(body["retryable"], false);
    }

    #[tokio::test]
    async fn test_rate_with_wrong_shape_is_invalid_payload() {
        let response = app(test_config(AppEnvironment::Development, None))
            .oneshot(post_json(
                "/api/orders/shipping/rate",
                r#"{"orderId":"9b2f7c1e-4a0d-4e55-8a57-0f4f3c1d2b6a","rate":"cheapest"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(response).await;
        assert_eq!(body["ok"], false);
        assert_eq!(body["code"], "invalid_shipping_payload");
        assert!(body["message"].as_str().unwrap().starts_with("malformed request body"));
    }
}
