//! `SkydropxClient` against a local mock of the Skydropx API.
//!
//! Each test stands up its own `wiremock` server; no real network traffic is made.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use nopal_admin::skydropx::{
    CreateShipmentInput, ProviderErrorKind, ShipmentAddress, SkydropxClient, SkydropxError,
};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> SkydropxClient {
    SkydropxClient::with_base_url(
        Url::parse(&server.uri()).unwrap(),
        "client-id",
        SecretString::from("client-secret"),
    )
    .unwrap()
}

async fn mount_token(server: &MockServer, token: &str, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/api/v1/oauth/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": token, "expires_in": 7200})),
        )
        .expect(expected_calls)
        .mount(server)
        .await;
}

fn address(name: &str) -> ShipmentAddress {
    ShipmentAddress {
        name: name.to_string(),
        street1: "Av. Constitucion 100".to_string(),
        state: "Nuevo Leon".to_string(),
        city: "Monterrey".to_string(),
        postal_code: "64000".to_string(),
        country_code: "MX".to_string(),
        phone: "8111111111".to_string(),
        email: "ana@example.com".to_string(),
        ..ShipmentAddress::default()
    }
}

#[tokio::test]
async fn test_token_is_fetched_once_and_reused() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-1", 1).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/shipments/shp_1"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"id": "shp_1"}})))
        .expect(2)
        .mount(&server)
        .await;

    let client = client(&server);
    let first = client.get_shipment("shp_1").await.unwrap();
    let second = client.get_shipment("shp_1").await.unwrap();

    assert_eq!(first["data"]["id"], json!("shp_1"));
    assert_eq!(first, second);
    assert!(client.has_valid_token().await);
}

#[tokio::test]
async fn test_rejected_token_is_refreshed_once() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-1", 2).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/shipments/shp_1"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/shipments/shp_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"id": "shp_1"}})))
        .mount(&server)
        .await;

    let shipment = client(&server).get_shipment("shp_1").await.unwrap();

    assert_eq!(shipment["data"]["id"], json!("shp_1"));
}

#[tokio::test]
async fn test_second_401_is_reported() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-1", 2).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/shipments/shp_1"))
        .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
        .expect(2)
        .mount(&server)
        .await;

    let err = client(&server).get_shipment("shp_1").await.unwrap_err();

    assert_eq!(err.kind(), ProviderErrorKind::Unauthorized);
}

#[tokio::test]
async fn test_rejected_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/oauth/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
        .mount(&server)
        .await;

    let err = client(&server).get_shipment("shp_1").await.unwrap_err();

    assert!(
        matches!(err, SkydropxError::AuthenticationFailed(ref message) if message.contains("invalid_client")),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
async fn test_rate_limit_reads_retry_after() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-1", 1).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/shipments/shp_1"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "12"))
        .mount(&server)
        .await;

    let err = client(&server).get_shipment("shp_1").await.unwrap_err();

    assert!(matches!(err, SkydropxError::RateLimited(12)), "unexpected error: {err:?}");
    assert_eq!(err.kind(), ProviderErrorKind::RateLimited);
}

#[tokio::test]
async fn test_error_statuses_are_classified() {
    let cases = [
        (404, ProviderErrorKind::NotFound),
        (422, ProviderErrorKind::UnprocessableEntity),
        (503, ProviderErrorKind::Upstream),
    ];

    for (status, expected) in cases {
        let server = MockServer::start().await;
        mount_token(&server, "tok-1", 1).await;
        Mock::given(method("GET"))
            .and(path("/api/v1/shipments/shp_1"))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .mount(&server)
            .await;

        let err = client(&server).get_shipment("shp_1").await.unwrap_err();

        assert_eq!(err.kind(), expected, "status {status}");
        assert!(err.to_string().contains("nope"));
    }
}

#[tokio::test]
async fn test_create_shipment_sends_rate_and_addresses() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-1", 1).await;
    Mock::given(method("POST"))
        .and(path("/api/v1/shipments"))
        .and(header("authorization", "Bearer tok-1"))
        .and(body_partial_json(json!({
            "shipment": {
                "rate_id": "rate_1",
                "printing_format": "standard",
                "reference": "order-1",
                "address_to": {"name": "Ana Lopez", "area_level1": "Nuevo Leon"}
            }
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "data": {
                "id": "shp_9",
                "attributes": {"workflow_status": "in_progress"}
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let input = CreateShipmentInput {
        rate_id: "rate_1".to_string(),
        address_from: address("Nopal Warehouse"),
        address_to: address("Ana Lopez"),
        reference: "order-1".to_string(),
    };
    let created = client(&server).create_shipment(&input).await.unwrap();

    assert_eq!(created.shipment_id.as_deref(), Some("shp_9"));
    assert_eq!(created.polling.as_deref(), Some("in_progress"));
    assert!(!created.has_tracking());
}

#[tokio::test]
async fn test_token_value_is_exposed_only_on_request() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-secret", 1).await;

    let token = client(&server).get_valid_token().await.unwrap();

    assert_eq!(token.expose_secret(), "tok-secret");
    assert!(!format!("{token:?}").contains("tok-secret"));
}
