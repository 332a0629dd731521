//! One order through apply-rate, label purchase and sync.
//!
//! Runs the orchestrators against the in-memory fakes, so every write goes
//! through the real reconcile pipeline and the store's write guards.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use chrono::{Duration, Utc};
use nopal_admin::services::ShippingError;
use nopal_core::shipping::RateSelection;
use nopal_core::{OrderId, ShippingErrorCode};
use nopal_integration_tests::{Harness, order};
use serde_json::{Value, json};

fn rate(carrier_cents: i64, total_cents: i64) -> RateSelection {
    RateSelection {
        external_rate_id: "rate_1".to_string(),
        provider: "fedex".to_string(),
        service: "express".to_string(),
        carrier_cents,
        packaging_cents: 2000,
        margin_cents: 3671,
        total_cents: Some(total_cents),
        selection_source: Some("checkout".to_string()),
    }
}

fn shipment_response(shipment_id: &str, tracking: &str, label_url: &str) -> Value {
    json!({
        "data": {
            "id": shipment_id,
            "attributes": {
                "status": "label_created",
                "tracking_number": tracking,
                "label_url": label_url
            }
        }
    })
}

fn seeded() -> (Harness, OrderId) {
    let harness = Harness::new();
    let order = order(json!({
        "shipping": {
            "rate_used": {"price_cents": null, "carrier_cents": null, "customer_total_cents": null}
        }
    }));
    let id = order.id;
    harness.store.insert(order);
    (harness, id)
}

fn rate_used(harness: &Harness, id: OrderId) -> Value {
    harness.store.get(id).unwrap().metadata["shipping"]["rate_used"].clone()
}

// =============================================================================
// Rate, then label, then a new rate
// =============================================================================

#[tokio::test]
async fn test_apply_rate_fills_rate_used_from_pricing() {
    let (harness, id) = seeded();

    let outcome = harness
        .service()
        .apply_rate(id, &rate(14964, 21635))
        .await
        .unwrap();

    assert_eq!(outcome.pricing.total_cents, Some(21635));
    let stored = rate_used(&harness, id);
    assert_eq!(stored["price_cents"], json!(21635));
    assert_eq!(stored["carrier_cents"], json!(14964));
    assert_eq!(stored["customer_total_cents"], json!(21635));
    assert_eq!(stored["external_rate_id"], json!("rate_1"));
}

#[tokio::test]
async fn test_sync_after_rate_keeps_rate_used_and_marks_label_created() {
    let (harness, id) = seeded();
    let service = harness.service();
    service.apply_rate(id, &rate(14964, 21635)).await.unwrap();
    let before = rate_used(&harness, id);

    harness
        .store
        .modify(id, |o| o.shipping_shipment_id = Some("shp_1".to_string()));
    harness.provider.set_shipment(shipment_response(
        "shp_1",
        "TRK1",
        "https://labels.example/1.pdf",
    ));

    let outcome = service.sync_order(id).await.unwrap();
    assert_eq!(outcome.tracking_number.as_deref(), Some("TRK1"));
    assert!(outcome.written);

    let stored = harness.store.get(id).unwrap();
    assert_eq!(stored.metadata["shipping"]["rate_used"], before);
    assert_eq!(
        stored.metadata["shipping"]["label_creation"]["status"],
        json!("created")
    );
    assert_eq!(stored.shipping_tracking_number.as_deref(), Some("TRK1"));
    assert_eq!(
        stored.shipping_label_url.as_deref(),
        Some("https://labels.example/1.pdf")
    );
    assert_eq!(
        stored.metadata["shipping"]["_last_write"]["route"],
        json!("sync_label")
    );
    assert_eq!(harness.notifier.sent().len(), 1);
}

#[tokio::test]
async fn test_new_rate_replaces_carrier_cents() {
    let (harness, id) = seeded();
    let service = harness.service();
    service.apply_rate(id, &rate(14964, 21635)).await.unwrap();

    service.apply_rate(id, &rate(15338, 22009)).await.unwrap();

    let stored = rate_used(&harness, id);
    assert_eq!(stored["carrier_cents"], json!(15338));
    assert_eq!(stored["price_cents"], json!(22009));
}

#[tokio::test]
async fn test_apply_rate_rejects_blank_identity() {
    let (harness, id) = seeded();
    let mut selection = rate(14964, 21635);
    selection.external_rate_id = " ".to_string();

    let err = harness
        .service()
        .apply_rate(id, &selection)
        .await
        .unwrap_err();

    assert_eq!(err.code(), ShippingErrorCode::InvalidShippingPayload);
    assert_eq!(err.missing_fields().unwrap(), ["external_rate_id"]);
    assert_eq!(harness.store.write_count(), 0);
}

#[tokio::test]
async fn test_write_error_after_commit_is_reconciled() {
    let (harness, id) = seeded();
    harness.store.fail_after_commit(1);

    let outcome = harness
        .service()
        .apply_rate(id, &rate(14964, 21635))
        .await
        .unwrap();

    assert_eq!(outcome.rate_used.price_cents, Some(21635));
    assert_eq!(rate_used(&harness, id)["price_cents"], json!(21635));
}

// =============================================================================
// Sync
// =============================================================================

#[tokio::test]
async fn test_sync_without_shipment_is_rejected_before_provider() {
    let (harness, id) = seeded();

    let err = harness.service().sync_order(id).await.unwrap_err();

    assert!(matches!(err, ShippingError::MissingShipmentId));
    assert_eq!(harness.provider.get_calls(), 0);
}

#[tokio::test]
async fn test_sync_unknown_order() {
    let harness = Harness::new();
    let err = harness
        .service()
        .sync_order(OrderId::generate())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ShippingErrorCode::OrderNotFound);
    assert_eq!(err.http_status(), 404);
}

#[tokio::test]
async fn test_sync_classifies_provider_not_found() {
    let (harness, id) = seeded();
    harness
        .store
        .modify(id, |o| o.shipping_shipment_id = Some("shp_gone".to_string()));
    harness.provider.fail_with(404);

    let err = harness.service().sync_order(id).await.unwrap_err();

    assert_eq!(err.code(), ShippingErrorCode::SkydropxNotFound);
    assert_eq!(harness.store.write_count(), 0);
}

#[tokio::test]
async fn test_sync_without_tracking_stores_status_and_reports_pending() {
    let (harness, id) = seeded();
    harness
        .store
        .modify(id, |o| o.shipping_shipment_id = Some("shp_1".to_string()));
    harness.provider.set_shipment(json!({
        "data": {"id": "shp_1", "attributes": {"status": "pending"}}
    }));

    let err = harness.service().sync_order(id).await.unwrap_err();

    assert!(matches!(
        err,
        ShippingError::TrackingPending { shipment_id: Some(ref s) } if s == "shp_1"
    ));
    let stored = harness.store.get(id).unwrap();
    assert_eq!(stored.shipping_status.as_deref(), Some("label_pending"));
    assert!(harness.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_sync_twice_notifies_once() {
    let (harness, id) = seeded();
    harness
        .store
        .modify(id, |o| o.shipping_shipment_id = Some("shp_1".to_string()));
    harness.provider.set_shipment(shipment_response(
        "shp_1",
        "TRK1",
        "https://labels.example/1.pdf",
    ));
    let service = harness.service();

    service.sync_order(id).await.unwrap();
    let second = service.sync_order(id).await.unwrap();

    assert!(second.changed.is_empty());
    assert!(!second.written);
    assert_eq!(harness.notifier.sent().len(), 1);
}

// =============================================================================
// Label purchase
// =============================================================================

async fn rated(harness: &Harness) -> OrderId {
    let order = order(json!({}));
    let id = order.id;
    harness.store.insert(order);
    harness
        .service()
        .apply_rate(id, &rate(14964, 21635))
        .await
        .unwrap();
    id
}

#[tokio::test]
async fn test_create_label_buys_once() {
    let harness = Harness::new();
    let id = rated(&harness).await;
    harness.provider.set_created(shipment_response(
        "shp_2",
        "TRK2",
        "https://labels.example/2.pdf",
    ));
    let service = harness.service();

    let first = service.create_label(id).await.unwrap();
    assert!(!first.already_existed);
    assert_eq!(first.tracking_number.as_deref(), Some("TRK2"));
    assert_eq!(first.shipment_id.as_deref(), Some("shp_2"));

    let second = service.create_label(id).await.unwrap();
    assert!(second.already_existed);
    assert_eq!(second.tracking_number.as_deref(), Some("TRK2"));

    assert_eq!(harness.provider.create_calls(), 1);
    assert_eq!(harness.notifier.sent().len(), 1);

    let input = harness.provider.last_input().unwrap();
    assert_eq!(input.rate_id, "rate_1");
    assert_eq!(input.address_to.name, "Ana Lopez");
    assert_eq!(input.address_to.email, "ana@example.com");
    assert_eq!(input.address_from.state, "Ciudad de Mexico");

    let stored = harness.store.get(id).unwrap();
    assert_eq!(
        stored.metadata["shipping"]["label_creation"]["status"],
        json!("created")
    );
    assert_eq!(stored.metadata["shipping"]["rate_used"]["price_cents"], json!(21635));
}

#[tokio::test]
async fn test_create_label_pending_then_sync_instead_of_rebuy() {
    let harness = Harness::new();
    let id = rated(&harness).await;
    harness.provider.set_created(json!({
        "data": {"id": "shp_3", "attributes": {"workflow_status": "in_progress"}}
    }));
    let service = harness.service();

    let err = service.create_label(id).await.unwrap_err();
    assert_eq!(err.code(), ShippingErrorCode::TrackingPending);
    assert_eq!(err.http_status(), 202);

    let stored = harness.store.get(id).unwrap();
    assert_eq!(stored.shipping_shipment_id.as_deref(), Some("shp_3"));
    assert_eq!(
        stored.metadata["shipping"]["label_creation"]["status"],
        json!("pending")
    );

    harness.provider.set_shipment(shipment_response(
        "shp_3",
        "TRK3",
        "https://labels.example/3.pdf",
    ));
    let outcome = service.create_label(id).await.unwrap();

    assert!(outcome.already_existed);
    assert_eq!(outcome.tracking_number.as_deref(), Some("TRK3"));
    assert_eq!(harness.provider.create_calls(), 1);
    assert_eq!(harness.provider.get_calls(), 1);
    assert_eq!(harness.notifier.sent().len(), 1);
}

#[tokio::test]
async fn test_create_label_lists_every_missing_field() {
    let harness = Harness::new();
    let mut bare = order(json!({}));
    bare.shipping_address = json!({"city": "Monterrey"});
    bare.customer_email = None;
    let id = bare.id;
    harness.store.insert(bare);

    let err = harness.service().create_label(id).await.unwrap_err();

    assert_eq!(err.code(), ShippingErrorCode::InvalidShippingPayload);
    let missing = err.missing_fields().unwrap();
    for field in [
        "rate_id",
        "address_to.name",
        "address_to.street1",
        "address_to.state",
        "address_to.postal_code",
        "address_to.phone",
        "address_to.email",
    ] {
        assert!(missing.iter().any(|m| m == field), "missing {field}");
    }
    assert!(!missing.iter().any(|m| m == "address_to.city"));
    assert_eq!(harness.provider.create_calls(), 0);
}

#[tokio::test]
async fn test_create_label_without_provider_is_config_error() {
    let harness = Harness::new();
    let id = rated(&harness).await;

    let err = harness
        .service_without_provider()
        .create_label(id)
        .await
        .unwrap_err();

    assert_eq!(err.code(), ShippingErrorCode::ConfigError);
}

#[tokio::test]
async fn test_create_label_respects_fresh_claim() {
    let harness = Harness::new();
    let id = rated(&harness).await;
    harness.store.modify(id, |o| {
        o.metadata["shipping"]["label_creation"] = json!({
            "status": "in_progress",
            "request_id": "other",
            "started_at": Utc::now().to_rfc3339()
        });
    });

    let err = harness.service().create_label(id).await.unwrap_err();

    assert!(matches!(err, ShippingError::TrackingPending { shipment_id: None }));
    assert_eq!(harness.provider.create_calls(), 0);
}

#[tokio::test]
async fn test_create_label_retakes_stale_claim() {
    let harness = Harness::new();
    let id = rated(&harness).await;
    harness.store.modify(id, |o| {
        o.metadata["shipping"]["label_creation"] = json!({
            "status": "in_progress",
            "request_id": "crashed",
            "started_at": (Utc::now() - Duration::hours(1)).to_rfc3339()
        });
    });
    harness.provider.set_created(shipment_response(
        "shp_4",
        "TRK4",
        "https://labels.example/4.pdf",
    ));

    let outcome = harness.service().create_label(id).await.unwrap();

    assert_eq!(outcome.tracking_number.as_deref(), Some("TRK4"));
    assert_eq!(harness.provider.create_calls(), 1);
}

#[tokio::test]
async fn test_create_label_records_provider_failure() {
    let harness = Harness::new();
    let id = rated(&harness).await;
    harness.provider.fail_with(422);

    let err = harness.service().create_label(id).await.unwrap_err();

    assert_eq!(err.code(), ShippingErrorCode::SkydropxUnprocessableEntity);
    assert_eq!(err.http_status(), 502);
    let stored = harness.store.get(id).unwrap();
    let label_creation = &stored.metadata["shipping"]["label_creation"];
    assert_eq!(label_creation["status"], json!("failed"));
    assert_eq!(
        label_creation["error_code"],
        json!("skydropx_unprocessable_entity")
    );
    assert!(stored.shipping_tracking_number.is_none());
}

#[tokio::test]
async fn test_failed_attempt_can_be_retried() {
    let harness = Harness::new();
    let id = rated(&harness).await;
    harness.provider.fail_with(429);
    let service = harness.service();

    let err = service.create_label(id).await.unwrap_err();
    assert_eq!(err.code(), ShippingErrorCode::SkydropxRateLimited);
    assert_eq!(err.http_status(), 429);

    let retry = Harness {
        provider: nopal_integration_tests::FakeProvider::default(),
        ..harness.clone()
    };
    retry.provider.set_created(shipment_response(
        "shp_5",
        "TRK5",
        "https://labels.example/5.pdf",
    ));
    let outcome = retry.service().create_label(id).await.unwrap();

    assert_eq!(outcome.tracking_number.as_deref(), Some("TRK5"));
    assert!(!outcome.already_existed);
}
