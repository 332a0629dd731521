//! Label purchase with one-shot semantics.
//!
//! Buying a label costs money, so two concurrent requests for the same order
//! must never both reach the provider:
//!
//! 1. Orders that already have a tracking number are returned as-is
//! 2. Orders that already have a shipment are synced, not re-purchased
//! 3. A conditional claim (`label_creation.status = in_progress`) admits one caller
//! 4. The final write only lands while the tracking number is still null

use chrono::{Duration, Utc};
use nopal_core::OrderId;
use nopal_core::shipping::doc::{non_empty_string, rate_used};
use nopal_core::shipping::label;
use nopal_core::shipping::{MirrorColumns, ShipmentFacts, ShippingStatus, merge_facts};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::persist::WriteMode;
use super::ports::{EventLog, Notifier, NotifyOutcome, OrderRecord, OrderStore, ShipmentProvider};
use super::sync::stored_shipment_id;
use super::{ShippingError, ShippingService, routes};
use crate::config::OriginAddress;
use crate::skydropx::{CreateShipmentInput, CreatedShipment, ShipmentAddress};

/// Result of a label request that produced (or found) a tracking number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelOutcome {
    pub order_id: OrderId,
    pub shipment_id: Option<String>,
    pub tracking_number: Option<String>,
    pub label_url: Option<String>,
    /// The label existed before this call (or a concurrent call stored it).
    pub already_existed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<NotifyOutcome>,
}

impl LabelOutcome {
    fn from_order(order: &OrderRecord, already_existed: bool, notification: Option<NotifyOutcome>) -> Self {
        let nested = MirrorColumns::from_metadata(&order.metadata);
        Self {
            order_id: order.id,
            shipment_id: order.shipping_shipment_id.clone().or(nested.shipment_id),
            tracking_number: order.shipping_tracking_number.clone().or(nested.tracking_number),
            label_url: order.shipping_label_url.clone().or(nested.label_url),
            already_existed,
            notification,
        }
    }
}

fn stored_tracking_number(order: &OrderRecord) -> Option<String> {
    order
        .shipping_tracking_number
        .clone()
        .filter(|t| !t.trim().is_empty())
        .or_else(|| MirrorColumns::from_metadata(&order.metadata).tracking_number)
}

/// Facts implied by a create-shipment response.
fn created_facts(created: &CreatedShipment) -> ShipmentFacts {
    let status = if created.label_url.is_some() {
        ShippingStatus::LabelCreated
    } else {
        ShippingStatus::LabelPending
    };
    ShipmentFacts {
        shipment_id: created.shipment_id.clone(),
        tracking_number: created.tracking_number.clone(),
        label_url: created.label_url.clone(),
        status: Some(status),
        raw_status: created.polling.clone(),
    }
}

/// Assemble the provider request for an order.
///
/// # Errors
///
/// Returns `ShippingError::InvalidPayload` listing every blank required field.
pub fn build_label_request(
    order: &OrderRecord,
    origin: &OriginAddress,
) -> Result<CreateShipmentInput, ShippingError> {
    let rate_id = rate_used(&order.metadata)
        .and_then(|rate| non_empty_string(rate.get("external_rate_id")))
        .unwrap_or_default();
    let input = CreateShipmentInput {
        rate_id,
        address_from: ShipmentAddress::from_origin(origin),
        address_to: ShipmentAddress::from_order_json(
            &order.shipping_address,
            order.customer_email.as_deref(),
        ),
        reference: order.id.to_string(),
    };

    let missing = input.validate();
    if missing.is_empty() {
        Ok(input)
    } else {
        Err(ShippingError::invalid_payload(&missing))
    }
}

impl<S, L, P, N> ShippingService<S, L, P, N>
where
    S: OrderStore,
    L: EventLog,
    P: ShipmentProvider,
    N: Notifier,
{
    /// Purchase a label for an order, at most once.
    ///
    /// # Errors
    ///
    /// - `OrderNotFound`, `Config`, `InvalidPayload` before any provider call
    /// - `TrackingPending` when another request holds the claim, or when the
    ///   provider accepted the shipment without a tracking number yet
    /// - `Provider` with the classified failure (recorded as `label_creation.status = failed`)
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn create_label(&self, order_id: OrderId) -> Result<LabelOutcome, ShippingError> {
        let order = self.load(order_id).await?;

        if stored_tracking_number(&order).is_some() {
            info!("Label already exists");
            return Ok(LabelOutcome::from_order(&order, true, None));
        }

        if stored_shipment_id(&order).is_some() {
            info!("Order already has a shipment, syncing instead of purchasing");
            let synced = self.sync_order(order_id).await?;
            return Ok(LabelOutcome {
                order_id,
                shipment_id: Some(synced.shipment_id),
                tracking_number: synced.tracking_number,
                label_url: synced.label_url,
                already_existed: true,
                notification: synced.notification,
            });
        }

        let (provider, origin) = self.provider()?;
        let input = build_label_request(&order, origin)?;

        let now = Utc::now();
        let request_id = Uuid::new_v4().to_string();
        let stale_before = now - Duration::seconds(self.settings.label_claim_stale_secs);

        if !self
            .store
            .claim_label(order_id, &label::claim(&request_id, now), stale_before)
            .await?
        {
            info!("Label claim held by another request");
            return Err(ShippingError::TrackingPending { shipment_id: None });
        }

        let created = match provider.create_shipment(&input).await {
            Ok(created) => created,
            Err(err) => {
                let code = err.kind().code();
                warn!(error = %err, code = %code, request_id = %request_id, "Label purchase failed");
                if let Err(record_err) = self
                    .persist(order_id, routes::CREATE_LABEL, WriteMode::Always, |fresh| {
                        label::mark_failed(fresh.metadata.clone(), code, Utc::now())
                    })
                    .await
                {
                    warn!(error = %record_err, "Could not record failed label attempt");
                }
                return Err(err.into());
            }
        };

        let facts = created_facts(&created);
        let finished = Utc::now();

        if !created.has_tracking() {
            self.persist(order_id, routes::CREATE_LABEL, WriteMode::Always, |fresh| {
                label::mark_pending(merge_facts(fresh.metadata.clone(), &facts, finished))
            })
            .await?;
            info!(
                shipment_id = created.shipment_id.as_deref().unwrap_or("none"),
                polling = created.polling.as_deref().unwrap_or("none"),
                "Shipment created, tracking pending"
            );
            return Err(ShippingError::TrackingPending {
                shipment_id: created.shipment_id,
            });
        }

        let persisted = self
            .persist(order_id, routes::CREATE_LABEL, WriteMode::IfUntracked, |fresh| {
                let merged = merge_facts(fresh.metadata.clone(), &facts, finished);
                if facts.label_url.is_some() {
                    merged
                } else {
                    label::mark_pending(merged)
                }
            })
            .await?;

        if !persisted.written {
            if stored_tracking_number(&persisted.after).is_some() {
                warn!("Concurrent writer stored a tracking number first");
                return Ok(LabelOutcome::from_order(&persisted.after, true, None));
            }
            return Err(ShippingError::Unknown(
                "label write was rejected but no tracking number is stored".to_string(),
            ));
        }

        let notification = self.notify_if_label_ready(&persisted).await;
        info!(
            tracking_number = created.tracking_number.as_deref().unwrap_or("none"),
            "Label created"
        );
        Ok(LabelOutcome::from_order(&persisted.after, false, notification))
    }
}
