//! Admin-triggered resync of an order's shipment from the provider.

use chrono::Utc;
use nopal_core::OrderId;
use nopal_core::shipping::{
    ExtractionStrategy, MirrorColumns, ShipmentFacts, changed_fields, merge_facts,
};
use serde::Serialize;
use tracing::{info, instrument};

use super::persist::WriteMode;
use super::ports::{EventLog, Notifier, NotifyOutcome, OrderRecord, OrderStore, ShipmentProvider};
use super::{ShippingError, ShippingService, routes};

/// Result of a successful sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub order_id: OrderId,
    pub shipment_id: String,
    pub tracking_number: Option<String>,
    pub label_url: Option<String>,
    pub status: Option<String>,
    pub strategy: ExtractionStrategy,
    /// Fields the provider changed; empty when the order was already current.
    pub changed: Vec<&'static str>,
    pub written: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<NotifyOutcome>,
}

/// The shipment id of an order, column first.
#[must_use]
pub fn stored_shipment_id(order: &OrderRecord) -> Option<String> {
    order
        .shipping_shipment_id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .or_else(|| MirrorColumns::from_metadata(&order.metadata).shipment_id)
}

impl<S, L, P, N> ShippingService<S, L, P, N>
where
    S: OrderStore,
    L: EventLog,
    P: ShipmentProvider,
    N: Notifier,
{
    /// Pull the current shipment state from the provider and store it.
    ///
    /// # Errors
    ///
    /// - `OrderNotFound` / `MissingShipmentId` before any provider call
    /// - `Config` when no provider is configured
    /// - `Provider` with the classified provider failure
    /// - `TrackingPending` when the provider has no tracking number yet (any
    ///   other change, such as a status, is still stored)
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn sync_order(&self, order_id: OrderId) -> Result<SyncOutcome, ShippingError> {
        let order = self.load(order_id).await?;
        let shipment_id = stored_shipment_id(&order).ok_or(ShippingError::MissingShipmentId)?;
        let (provider, _) = self.provider()?;

        let response = provider.get_shipment(&shipment_id).await?;
        let (mut facts, strategy) = ShipmentFacts::from_response(&response);
        if facts.shipment_id.is_none() {
            facts.shipment_id = Some(shipment_id.clone());
        }

        let changed = changed_fields(&facts, &order.columns(), &order.metadata);
        let (stored, written, notification) = if changed.is_empty() {
            (order, false, None)
        } else {
            let now = Utc::now();
            let persisted = self
                .persist(order_id, routes::SYNC_LABEL, WriteMode::Always, |fresh| {
                    merge_facts(fresh.metadata.clone(), &facts, now)
                })
                .await?;
            let notification = self.notify_if_label_ready(&persisted).await;
            (persisted.after, persisted.written, notification)
        };

        let nested = MirrorColumns::from_metadata(&stored.metadata);
        let tracking_number = stored.shipping_tracking_number.clone().or(nested.tracking_number);

        info!(
            strategy = %strategy,
            changed = ?changed,
            has_tracking = tracking_number.is_some(),
            "Shipment synced"
        );

        if tracking_number.is_none() {
            return Err(ShippingError::TrackingPending {
                shipment_id: Some(shipment_id),
            });
        }

        Ok(SyncOutcome {
            order_id,
            shipment_id,
            tracking_number,
            label_url: stored.shipping_label_url.clone().or(nested.label_url),
            status: stored.shipping_status.clone().or(nested.status),
            strategy,
            changed,
            written,
            notification,
        })
    }
}
