//! Finding the order a provider event or response belongs to.

use serde::Serialize;
use tracing::debug;

use super::ports::{OrderRecord, OrderStore};
use crate::db::RepositoryError;

/// Which lookup located the order, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveStrategy {
    /// `shipping_shipment_id` column.
    ShipmentId,
    /// `metadata.shipping.shipment_id` on rows written before the column existed.
    MetadataLegacy,
    /// `shipping_tracking_number` column.
    TrackingNumber,
    /// `metadata.shipping.tracking_number`.
    TrackingMetadataLegacy,
}

impl ResolveStrategy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ShipmentId => "shipment_id",
            Self::MetadataLegacy => "metadata_legacy",
            Self::TrackingNumber => "tracking_number",
            Self::TrackingMetadataLegacy => "tracking_metadata_legacy",
        }
    }
}

impl std::fmt::Display for ResolveStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifiers a provider gave us.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lookup<'a> {
    pub shipment_id: Option<&'a str>,
    pub tracking_number: Option<&'a str>,
}

/// A located order.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub order: OrderRecord,
    pub strategy: ResolveStrategy,
}

fn usable(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Locate an order by shipment id, then by tracking number.
///
/// Legacy lookups only consider the `window` most recently updated orders.
///
/// # Errors
///
/// Returns `RepositoryError` if a lookup query fails.
pub async fn resolve_order<S: OrderStore>(
    store: &S,
    lookup: Lookup<'_>,
    window: i64,
) -> Result<Option<Resolved>, RepositoryError> {
    if let Some(shipment_id) = usable(lookup.shipment_id) {
        if let Some(order) = store.find_by_shipment_id(shipment_id).await? {
            return Ok(Some(found(order, ResolveStrategy::ShipmentId)));
        }
        if let Some(order) = store.find_by_metadata_shipment_id(shipment_id, window).await? {
            return Ok(Some(found(order, ResolveStrategy::MetadataLegacy)));
        }
    }

    if let Some(tracking_number) = usable(lookup.tracking_number) {
        if let Some(order) = store.find_by_tracking_number(tracking_number).await? {
            return Ok(Some(found(order, ResolveStrategy::TrackingNumber)));
        }
        if let Some(order) = store
            .find_by_metadata_tracking_number(tracking_number, window)
            .await?
        {
            return Ok(Some(found(order, ResolveStrategy::TrackingMetadataLegacy)));
        }
    }

    debug!(
        shipment_id = lookup.shipment_id.unwrap_or("none"),
        tracking_number = lookup.tracking_number.unwrap_or("none"),
        "No order matched shipping lookup"
    );
    Ok(None)
}

fn found(order: OrderRecord, strategy: ResolveStrategy) -> Resolved {
    debug!(order_id = %order.id, strategy = %strategy, "Resolved order");
    Resolved { order, strategy }
}
