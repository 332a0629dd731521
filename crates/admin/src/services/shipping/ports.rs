//! Collaborators of the shipping write paths.
//!
//! The orchestrators only talk to these traits. Production wires in the
//! Postgres repositories, the Skydropx client and the SMTP notifier; tests
//! wire in in-memory fakes.

use std::future::Future;

use chrono::{DateTime, Utc};
use nopal_core::OrderId;
use nopal_core::shipping::MirrorColumns;
use serde::Serialize;
use serde_json::Value;

use crate::db::RepositoryError;
use crate::skydropx::{CreateShipmentInput, CreatedShipment, SkydropxError};

/// An order row as the shipping write paths see it.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRecord {
    pub id: OrderId,
    pub metadata: Value,
    pub shipping_tracking_number: Option<String>,
    pub shipping_label_url: Option<String>,
    pub shipping_status: Option<String>,
    pub shipping_shipment_id: Option<String>,
    pub shipping_address: Value,
    pub customer_email: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl OrderRecord {
    /// The mirror columns as currently stored.
    #[must_use]
    pub fn columns(&self) -> MirrorColumns {
        MirrorColumns {
            tracking_number: self.shipping_tracking_number.clone(),
            label_url: self.shipping_label_url.clone(),
            status: self.shipping_status.clone(),
            shipment_id: self.shipping_shipment_id.clone(),
        }
    }
}

/// One shipping write: the reconciled document plus the columns derived from it.
///
/// Stores apply the columns with `COALESCE` semantics: a `None` never clears
/// a stored value.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderWrite {
    pub metadata: Value,
    pub mirrors: MirrorColumns,
}

/// Order persistence.
pub trait OrderStore: Send + Sync {
    fn get_order(
        &self,
        id: OrderId,
    ) -> impl Future<Output = Result<Option<OrderRecord>, RepositoryError>> + Send;

    /// Exact match on the `shipping_shipment_id` column.
    fn find_by_shipment_id(
        &self,
        shipment_id: &str,
    ) -> impl Future<Output = Result<Option<OrderRecord>, RepositoryError>> + Send;

    /// Match on `metadata.shipping.shipment_id` among the `window` most recently updated orders.
    fn find_by_metadata_shipment_id(
        &self,
        shipment_id: &str,
        window: i64,
    ) -> impl Future<Output = Result<Option<OrderRecord>, RepositoryError>> + Send;

    /// Exact match on the `shipping_tracking_number` column.
    fn find_by_tracking_number(
        &self,
        tracking_number: &str,
    ) -> impl Future<Output = Result<Option<OrderRecord>, RepositoryError>> + Send;

    /// Match on `metadata.shipping.tracking_number` among the `window` most recently updated orders.
    fn find_by_metadata_tracking_number(
        &self,
        tracking_number: &str,
        window: i64,
    ) -> impl Future<Output = Result<Option<OrderRecord>, RepositoryError>> + Send;

    /// Write metadata and mirror columns in one statement.
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist.
    fn update_shipping(
        &self,
        id: OrderId,
        write: &OrderWrite,
    ) -> impl Future<Output = Result<OrderRecord, RepositoryError>> + Send;

    /// Like [`OrderStore::update_shipping`], but only while the order has no
    /// tracking number. `Ok(None)` means a concurrent writer got there first.
    fn update_shipping_if_untracked(
        &self,
        id: OrderId,
        write: &OrderWrite,
    ) -> impl Future<Output = Result<Option<OrderRecord>, RepositoryError>> + Send;

    /// Take the one-shot label claim by storing `label_creation`.
    ///
    /// Succeeds only if the order has no tracking number and its current
    /// claim is not `in_progress` with a `started_at` after `stale_before`.
    fn claim_label(
        &self,
        id: OrderId,
        label_creation: &Value,
        stale_before: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send;
}

/// Log of provider events, keyed by `(provider, provider_event_id)`.
pub trait EventLog: Send + Sync {
    /// Insert unless `(provider, provider_event_id)` exists. Returns whether a row was inserted.
    fn insert_event_if_absent(
        &self,
        provider: &str,
        provider_event_id: &str,
        order_id: Option<OrderId>,
        payload: &Value,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send;

    /// Remove an event row so a redelivery of it is processed again.
    fn remove_event(
        &self,
        provider: &str,
        provider_event_id: &str,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;
}

/// The shipping provider API.
pub trait ShipmentProvider: Send + Sync {
    fn get_shipment(
        &self,
        shipment_id: &str,
    ) -> impl Future<Output = Result<Value, SkydropxError>> + Send;

    fn create_shipment(
        &self,
        input: &CreateShipmentInput,
    ) -> impl Future<Output = Result<CreatedShipment, SkydropxError>> + Send;
}

/// What the customer is told when their label is ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShippingNotice {
    pub order_id: OrderId,
    pub customer_email: Option<String>,
    pub tracking_number: Option<String>,
    pub label_url: Option<String>,
}

/// Result of a notification attempt. Never an error for the write path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotifyOutcome {
    pub ok: bool,
    pub sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NotifyOutcome {
    #[must_use]
    pub const fn sent() -> Self {
        Self {
            ok: true,
            sent: true,
            error: None,
        }
    }

    #[must_use]
    pub const fn skipped() -> Self {
        Self {
            ok: true,
            sent: false,
            error: None,
        }
    }

    #[must_use]
    pub const fn failed(error: String) -> Self {
        Self {
            ok: false,
            sent: false,
            error: Some(error),
        }
    }
}

/// Outbound customer notifications.
pub trait Notifier: Send + Sync {
    fn send_shipping_created(
        &self,
        notice: &ShippingNotice,
    ) -> impl Future<Output = NotifyOutcome> + Send;
}

impl ShipmentProvider for crate::skydropx::SkydropxClient {
    async fn get_shipment(&self, shipment_id: &str) -> Result<Value, SkydropxError> {
        Self::get_shipment(self, shipment_id).await
    }

    async fn create_shipment(
        &self,
        input: &CreateShipmentInput,
    ) -> Result<CreatedShipment, SkydropxError> {
        Self::create_shipment(self, input).await
    }
}
