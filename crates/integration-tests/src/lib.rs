//! Integration test support for Nopal.
//!
//! In-memory implementations of every port the shipping write paths use, so
//! the orchestrators can be exercised end to end without Postgres, Skydropx
//! or SMTP.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p nopal-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `shipping_lifecycle` - apply-rate, sync and label scenarios over one order
//! - `shipping_webhooks` - resolution strategies, idempotency, notifications
//! - `skydropx_client` - provider client against a `wiremock` server

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use nopal_admin::config::{OriginAddress, ShippingSettings};
use nopal_admin::db::RepositoryError;
use nopal_admin::services::ShippingService;
use nopal_admin::services::shipping::{
    EventLog, Notifier, NotifyOutcome, OrderRecord, OrderStore, OrderWrite, ShipmentProvider,
    ShippingNotice,
};
use nopal_admin::skydropx::{CreateShipmentInput, CreatedShipment, ProviderErrorKind, SkydropxError};
use nopal_core::OrderId;
use nopal_core::shipping::label::{claim_started_at, label_creation_status};
use nopal_core::shipping::{LabelCreationStatus, MirrorColumns};
use serde_json::{Map, Value, json};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Service wired to the in-memory fakes.
pub type TestShipping =
    ShippingService<MemoryOrderStore, MemoryEventLog, FakeProvider, RecordingNotifier>;

/// Settings with a fixed code revision.
#[must_use]
pub fn settings() -> ShippingSettings {
    ShippingSettings {
        resolution_window: 200,
        label_claim_stale_secs: 300,
        code_revision: "test".to_string(),
    }
}

/// A complete ship-from address in Mexico City.
#[must_use]
pub fn origin() -> OriginAddress {
    OriginAddress {
        name: "Nopal Almacen".to_string(),
        street1: "Av. Insurgentes Sur 1602".to_string(),
        city: "Benito Juarez".to_string(),
        state: "CDMX".to_string(),
        postal_code: "03940".to_string(),
        phone: "5512345678".to_string(),
        email: "envios@nopal.example".to_string(),
        country: "MX".to_string(),
    }
}

/// A fresh order with a complete destination address and the given metadata.
#[must_use]
pub fn order(metadata: Value) -> OrderRecord {
    OrderRecord {
        id: OrderId::generate(),
        metadata,
        shipping_tracking_number: None,
        shipping_label_url: None,
        shipping_status: None,
        shipping_shipment_id: None,
        shipping_address: json!({
            "first_name": "Ana",
            "last_name": "Lopez",
            "address1": "Calle Reforma 10",
            "city": "Monterrey",
            "province": "Nuevo Leon",
            "zip": "64000",
            "phone": "8112345678"
        }),
        customer_email: Some("ana@example.com".to_string()),
        updated_at: Utc::now(),
    }
}

/// All fakes plus a way to build services over them.
#[derive(Clone, Default)]
pub struct Harness {
    pub store: MemoryOrderStore,
    pub events: MemoryEventLog,
    pub provider: FakeProvider,
    pub notifier: RecordingNotifier,
}

impl Harness {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Service with the fake provider attached.
    #[must_use]
    pub fn service(&self) -> TestShipping {
        self.service_without_provider()
            .with_provider(self.provider.clone(), origin())
    }

    /// Service whose provider-dependent actions fail with `config_error`.
    #[must_use]
    pub fn service_without_provider(&self) -> TestShipping {
        ShippingService::new(
            self.store.clone(),
            self.events.clone(),
            self.notifier.clone(),
            settings(),
        )
    }
}

// =============================================================================
// Order store
// =============================================================================

/// Orders held in memory with the same write guards as the Postgres repository.
#[derive(Clone, Default)]
pub struct MemoryOrderStore {
    orders: Arc<Mutex<Vec<OrderRecord>>>,
    writes: Arc<AtomicUsize>,
    failing_writes: Arc<AtomicUsize>,
    rejected_writes: Arc<AtomicUsize>,
}

impl MemoryOrderStore {
    pub fn insert(&self, order: OrderRecord) {
        lock(&self.orders).push(order);
    }

    #[must_use]
    pub fn get(&self, id: OrderId) -> Option<OrderRecord> {
        lock(&self.orders).iter().find(|o| o.id == id).cloned()
    }

    /// Successful shipping writes so far (claims excluded).
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make the next `count` shipping writes apply and then report an error,
    /// like a connection dropped after commit.
    pub fn fail_after_commit(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` unconditional writes fail without touching the row.
    pub fn reject_writes(&self, count: usize) {
        self.rejected_writes.store(count, Ordering::SeqCst);
    }

    /// Replace an order's stored state, bypassing the write path.
    pub fn modify(&self, id: OrderId, change: impl FnOnce(&mut OrderRecord)) {
        if let Some(order) = lock(&self.orders).iter_mut().find(|o| o.id == id) {
            change(order);
        }
    }

    fn find(&self, predicate: impl Fn(&OrderRecord) -> bool) -> Option<OrderRecord> {
        lock(&self.orders).iter().find(|o| predicate(o)).cloned()
    }

    fn find_recent(&self, window: i64, predicate: impl Fn(&OrderRecord) -> bool) -> Option<OrderRecord> {
        let mut orders = lock(&self.orders).clone();
        orders.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        orders
            .into_iter()
            .take(usize::try_from(window).unwrap_or(0))
            .find(|o| predicate(o))
    }

    fn write(&self, id: OrderId, write: &OrderWrite, only_untracked: bool) -> Option<OrderRecord> {
        let mut orders = lock(&self.orders);
        let order = orders.iter_mut().find(|o| o.id == id)?;
        if only_untracked && order.shipping_tracking_number.is_some() {
            return None;
        }
        order.metadata = write.metadata.clone();
        coalesce(&mut order.shipping_tracking_number, &write.mirrors.tracking_number);
        coalesce(&mut order.shipping_label_url, &write.mirrors.label_url);
        coalesce(&mut order.shipping_status, &write.mirrors.status);
        coalesce(&mut order.shipping_shipment_id, &write.mirrors.shipment_id);
        order.updated_at = Utc::now();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Some(order.clone())
    }

    fn take_failure(&self) -> bool {
        take_one(&self.failing_writes)
    }

    fn take_rejection(&self) -> bool {
        take_one(&self.rejected_writes)
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn coalesce(column: &mut Option<String>, value: &Option<String>) {
    if value.is_some() {
        column.clone_from(value);
    }
}

fn metadata_path<'a>(metadata: &'a Value, key: &str) -> Option<&'a str> {
    metadata.get("shipping")?.get(key)?.as_str()
}

impl OrderStore for MemoryOrderStore {
    async fn get_order(&self, id: OrderId) -> Result<Option<OrderRecord>, RepositoryError> {
        Ok(self.get(id))
    }

    async fn find_by_shipment_id(
        &self,
        shipment_id: &str,
    ) -> Result<Option<OrderRecord>, RepositoryError> {
        Ok(self.find(|o| o.shipping_shipment_id.as_deref() == Some(shipment_id)))
    }

    async fn find_by_metadata_shipment_id(
        &self,
        shipment_id: &str,
        window: i64,
    ) -> Result<Option<OrderRecord>, RepositoryError> {
        Ok(self.find_recent(window, |o| {
            metadata_path(&o.metadata, "shipment_id") == Some(shipment_id)
        }))
    }

    async fn find_by_tracking_number(
        &self,
        tracking_number: &str,
    ) -> Result<Option<OrderRecord>, RepositoryError> {
        Ok(self.find(|o| o.shipping_tracking_number.as_deref() == Some(tracking_number)))
    }

    async fn find_by_metadata_tracking_number(
        &self,
        tracking_number: &str,
        window: i64,
    ) -> Result<Option<OrderRecord>, RepositoryError> {
        Ok(self.find_recent(window, |o| {
            metadata_path(&o.metadata, "tracking_number") == Some(tracking_number)
        }))
    }

    async fn update_shipping(
        &self,
        id: OrderId,
        write: &OrderWrite,
    ) -> Result<OrderRecord, RepositoryError> {
        if self.take_rejection() {
            return Err(RepositoryError::DataCorruption(
                "connection reset before commit".to_string(),
            ));
        }
        let stored = self.write(id, write, false).ok_or(RepositoryError::NotFound)?;
        if self.take_failure() {
            return Err(RepositoryError::DataCorruption(
                "connection reset after commit".to_string(),
            ));
        }
        Ok(stored)
    }

    async fn update_shipping_if_untracked(
        &self,
        id: OrderId,
        write: &OrderWrite,
    ) -> Result<Option<OrderRecord>, RepositoryError> {
        Ok(self.write(id, write, true))
    }

    async fn claim_label(
        &self,
        id: OrderId,
        label_creation: &Value,
        stale_before: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut orders = lock(&self.orders);
        let Some(order) = orders.iter_mut().find(|o| o.id == id) else {
            return Ok(false);
        };
        let tracked = order.shipping_tracking_number.is_some()
            || MirrorColumns::from_metadata(&order.metadata).tracking_number.is_some();
        if tracked {
            return Ok(false);
        }

        let in_progress =
            label_creation_status(&order.metadata) == Some(LabelCreationStatus::InProgress);
        let started_at = claim_started_at(&order.metadata);
        if in_progress && started_at.is_none_or(|at| at >= stale_before) {
            return Ok(false);
        }

        let mut map = match std::mem::take(&mut order.metadata) {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let mut shipping = match map.remove("shipping") {
            Some(Value::Object(shipping)) => shipping,
            _ => Map::new(),
        };
        shipping.insert("label_creation".to_string(), label_creation.clone());
        map.insert("shipping".to_string(), Value::Object(shipping));
        order.metadata = Value::Object(map);
        order.updated_at = Utc::now();
        Ok(true)
    }
}

// =============================================================================
// Event log
// =============================================================================

/// Stored provider event.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    pub provider: String,
    pub provider_event_id: String,
    pub order_id: Option<OrderId>,
    pub payload: Value,
}

/// Event log with the `(provider, provider_event_id)` uniqueness constraint.
#[derive(Clone, Default)]
pub struct MemoryEventLog {
    keys: Arc<Mutex<HashSet<(String, String)>>>,
    events: Arc<Mutex<Vec<StoredEvent>>>,
}

impl MemoryEventLog {
    #[must_use]
    pub fn events(&self) -> Vec<StoredEvent> {
        lock(&self.events).clone()
    }
}

impl EventLog for MemoryEventLog {
    async fn insert_event_if_absent(
        &self,
        provider: &str,
        provider_event_id: &str,
        order_id: Option<OrderId>,
        payload: &Value,
    ) -> Result<bool, RepositoryError> {
        let inserted = lock(&self.keys).insert((provider.to_string(), provider_event_id.to_string()));
        if inserted {
            lock(&self.events).push(StoredEvent {
                provider: provider.to_string(),
                provider_event_id: provider_event_id.to_string(),
                order_id,
                payload: payload.clone(),
            });
        }
        Ok(inserted)
    }

    async fn remove_event(
        &self,
        provider: &str,
        provider_event_id: &str,
    ) -> Result<(), RepositoryError> {
        lock(&self.keys).remove(&(provider.to_string(), provider_event_id.to_string()));
        lock(&self.events)
            .retain(|e| e.provider != provider || e.provider_event_id != provider_event_id);
        Ok(())
    }
}

// =============================================================================
// Provider
// =============================================================================

#[derive(Default)]
struct ProviderState {
    shipment: Option<Value>,
    created: Option<Value>,
    failure: Option<(ProviderErrorKind, u16)>,
    get_calls: usize,
    create_calls: usize,
    last_input: Option<CreateShipmentInput>,
}

/// Scripted Skydropx stand-in.
#[derive(Clone, Default)]
pub struct FakeProvider {
    state: Arc<Mutex<ProviderState>>,
}

impl FakeProvider {
    /// Raw body returned by `get_shipment`.
    pub fn set_shipment(&self, response: Value) {
        lock(&self.state).shipment = Some(response);
    }

    /// Raw body returned by `create_shipment`.
    pub fn set_created(&self, response: Value) {
        lock(&self.state).created = Some(response);
    }

    /// Make every call fail with a classified provider error.
    pub fn fail_with(&self, status: u16) {
        lock(&self.state).failure = Some((ProviderErrorKind::from_status(status), status));
    }

    #[must_use]
    pub fn get_calls(&self) -> usize {
        lock(&self.state).get_calls
    }

    #[must_use]
    pub fn create_calls(&self) -> usize {
        lock(&self.state).create_calls
    }

    #[must_use]
    pub fn last_input(&self) -> Option<CreateShipmentInput> {
        lock(&self.state).last_input.clone()
    }

    fn failure(state: &ProviderState) -> Option<SkydropxError> {
        state.failure.map(|(kind, status)| SkydropxError::Api {
            kind,
            status,
            message: format!("scripted failure {status}"),
        })
    }
}

impl ShipmentProvider for FakeProvider {
    async fn get_shipment(&self, shipment_id: &str) -> Result<Value, SkydropxError> {
        let mut state = lock(&self.state);
        state.get_calls += 1;
        if let Some(err) = Self::failure(&state) {
            return Err(err);
        }
        state.shipment.clone().ok_or_else(|| SkydropxError::Api {
            kind: ProviderErrorKind::NotFound,
            status: 404,
            message: format!("shipment {shipment_id} not found"),
        })
    }

    async fn create_shipment(
        &self,
        input: &CreateShipmentInput,
    ) -> Result<CreatedShipment, SkydropxError> {
        let mut state = lock(&self.state);
        state.create_calls += 1;
        state.last_input = Some(input.clone());
        if let Some(err) = Self::failure(&state) {
            return Err(err);
        }
        let raw = state.created.clone().unwrap_or_else(|| json!({}));
        Ok(CreatedShipment::from_response(raw))
    }
}

// =============================================================================
// Notifier
// =============================================================================

/// Records every notice and reports it as sent.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<ShippingNotice>>>,
}

impl RecordingNotifier {
    #[must_use]
    pub fn sent(&self) -> Vec<ShippingNotice> {
        lock(&self.sent).clone()
    }
}

impl Notifier for RecordingNotifier {
    async fn send_shipping_created(&self, notice: &ShippingNotice) -> NotifyOutcome {
        lock(&self.sent).push(notice.clone());
        NotifyOutcome::sent()
    }
}
