//! Shipping write-path orchestrators.
//!
//! Every orchestrator follows the same steps:
//!
//! 1. Resolve the order
//! 2. Extract facts from the provider payload or response
//! 3. Diff the facts against the stored columns; skip the write if nothing changed
//! 4. Re-read the order and run the candidate through `nopal_core::shipping::reconcile`
//! 5. Persist the document and its mirror columns in one statement
//! 6. Re-read and verify (logged only)
//! 7. Notify the customer when a label became available in this call
//!
//! The webhook path additionally records every delivery in the event log so
//! redeliveries are no-ops.

pub mod apply_rate;
pub mod error;
pub mod label;
pub mod notify;
pub mod persist;
pub mod ports;
pub mod resolve;
pub mod sync;
pub mod webhook;

pub use apply_rate::RateOutcome;
pub use error::ShippingError;
pub use label::LabelOutcome;
pub use ports::{
    EventLog, Notifier, NotifyOutcome, OrderRecord, OrderStore, OrderWrite, ShipmentProvider,
    ShippingNotice,
};
pub use resolve::{Lookup, ResolveStrategy, Resolved, resolve_order};
pub use sync::SyncOutcome;
pub use webhook::WebhookOutcome;

use nopal_core::OrderId;

use crate::config::{OriginAddress, ShippingSettings};

/// Route names recorded in `_last_write.route`.
pub mod routes {
    pub const WEBHOOK: &str = "webhook";
    pub const SYNC_LABEL: &str = "sync_label";
    pub const CREATE_LABEL: &str = "create_label";
    pub const APPLY_RATE: &str = "apply_rate";
}

/// The shipping orchestrators and their collaborators.
pub struct ShippingService<S, L, P, N> {
    store: S,
    events: L,
    provider: Option<(P, OriginAddress)>,
    notifier: N,
    settings: ShippingSettings,
}

impl<S, L, P, N> ShippingService<S, L, P, N>
where
    S: OrderStore,
    L: EventLog,
    P: ShipmentProvider,
    N: Notifier,
{
    /// Create a service without a provider; provider-dependent actions fail with `config_error`.
    #[must_use]
    pub const fn new(store: S, events: L, notifier: N, settings: ShippingSettings) -> Self {
        Self {
            store,
            events,
            provider: None,
            notifier,
            settings,
        }
    }

    /// Attach the shipping provider and the ship-from address it needs.
    #[must_use]
    pub fn with_provider(mut self, provider: P, origin: OriginAddress) -> Self {
        self.provider = Some((provider, origin));
        self
    }

    /// Attach the provider if one is configured.
    #[must_use]
    pub fn with_optional_provider(self, provider: Option<(P, OriginAddress)>) -> Self {
        match provider {
            Some((provider, origin)) => self.with_provider(provider, origin),
            None => self,
        }
    }

    #[must_use]
    pub const fn settings(&self) -> &ShippingSettings {
        &self.settings
    }

    fn provider(&self) -> Result<(&P, &OriginAddress), ShippingError> {
        self.provider
            .as_ref()
            .map(|(provider, origin)| (provider, origin))
            .ok_or_else(|| ShippingError::Config("Skydropx credentials are not configured".to_string()))
    }

    async fn load(&self, order_id: OrderId) -> Result<OrderRecord, ShippingError> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or_else(|| ShippingError::OrderNotFound(order_id.to_string()))
    }
}
