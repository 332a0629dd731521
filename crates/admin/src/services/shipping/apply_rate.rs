//! Applying a selected rate to an order.

use chrono::Utc;
use nopal_core::OrderId;
use nopal_core::shipping::pricing::canonical_pricing;
use nopal_core::shipping::{
    PricingBreakdown, RateSelection, RateUsedCents, ReconcileReport, apply_rate_selection,
};
use serde::Serialize;
use tracing::{info, instrument};

use super::persist::WriteMode;
use super::ports::{EventLog, Notifier, OrderStore, ShipmentProvider};
use super::{ShippingError, ShippingService, routes};

/// Stored pricing after a rate was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateOutcome {
    pub order_id: OrderId,
    pub pricing: PricingBreakdown,
    pub rate_used: RateUsedCents,
    pub report: ReconcileReport,
}

impl<S, L, P, N> ShippingService<S, L, P, N>
where
    S: OrderStore,
    L: EventLog,
    P: ShipmentProvider,
    N: Notifier,
{
    /// Write a new canonical pricing and `rate_used` identity for an order.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPayload` if identity fields are blank or the total
    /// overflows, and `OrderNotFound` if the order does not exist.
    #[instrument(skip(self, selection), fields(order_id = %order_id, rate_id = %selection.external_rate_id))]
    pub async fn apply_rate(
        &self,
        order_id: OrderId,
        selection: &RateSelection,
    ) -> Result<RateOutcome, ShippingError> {
        let mut missing = selection.missing_fields();
        if selection.total().is_none() {
            missing.push("total_cents");
        }
        if !missing.is_empty() {
            return Err(ShippingError::invalid_payload(&missing));
        }

        let now = Utc::now();
        let persisted = self
            .persist(order_id, routes::APPLY_RATE, WriteMode::Always, |fresh| {
                apply_rate_selection(fresh.metadata.clone(), selection, now)
            })
            .await?;

        let stored = &persisted.after.metadata;
        let outcome = RateOutcome {
            order_id,
            pricing: canonical_pricing(stored).unwrap_or_default(),
            rate_used: RateUsedCents::from_metadata(stored),
            report: persisted.reconciled.report,
        };

        info!(
            total_cents = outcome.pricing.total_cents.unwrap_or_default(),
            carrier_cents = outcome.pricing.carrier_cents.unwrap_or_default(),
            verified = persisted.verified,
            "Rate applied"
        );
        Ok(outcome)
    }
}
