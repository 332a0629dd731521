//! Re-read, reconcile, write, verify.

use chrono::Utc;
use nopal_core::OrderId;
use nopal_core::shipping::{MirrorColumns, ReconcileContext, Reconciled, RateUsedCents, reconcile};
use serde_json::Value;
use tracing::{error, info, warn};

use super::ports::{EventLog, Notifier, OrderRecord, OrderStore, OrderWrite, ShipmentProvider};
use super::{ShippingError, ShippingService};

/// How the final write is guarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Always,
    /// Only while the order has no tracking number (label one-shot).
    IfUntracked,
}

/// What a persist call did.
#[derive(Debug, Clone)]
pub struct Persisted {
    /// The order as re-read immediately before the write.
    pub before: OrderRecord,
    /// The order as stored afterwards.
    pub after: OrderRecord,
    pub reconciled: Reconciled,
    /// False when a conditional write lost, or when a failed write turned out
    /// to be unnecessary because a concurrent writer stored the same state.
    pub written: bool,
    /// The re-read matched what we meant to store.
    pub verified: bool,
}

impl<S, L, P, N> ShippingService<S, L, P, N>
where
    S: OrderStore,
    L: EventLog,
    P: ShipmentProvider,
    N: Notifier,
{
    /// Reconcile `build(fresh)` against a fresh copy of the order and persist it.
    ///
    /// # Errors
    ///
    /// Returns `ShippingError::OrderNotFound` if the order vanished, and
    /// `ShippingError::Repository` if the write failed and a re-read does not
    /// show the intended state.
    pub(crate) async fn persist<F>(
        &self,
        order_id: OrderId,
        source: &str,
        mode: WriteMode,
        build: F,
    ) -> Result<Persisted, ShippingError>
    where
        F: FnOnce(&OrderRecord) -> Value + Send,
    {
        let fresh = self.load(order_id).await?;
        let candidate = build(&fresh);

        let order_key = order_id.to_string();
        let ctx = ReconcileContext {
            source,
            order_id: Some(&order_key),
            revision: &self.settings.code_revision,
            now: Utc::now(),
        };
        let reconciled = reconcile(&fresh.metadata, candidate, &ctx);
        let write = OrderWrite {
            metadata: reconciled.metadata.clone(),
            mirrors: reconciled.mirrors.clone(),
        };

        let result = match mode {
            WriteMode::Always => self.store.update_shipping(order_id, &write).await.map(Some),
            WriteMode::IfUntracked => self.store.update_shipping_if_untracked(order_id, &write).await,
        };

        match result {
            Ok(Some(_)) => {
                let (after, verified) = self.verify(order_id, &write, source).await?;
                Ok(Persisted {
                    before: fresh,
                    after,
                    reconciled,
                    written: true,
                    verified,
                })
            }
            Ok(None) => {
                info!(
                    order_id = %order_id,
                    route = source,
                    "Conditional shipping write lost to a concurrent writer"
                );
                let after = self.load(order_id).await?;
                Ok(Persisted {
                    before: fresh,
                    after,
                    reconciled,
                    written: false,
                    verified: false,
                })
            }
            Err(err) => {
                error!(
                    order_id = %order_id,
                    route = source,
                    error = %err,
                    "Shipping write failed, checking stored state"
                );
                match self.store.get_order(order_id).await {
                    Ok(Some(after)) if discrepancies(&after, &write).is_empty() => {
                        warn!(
                            order_id = %order_id,
                            route = source,
                            "Stored state already matches intended write, treating as success"
                        );
                        Ok(Persisted {
                            before: fresh,
                            after,
                            reconciled,
                            written: false,
                            verified: true,
                        })
                    }
                    _ => Err(err.into()),
                }
            }
        }
    }

    async fn verify(
        &self,
        order_id: OrderId,
        write: &OrderWrite,
        source: &str,
    ) -> Result<(OrderRecord, bool), ShippingError> {
        let after = self.load(order_id).await?;
        let mismatched = discrepancies(&after, write);
        if !mismatched.is_empty() {
            warn!(
                order_id = %order_id,
                route = source,
                fields = ?mismatched,
                "Stored shipping state differs from what was written"
            );
        }
        let verified = mismatched.is_empty();
        Ok((after, verified))
    }
}

/// Fields where `stored` does not reflect `intended`.
///
/// Mirror columns are compared only where the write carried a value, since
/// `None` never clears a column.
#[must_use]
pub fn discrepancies(stored: &OrderRecord, intended: &OrderWrite) -> Vec<&'static str> {
    let mut fields = Vec::new();
    let columns = stored.columns();
    let MirrorColumns {
        tracking_number,
        label_url,
        status,
        shipment_id,
    } = &intended.mirrors;

    let pairs = [
        ("shipping_tracking_number", tracking_number, &columns.tracking_number),
        ("shipping_label_url", label_url, &columns.label_url),
        ("shipping_status", status, &columns.status),
        ("shipping_shipment_id", shipment_id, &columns.shipment_id),
    ];
    for (name, wanted, actual) in pairs {
        if wanted.is_some() && wanted != actual {
            fields.push(name);
        }
    }

    if RateUsedCents::from_metadata(&stored.metadata) != RateUsedCents::from_metadata(&intended.metadata)
    {
        fields.push("rate_used");
    }

    let stored_nested = MirrorColumns::from_metadata(&stored.metadata);
    if intended.mirrors.tracking_number.is_some()
        && stored_nested.tracking_number != intended.mirrors.tracking_number
    {
        fields.push("metadata.shipping.tracking_number");
    }
    if intended.mirrors.label_url.is_some() && stored_nested.label_url != intended.mirrors.label_url
    {
        fields.push("metadata.shipping.label_url");
    }

    fields
}
