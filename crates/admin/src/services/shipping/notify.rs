//! One-shot "your label is ready" notifications.

use nopal_core::shipping::{LabelCreationStatus, MirrorColumns};
use nopal_core::shipping::label::label_creation_status;
use tracing::{info, warn};

use super::persist::Persisted;
use super::ports::{
    EventLog, Notifier, NotifyOutcome, OrderRecord, OrderStore, ShipmentProvider, ShippingNotice,
};
use super::ShippingService;

/// Whether the order shows real evidence that a label exists.
///
/// Evidence is a label URL, `label_creation.status == created`, or a
/// label-ready shipping status. A bare tracking number is not enough.
#[must_use]
pub fn has_label_evidence(order: &OrderRecord) -> bool {
    let nested = MirrorColumns::from_metadata(&order.metadata);
    let columns = order.columns();

    let label_url = columns.label_url.is_some() || nested.label_url.is_some();
    let created = label_creation_status(&order.metadata) == Some(LabelCreationStatus::Created);
    let ready = columns
        .parsed_status()
        .or_else(|| nested.parsed_status())
        .is_some_and(|status| status.is_label_ready());

    label_url || created || ready
}

/// Notify only when this write turned "no label" into "label".
#[must_use]
pub fn became_label_ready(persisted: &Persisted) -> bool {
    persisted.written && !has_label_evidence(&persisted.before) && has_label_evidence(&persisted.after)
}

impl<S, L, P, N> ShippingService<S, L, P, N>
where
    S: OrderStore,
    L: EventLog,
    P: ShipmentProvider,
    N: Notifier,
{
    /// Send the shipping-created email if this write made the label available.
    ///
    /// Failures are logged and returned, never propagated.
    pub(crate) async fn notify_if_label_ready(&self, persisted: &Persisted) -> Option<NotifyOutcome> {
        if !became_label_ready(persisted) {
            return None;
        }

        let after = &persisted.after;
        let nested = MirrorColumns::from_metadata(&after.metadata);
        let notice = ShippingNotice {
            order_id: after.id,
            customer_email: after.customer_email.clone(),
            tracking_number: after
                .shipping_tracking_number
                .clone()
                .or(nested.tracking_number),
            label_url: after.shipping_label_url.clone().or(nested.label_url),
        };

        let outcome = self.notifier.send_shipping_created(&notice).await;
        if outcome.ok {
            info!(order_id = %after.id, sent = outcome.sent, "Shipping notification handled");
        } else {
            warn!(
                order_id = %after.id,
                error = outcome.error.as_deref().unwrap_or("unknown"),
                "Shipping notification failed"
            );
        }
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nopal_core::OrderId;
    use serde_json::{Value, json};

    fn order(metadata: Value, label_url: Option<&str>) -> OrderRecord {
        OrderRecord {
            id: OrderId::generate(),
            metadata,
            shipping_tracking_number: None,
            shipping_label_url: label_url.map(str::to_string),
            shipping_status: None,
            shipping_shipment_id: None,
            shipping_address: json!({}),
            customer_email: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_tracking_number_alone_is_not_evidence() {
        let pending = order(json!({"shipping": {"tracking_number": "TRK1", "status": "label_pending"}}), None);
        assert!(!has_label_evidence(&pending));
    }

    #[test]
    fn test_evidence_sources() {
        assert!(has_label_evidence(&order(json!({}), Some("https://labels.example/1.pdf"))));
        assert!(has_label_evidence(&order(
            json!({"shipping": {"label_creation": {"status": "created"}}}),
            None
        )));
        assert!(has_label_evidence(&order(json!({"shipping": {"status": "in_transit"}}), None)));
    }
}
