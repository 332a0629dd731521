//! Provider webhook ingestion.
//!
//! Webhooks are acknowledged no matter what happens here; failures only show
//! up in logs and in the returned [`WebhookOutcome`].

use chrono::Utc;
use nopal_core::OrderId;
use nopal_core::shipping::webhook::SKYDROPX_PROVIDER;
use nopal_core::shipping::{
    MirrorColumns, ShipmentFacts, ShippingStatus, WebhookEvent, WebhookPayload, changed_fields,
    merge_facts,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use super::persist::WriteMode;
use super::ports::{EventLog, Notifier, OrderRecord, OrderStore, ShipmentProvider};
use super::resolve::{Lookup, ResolveStrategy, Resolved, resolve_order};
use super::{ShippingError, ShippingService, routes};

/// What happened to one webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Ignored {
        reason: &'static str,
    },
    OrderNotFound {
        shipment_id: Option<String>,
        tracking_number: Option<String>,
    },
    /// Same `(provider, event id)` seen before.
    Duplicate {
        event_id: String,
    },
    /// Nothing in the event differs from what is stored.
    Unchanged {
        order_id: OrderId,
        event_id: String,
    },
    Updated {
        order_id: OrderId,
        event_id: String,
        strategy: ResolveStrategy,
        changed: Vec<&'static str>,
        notified: bool,
    },
    Failed {
        message: String,
    },
}

impl<S, L, P, N> ShippingService<S, L, P, N>
where
    S: OrderStore,
    L: EventLog,
    P: ShipmentProvider,
    N: Notifier,
{
    /// Process one authenticated webhook delivery. Never fails.
    #[instrument(skip(self, body))]
    pub async fn handle_webhook(&self, body: &Value) -> WebhookOutcome {
        match self.process_webhook(body).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(error = %err, code = %err.code(), "Webhook processing failed");
                WebhookOutcome::Failed {
                    message: err.to_string(),
                }
            }
        }
    }

    async fn process_webhook(&self, body: &Value) -> Result<WebhookOutcome, ShippingError> {
        let payload = match WebhookPayload::from_value(body) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "Ignoring malformed webhook payload");
                return Ok(WebhookOutcome::Ignored {
                    reason: "invalid_payload",
                });
            }
        };
        let event = WebhookEvent::from_payload(payload);

        if event.shipment_id.is_none() && event.tracking_number.is_none() {
            info!(event_id = %event.event_id, "Webhook carries no shipment identifiers");
            return Ok(WebhookOutcome::Ignored {
                reason: "no_identifiers",
            });
        }

        let lookup = Lookup {
            shipment_id: event.shipment_id.as_deref(),
            tracking_number: event.tracking_number.as_deref(),
        };
        let Some(resolved) = resolve_order(&self.store, lookup, self.settings.resolution_window).await?
        else {
            info!(
                event_id = %event.event_id,
                shipment_id = event.shipment_id.as_deref().unwrap_or("none"),
                "Webhook did not match any order"
            );
            return Ok(WebhookOutcome::OrderNotFound {
                shipment_id: event.shipment_id,
                tracking_number: event.tracking_number,
            });
        };
        let order_id = resolved.order.id;

        let inserted = self
            .events
            .insert_event_if_absent(SKYDROPX_PROVIDER, &event.event_id, Some(order_id), body)
            .await?;
        if !inserted {
            info!(order_id = %order_id, event_id = %event.event_id, "Duplicate webhook delivery");
            return Ok(WebhookOutcome::Duplicate {
                event_id: event.event_id,
            });
        }

        let event_id = event.event_id.clone();
        let applied = self.apply_event(resolved, event).await;
        if applied.is_err() {
            // Free the key so the provider retry is processed.
            if let Err(err) = self.events.remove_event(SKYDROPX_PROVIDER, &event_id).await {
                error!(
                    order_id = %order_id,
                    event_id = %event_id,
                    error = %err,
                    "Could not release webhook event after failed write"
                );
            }
        }
        applied
    }

    async fn apply_event(
        &self,
        resolved: Resolved,
        event: WebhookEvent,
    ) -> Result<WebhookOutcome, ShippingError> {
        let order_id = resolved.order.id;
        let mut facts = event.facts();
        self.enrich_facts(&resolved.order, &mut facts).await;

        let changed = changed_fields(&facts, &resolved.order.columns(), &resolved.order.metadata);
        if changed.is_empty() {
            debug!(order_id = %order_id, event_id = %event.event_id, "Webhook brought no changes");
            return Ok(WebhookOutcome::Unchanged {
                order_id,
                event_id: event.event_id,
            });
        }

        let now = Utc::now();
        let persisted = self
            .persist(order_id, routes::WEBHOOK, WriteMode::Always, |fresh| {
                merge_facts(fresh.metadata.clone(), &facts, now)
            })
            .await?;
        let notified = self
            .notify_if_label_ready(&persisted)
            .await
            .is_some_and(|outcome| outcome.sent);

        info!(
            order_id = %order_id,
            event_id = %event.event_id,
            strategy = %resolved.strategy,
            changed = ?changed,
            "Webhook applied"
        );
        Ok(WebhookOutcome::Updated {
            order_id,
            event_id: event.event_id,
            strategy: resolved.strategy,
            changed,
            notified,
        })
    }

    /// Fetch the shipment when the event says a label exists but carries no URL.
    async fn enrich_facts(&self, order: &OrderRecord, facts: &mut ShipmentFacts) {
        if facts.label_url.is_some() || facts.status != Some(ShippingStatus::LabelCreated) {
            return;
        }
        let Some((provider, _)) = self.provider.as_ref() else {
            return;
        };
        let Some(shipment_id) = facts
            .shipment_id
            .clone()
            .or_else(|| order.shipping_shipment_id.clone())
            .or_else(|| MirrorColumns::from_metadata(&order.metadata).shipment_id)
        else {
            return;
        };

        match provider.get_shipment(&shipment_id).await {
            Ok(response) => {
                let (fetched, strategy) = ShipmentFacts::from_response(&response);
                debug!(order_id = %order.id, strategy = %strategy, "Enriched webhook from provider");
                if facts.tracking_number.is_none() {
                    facts.tracking_number = fetched.tracking_number;
                }
                facts.label_url = fetched.label_url;
                if facts.shipment_id.is_none() {
                    facts.shipment_id = Some(shipment_id);
                }
            }
            Err(err) => {
                warn!(
                    order_id = %order.id,
                    shipment_id = %shipment_id,
                    code = %err.kind().code(),
                    error = %err,
                    "Webhook enrichment failed"
                );
            }
        }
    }
}
