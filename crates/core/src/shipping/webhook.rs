//! Inbound provider webhook payloads.
//!
//! Deliveries are JSON:API flavoured but loosely typed: ids arrive as strings
//! or numbers, and any attribute may be missing. Parsing only fails when the
//! body is not a JSON object at all.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::facts::ShipmentFacts;
use super::status::ShippingStatus;

/// Provider name used as the first half of the event idempotency key.
pub const SKYDROPX_PROVIDER: &str = "skydropx";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub data: WebhookData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookData {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "string_or_number")]
    pub kind: Option<String>,
    #[serde(default)]
    pub attributes: WebhookAttributes,
    #[serde(default)]
    pub relationships: WebhookRelationships,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookAttributes {
    #[serde(default, deserialize_with = "string_or_number")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub tracking_number: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub label_url: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub updated_at: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub shipment_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookRelationships {
    #[serde(default)]
    pub shipment: Option<RelationshipLink>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelationshipLink {
    #[serde(default)]
    pub data: Option<RelationshipData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelationshipData {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
}

/// Accept a string or a number; anything else (and blank strings) is `None`.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(super::doc::non_empty_string(value.as_ref()))
}

impl WebhookPayload {
    /// Parse a raw delivery body.
    ///
    /// # Errors
    ///
    /// Fails when `body` is not a JSON object.
    pub fn from_value(body: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(body)
    }
}

/// A webhook delivery reduced to what the write path needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookEvent {
    /// Idempotency key within the provider.
    pub event_id: String,
    /// `event_id` was derived because the provider sent none.
    pub synthetic_id: bool,
    pub shipment_id: Option<String>,
    pub tracking_number: Option<String>,
    pub label_url: Option<String>,
    pub raw_status: Option<String>,
    pub status: Option<ShippingStatus>,
    pub occurred_at: Option<String>,
}

impl WebhookEvent {
    #[must_use]
    pub fn from_payload(payload: WebhookPayload) -> Self {
        let WebhookData {
            id,
            attributes,
            relationships,
            ..
        } = payload.data;

        let shipment_id = relationships
            .shipment
            .and_then(|link| link.data)
            .and_then(|data| data.id)
            .or(attributes.shipment_id);

        let (event_id, synthetic_id) = match id {
            Some(id) => (id, false),
            None => (
                synthetic_event_id(
                    shipment_id.as_deref(),
                    attributes.status.as_deref(),
                    attributes.updated_at.as_deref(),
                ),
                true,
            ),
        };

        Self {
            event_id,
            synthetic_id,
            status: attributes
                .status
                .as_deref()
                .and_then(ShippingStatus::from_provider),
            shipment_id,
            tracking_number: attributes.tracking_number,
            label_url: attributes.label_url,
            raw_status: attributes.status,
            occurred_at: attributes.updated_at,
        }
    }

    #[must_use]
    pub fn facts(&self) -> ShipmentFacts {
        ShipmentFacts {
            shipment_id: self.shipment_id.clone(),
            tracking_number: self.tracking_number.clone(),
            label_url: self.label_url.clone(),
            status: self.status,
            raw_status: self.raw_status.clone(),
        }
    }
}

/// Deterministic event id for deliveries without one: `shipment:status:timestamp`.
///
/// Redelivery of the same event yields the same id.
#[must_use]
pub fn synthetic_event_id(
    shipment_id: Option<&str>,
    raw_status: Option<&str>,
    timestamp: Option<&str>,
) -> String {
    format!(
        "{}:{}:{}",
        shipment_id.unwrap_or("unknown"),
        raw_status.unwrap_or("unknown"),
        timestamp.unwrap_or("unknown")
    )
}
