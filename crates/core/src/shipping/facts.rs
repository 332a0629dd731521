//! Shipment facts and the mirror columns derived from them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::doc::{
    LABEL_URL, PROVIDER_STATUS, SHIPMENT_ID, SHIPPING, STATUS, TRACKING_NUMBER, into_object,
    object, string_field, take_object,
};
use super::extract::{
    ExtractionStrategy, extract_shipment_id, extract_status, extract_tracking_and_label,
};
use super::label::{self, LabelCreationStatus, label_creation_status};
use super::status::ShippingStatus;

/// Pseudo-field reported by [`changed_fields`] when a label exists but
/// `label_creation` does not say so yet.
pub const LABEL_CREATION_FIELD: &str = "label_creation";

/// New facts about a shipment, from a webhook or a provider response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShipmentFacts {
    pub shipment_id: Option<String>,
    pub tracking_number: Option<String>,
    pub label_url: Option<String>,
    pub status: Option<ShippingStatus>,
    /// Status string exactly as the provider sent it.
    pub raw_status: Option<String>,
}

impl ShipmentFacts {
    /// Facts from a provider shipment response, plus the extraction strategy that matched.
    #[must_use]
    pub fn from_response(response: &Value) -> (Self, ExtractionStrategy) {
        let extracted = extract_tracking_and_label(response);
        let raw_status = extract_status(response);
        let facts = Self {
            shipment_id: extract_shipment_id(response),
            tracking_number: extracted.tracking_number,
            label_url: extracted.label_url,
            status: raw_status.as_deref().and_then(ShippingStatus::from_provider),
            raw_status,
        };
        (facts, extracted.strategy)
    }

    /// Status these facts imply: a label URL means at least `label_created`.
    #[must_use]
    pub fn effective_status(&self) -> Option<ShippingStatus> {
        if present(self.label_url.as_ref()).is_some() {
            Some(
                self.status
                    .map_or(ShippingStatus::LabelCreated, |status| {
                        status.max(ShippingStatus::LabelCreated)
                    }),
            )
        } else {
            self.status
        }
    }

    #[must_use]
    pub fn has_tracking_evidence(&self) -> bool {
        present(self.tracking_number.as_ref()).is_some() || present(self.label_url.as_ref()).is_some()
    }
}

/// Order-table columns that duplicate fields of the shipping document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MirrorColumns {
    pub tracking_number: Option<String>,
    pub label_url: Option<String>,
    pub status: Option<String>,
    pub shipment_id: Option<String>,
}

impl MirrorColumns {
    /// Derive the columns from a reconciled metadata document.
    #[must_use]
    pub fn from_metadata(metadata: &Value) -> Self {
        let Some(shipping) = object(metadata, SHIPPING) else {
            return Self::default();
        };
        Self {
            tracking_number: string_field(shipping, TRACKING_NUMBER),
            label_url: string_field(shipping, LABEL_URL),
            status: string_field(shipping, STATUS),
            shipment_id: string_field(shipping, SHIPMENT_ID),
        }
    }

    #[must_use]
    pub fn parsed_status(&self) -> Option<ShippingStatus> {
        self.status.as_deref().and_then(|raw| raw.parse().ok())
    }
}

fn present(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// Which stored fields the facts would actually change.
///
/// A fact counts as a change when it differs from the column or from the
/// nested document. An empty result means the write can be skipped.
#[must_use]
pub fn changed_fields(
    facts: &ShipmentFacts,
    columns: &MirrorColumns,
    metadata: &Value,
) -> Vec<&'static str> {
    let nested = MirrorColumns::from_metadata(metadata);
    let mut changed = Vec::new();

    let strings = [
        (SHIPMENT_ID, &facts.shipment_id, &columns.shipment_id, &nested.shipment_id),
        (TRACKING_NUMBER, &facts.tracking_number, &columns.tracking_number, &nested.tracking_number),
        (LABEL_URL, &facts.label_url, &columns.label_url, &nested.label_url),
    ];
    for (name, fact, column, stored) in strings {
        if let Some(value) = present(fact.as_ref())
            && (column.as_deref() != Some(value) || stored.as_deref() != Some(value))
        {
            changed.push(name);
        }
    }

    if let Some(incoming) = facts.effective_status() {
        let current = columns.parsed_status().or_else(|| nested.parsed_status());
        let next = ShippingStatus::advance(current, incoming);
        let nested_status = nested.parsed_status();
        if Some(next) != current || nested_status != Some(next) {
            changed.push(STATUS);
        }
    }

    if present(facts.label_url.as_ref()).is_some()
        && label_creation_status(metadata) != Some(LabelCreationStatus::Created)
    {
        changed.push(LABEL_CREATION_FIELD);
    }

    changed
}

/// Merge facts into the shipping document.
///
/// Only non-empty values are written, so a fact never erases a stored one.
/// The status only advances (see [`ShippingStatus::advance`]), and a label
/// URL marks `label_creation` as created.
#[must_use]
pub fn merge_facts(metadata: Value, facts: &ShipmentFacts, now: DateTime<Utc>) -> Value {
    let mut map = into_object(metadata);
    let mut shipping = take_object(&mut map, SHIPPING);

    let strings = [
        (SHIPMENT_ID, &facts.shipment_id),
        (TRACKING_NUMBER, &facts.tracking_number),
        (LABEL_URL, &facts.label_url),
        (PROVIDER_STATUS, &facts.raw_status),
    ];
    for (key, value) in strings {
        if let Some(value) = present(value.as_ref()) {
            shipping.insert(key.to_string(), Value::from(value));
        }
    }

    if let Some(incoming) = facts.effective_status() {
        let current = string_field(&shipping, STATUS).and_then(|raw| raw.parse().ok());
        let next = ShippingStatus::advance(current, incoming);
        shipping.insert(STATUS.to_string(), Value::from(next.as_str()));
    }

    map.insert(SHIPPING.to_string(), Value::Object(shipping));
    let merged = Value::Object(map);

    if present(facts.label_url.as_ref()).is_some() {
        label::mark_created(merged, now)
    } else {
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn label_facts() -> ShipmentFacts {
        ShipmentFacts {
            tracking_number: Some("TRK1".to_string()),
            label_url: Some("https://labels.example/1.pdf".to_string()),
            ..ShipmentFacts::default()
        }
    }

    #[test]
    fn test_merge_sets_label_and_status() {
        let metadata = json!({"shipping": {"shipment_id": "shp_1", "rate_used": {"price_cents": 100}}});
        let merged = merge_facts(metadata, &label_facts(), Utc::now());

        assert_eq!(merged["shipping"]["tracking_number"], json!("TRK1"));
        assert_eq!(merged["shipping"]["status"], json!("label_created"));
        assert_eq!(merged["shipping"]["label_creation"]["status"], json!("created"));
        assert_eq!(merged["shipping"]["shipment_id"], json!("shp_1"));
        assert_eq!(merged["shipping"]["rate_used"]["price_cents"], json!(100));
    }

    #[test]
    fn test_merge_never_erases() {
        let metadata = json!({"shipping": {"tracking_number": "TRK1", "status": "in_transit"}});
        let facts = ShipmentFacts {
            tracking_number: Some("  ".to_string()),
            status: Some(ShippingStatus::LabelCreated),
            ..ShipmentFacts::default()
        };
        let merged = merge_facts(metadata, &facts, Utc::now());
        assert_eq!(merged["shipping"]["tracking_number"], json!("TRK1"));
        assert_eq!(merged["shipping"]["status"], json!("in_transit"));
    }

    #[test]
    fn test_replayed_facts_change_nothing() {
        let merged = merge_facts(json!({}), &label_facts(), Utc::now());
        let columns = MirrorColumns::from_metadata(&merged);
        assert!(changed_fields(&label_facts(), &columns, &merged).is_empty());
    }

    #[test]
    fn test_new_facts_are_reported() {
        let columns = MirrorColumns::default();
        let changed = changed_fields(&label_facts(), &columns, &json!({}));
        assert_eq!(
            changed,
            vec![TRACKING_NUMBER, LABEL_URL, STATUS, LABEL_CREATION_FIELD]
        );
    }

    #[test]
    fn test_stale_status_is_not_a_change() {
        let metadata = json!({"shipping": {"status": "delivered"}});
        let columns = MirrorColumns::from_metadata(&metadata);
        let facts = ShipmentFacts {
            status: Some(ShippingStatus::InTransit),
            ..ShipmentFacts::default()
        };
        assert!(changed_fields(&facts, &columns, &metadata).is_empty());
    }

    #[test]
    fn test_facts_from_response() {
        let response = json!({
            "data": {
                "id": "shp_9",
                "attributes": {"status": "in_transit", "tracking_number": "TRK9"}
            }
        });
        let (facts, strategy) = ShipmentFacts::from_response(&response);
        assert_eq!(facts.shipment_id.as_deref(), Some("shp_9"));
        assert_eq!(facts.status, Some(ShippingStatus::InTransit));
        assert_eq!(strategy, ExtractionStrategy::JsonApiAttributes);
    }
}
