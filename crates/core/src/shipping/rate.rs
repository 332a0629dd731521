//! Applying a selected rate to an order's shipping document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::coerce::{deserialize_cents, deserialize_optional_cents};
use super::doc::{
    CARRIER_CENTS, CUSTOMER_TOTAL_CENTS, MARGIN_CENTS, PACKAGING_CENTS, PRICE_CENTS, RATE_USED,
    SHIPPING, SHIPPING_PRICING, TOTAL_CENTS, into_object, take_object,
};

/// Default `selection_source` for rates applied through the back-office.
pub const ADMIN_SELECTION: &str = "admin";

/// A priced provider rate chosen for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateSelection {
    pub external_rate_id: String,
    pub provider: String,
    pub service: String,
    #[serde(deserialize_with = "deserialize_cents")]
    pub carrier_cents: i64,
    #[serde(default, deserialize_with = "deserialize_cents_or_zero")]
    pub packaging_cents: i64,
    #[serde(default, deserialize_with = "deserialize_cents_or_zero")]
    pub margin_cents: i64,
    /// Defaults to the component sum.
    #[serde(default, deserialize_with = "deserialize_optional_cents")]
    pub total_cents: Option<i64>,
    #[serde(default)]
    pub selection_source: Option<String>,
}

fn deserialize_cents_or_zero<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    deserialize_optional_cents(deserializer).map(Option::unwrap_or_default)
}

impl RateSelection {
    /// The stated total, or the component sum when none was given.
    #[must_use]
    pub fn total(&self) -> Option<i64> {
        self.total_cents.or_else(|| {
            self.carrier_cents
                .checked_add(self.packaging_cents)?
                .checked_add(self.margin_cents)
        })
    }

    /// Names of required identity fields that are blank.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("external_rate_id", &self.external_rate_id),
            ("provider", &self.provider),
            ("service", &self.service),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

/// Write a new canonical pricing and `rate_used` identity for `selection`.
///
/// Unknown keys of both sub-documents survive. The stale cents of the old
/// `rate_used` are dropped; the reconcile pipeline derives them again from
/// the new pricing.
#[must_use]
pub fn apply_rate_selection(metadata: Value, selection: &RateSelection, now: DateTime<Utc>) -> Value {
    let mut map = into_object(metadata);

    let mut pricing = take_object(&mut map, SHIPPING_PRICING);
    let total = selection.total();
    pricing.insert(CARRIER_CENTS.to_string(), Value::from(selection.carrier_cents));
    pricing.insert(PACKAGING_CENTS.to_string(), Value::from(selection.packaging_cents));
    pricing.insert(MARGIN_CENTS.to_string(), Value::from(selection.margin_cents));
    for key in [TOTAL_CENTS, CUSTOMER_TOTAL_CENTS] {
        match total {
            Some(total) => pricing.insert(key.to_string(), Value::from(total)),
            None => pricing.remove(key),
        };
    }
    map.insert(SHIPPING_PRICING.to_string(), Value::Object(pricing));

    let mut shipping = take_object(&mut map, SHIPPING);
    let mut rate_used = take_object(&mut shipping, RATE_USED);
    for key in [CARRIER_CENTS, PRICE_CENTS, CUSTOMER_TOTAL_CENTS] {
        rate_used.remove(key);
    }
    let source = selection
        .selection_source
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(ADMIN_SELECTION);
    rate_used.insert("external_rate_id".to_string(), Value::from(selection.external_rate_id.trim()));
    rate_used.insert("provider".to_string(), Value::from(selection.provider.trim()));
    rate_used.insert("service".to_string(), Value::from(selection.service.trim()));
    rate_used.insert("selection_source".to_string(), Value::from(source));
    rate_used.insert("applied_at".to_string(), Value::from(now.to_rfc3339()));
    shipping.insert(RATE_USED.to_string(), Value::Object(rate_used));
    map.insert(SHIPPING.to_string(), Value::Object(shipping));

    Value::Object(map)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn selection() -> RateSelection {
        serde_json::from_value(json!({
            "external_rate_id": "rate_new",
            "provider": "fedex",
            "service": "express",
            "carrier_cents": "15338",
            "packaging_cents": 2000,
            "margin_cents": 3671
        }))
        .unwrap()
    }

    #[test]
    fn test_total_defaults_to_sum() {
        assert_eq!(selection().total(), Some(21009));
    }

    #[test]
    fn test_apply_replaces_pricing_and_identity() {
        let metadata = json!({
            "shipping_pricing": {"carrier_cents": 14964, "total_cents": 21635, "currency": "MXN"},
            "shipping": {
                "tracking_number": "TRK1",
                "rate_used": {"external_rate_id": "rate_old", "price_cents": 21635, "carrier_cents": 14964, "notes": "x"}
            }
        });

        let applied = apply_rate_selection(metadata, &selection(), Utc::now());

        assert_eq!(applied["shipping_pricing"]["carrier_cents"], json!(15338));
        assert_eq!(applied["shipping_pricing"]["total_cents"], json!(21009));
        assert_eq!(applied["shipping_pricing"]["customer_total_cents"], json!(21009));
        assert_eq!(applied["shipping_pricing"]["currency"], json!("MXN"));

        let rate_used = &applied["shipping"]["rate_used"];
        assert_eq!(rate_used["external_rate_id"], json!("rate_new"));
        assert_eq!(rate_used["selection_source"], json!("admin"));
        assert_eq!(rate_used["notes"], json!("x"));
        assert!(rate_used.get("price_cents").is_none());
        assert_eq!(applied["shipping"]["tracking_number"], json!("TRK1"));
    }

    #[test]
    fn test_missing_identity_fields() {
        let mut blank = selection();
        blank.provider = " ".to_string();
        assert_eq!(blank.missing_fields(), vec!["provider"]);
        assert!(selection().missing_fields().is_empty());
    }

    #[test]
    fn test_negative_carrier_is_rejected() {
        let parsed = serde_json::from_value::<RateSelection>(json!({
            "external_rate_id": "r", "provider": "p", "service": "s", "carrier_cents": -1
        }));
        assert!(parsed.is_err());
    }
}
