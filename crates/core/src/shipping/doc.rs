//! Key names and small helpers for the shipping metadata document.
//!
//! The metadata blob is semi-structured JSON that several writers touch, so
//! the helpers here are owned-value based: take a sub-document out, edit it,
//! put it back. Unknown keys are always carried through untouched.

use serde_json::{Map, Value};

/// Top-level canonical pricing document.
pub const SHIPPING_PRICING: &str = "shipping_pricing";
/// Top-level shipping sub-document.
pub const SHIPPING: &str = "shipping";
/// Legacy location of pricing, nested under `shipping`.
pub const LEGACY_PRICING: &str = "pricing";
/// Snapshot of the rate actually applied, nested under `shipping`.
pub const RATE_USED: &str = "rate_used";
/// Label-generation lifecycle, nested under `shipping`.
pub const LABEL_CREATION: &str = "label_creation";
/// Audit trail of the last writer, nested under `shipping`.
pub const LAST_WRITE: &str = "_last_write";

pub const TRACKING_NUMBER: &str = "tracking_number";
pub const LABEL_URL: &str = "label_url";
pub const SHIPMENT_ID: &str = "shipment_id";
pub const STATUS: &str = "status";
pub const PROVIDER_STATUS: &str = "provider_status";

pub const CARRIER_CENTS: &str = "carrier_cents";
pub const PACKAGING_CENTS: &str = "packaging_cents";
pub const MARGIN_CENTS: &str = "margin_cents";
pub const TOTAL_CENTS: &str = "total_cents";
pub const CUSTOMER_TOTAL_CENTS: &str = "customer_total_cents";
pub const PRICE_CENTS: &str = "price_cents";

/// Convert any value into an object map; non-objects become empty maps.
#[must_use]
pub fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Remove `key` from `map` and return it as an object (empty if absent or not an object).
pub fn take_object(map: &mut Map<String, Value>, key: &str) -> Map<String, Value> {
    map.remove(key).map(into_object).unwrap_or_default()
}

/// Borrow the object stored at `key`, if it is one.
#[must_use]
pub fn object<'a>(value: &'a Value, key: &str) -> Option<&'a Map<String, Value>> {
    value.get(key)?.as_object()
}

/// Borrow `metadata.shipping`, if present.
#[must_use]
pub fn shipping(metadata: &Value) -> Option<&Map<String, Value>> {
    object(metadata, SHIPPING)
}

/// Borrow `metadata.shipping.rate_used`, if present.
#[must_use]
pub fn rate_used(metadata: &Value) -> Option<&Map<String, Value>> {
    shipping(metadata)?.get(RATE_USED)?.as_object()
}

/// Read a field as a trimmed, non-empty string.
///
/// Numbers are accepted and rendered in decimal, since providers are not
/// consistent about quoting identifiers.
#[must_use]
pub fn non_empty_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Read `map[key]` as a trimmed, non-empty string.
#[must_use]
pub fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    non_empty_string(map.get(key))
}

/// Follow a path of object keys.
#[must_use]
pub fn path<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().try_fold(value, |current, key| current.get(*key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_take_object_replaces_garbage_with_empty_map() {
        let mut map = into_object(json!({"shipping": "oops"}));
        assert!(take_object(&mut map, SHIPPING).is_empty());
        assert!(!map.contains_key(SHIPPING));
    }

    #[test]
    fn test_non_empty_string_accepts_numbers_and_trims() {
        assert_eq!(non_empty_string(Some(&json!(" 123 "))), Some("123".to_string()));
        assert_eq!(non_empty_string(Some(&json!(456))), Some("456".to_string()));
        assert_eq!(non_empty_string(Some(&json!("   "))), None);
        assert_eq!(non_empty_string(Some(&Value::Null)), None);
    }

    #[test]
    fn test_path_walks_nested_objects() {
        let value = json!({"data": {"attributes": {"status": "delivered"}}});
        assert_eq!(
            path(&value, &["data", "attributes", "status"]),
            Some(&json!("delivered"))
        );
        assert_eq!(path(&value, &["data", "missing"]), None);
    }
}
