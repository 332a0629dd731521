//! Guards that stop a stale writer from nulling out computed pricing.

use serde_json::{Map, Value};
use tracing::info;

use super::coerce::cents_field;
use super::doc::{
    CARRIER_CENTS, CUSTOMER_TOTAL_CENTS, LABEL_CREATION, LABEL_URL, PRICE_CENTS, RATE_USED,
    SHIPMENT_ID, SHIPPING, SHIPPING_PRICING, TRACKING_NUMBER, into_object, take_object,
};
use super::pricing::{
    PricingBreakdown, RateUsedCents, canonical_pricing, locate_pricing,
    rate_used_needs_integer_rewrite,
};

/// Result of [`preserve_rate_used`].
#[derive(Debug, Clone, PartialEq)]
pub struct Preserved {
    pub metadata: Value,
    /// The stored `rate_used` replaced the incoming one.
    pub rate_used_restored: bool,
    /// The stored `shipping_pricing` replaced an incoming one without numbers.
    pub pricing_restored: bool,
}

/// Keep populated stored values when the incoming write would regress them.
///
/// The incoming document wins when its own pricing/`rate_used` pair is
/// consistent and non-null, or when it carries a canonical pricing that
/// differs from the stored one (a new rate was applied). Otherwise the
/// stored `rate_used` is carried over, with any non-null identity fields the
/// incoming writer supplied layered on top.
#[must_use]
pub fn preserve_rate_used(stored: &Value, incoming: Value) -> Preserved {
    let stored_pricing = canonical_pricing(stored).filter(PricingBreakdown::has_numeric_values);
    let incoming_pricing =
        canonical_pricing(&incoming).filter(PricingBreakdown::has_numeric_values);

    let mut metadata = into_object(incoming);
    let mut pricing_restored = false;

    if incoming_pricing.is_none()
        && stored_pricing.is_some()
        && let Some((_, stored_map)) = locate_pricing(stored)
    {
        metadata.insert(SHIPPING_PRICING.to_string(), Value::Object(stored_map.clone()));
        pricing_restored = true;
    }

    let stored_cents = RateUsedCents::from_metadata(stored);
    if !stored_cents.is_populated() {
        return finish(metadata, false, pricing_restored);
    }

    let effective_pricing = incoming_pricing.or(stored_pricing);
    let incoming_rate_used = metadata
        .get(SHIPPING)
        .and_then(|shipping| shipping.get(RATE_USED))
        .and_then(Value::as_object)
        .map(RateUsedCents::from_object)
        .unwrap_or_default();

    let consistent =
        effective_pricing.is_some_and(|pricing| incoming_rate_used.agrees_with(&pricing));
    let new_rate = match (incoming_pricing, stored_pricing) {
        (Some(incoming), Some(stored)) => !incoming.same_rate_as(&stored),
        (Some(_), None) => true,
        _ => false,
    };
    if consistent || new_rate {
        return finish(metadata, false, pricing_restored);
    }

    let Some(stored_rate_used) = super::doc::rate_used(stored) else {
        return finish(metadata, false, pricing_restored);
    };

    let mut shipping = take_object(&mut metadata, SHIPPING);
    let incoming_map = take_object(&mut shipping, RATE_USED);
    let mut restored = stored_rate_used.clone();
    for (key, value) in incoming_map {
        if is_cents_key(&key) || value.is_null() {
            continue;
        }
        restored.insert(key, value);
    }
    shipping.insert(RATE_USED.to_string(), Value::Object(restored));
    metadata.insert(SHIPPING.to_string(), Value::Object(shipping));

    info!(
        stored_price_cents = ?stored_cents.price_cents,
        stored_carrier_cents = ?stored_cents.carrier_cents,
        "Preserved stored rate_used over stale incoming write"
    );

    finish(metadata, true, pricing_restored)
}

fn finish(metadata: Map<String, Value>, rate_used_restored: bool, pricing_restored: bool) -> Preserved {
    Preserved {
        metadata: Value::Object(metadata),
        rate_used_restored,
        pricing_restored,
    }
}

fn is_cents_key(key: &str) -> bool {
    matches!(key, CARRIER_CENTS | PRICE_CENTS | CUSTOMER_TOTAL_CENTS)
}

/// Fill or repair `shipping.rate_used` cents from canonical pricing.
///
/// Returns the document and whether anything changed. A document without
/// numeric canonical pricing is returned untouched.
#[must_use]
pub fn ensure_rate_used(metadata: Value) -> (Value, bool) {
    let Some(pricing) = canonical_pricing(&metadata).filter(PricingBreakdown::has_numeric_values)
    else {
        return (metadata, false);
    };

    let total = pricing.total_cents.or_else(|| pricing.component_sum());
    let targets = [
        (PRICE_CENTS, total),
        (CARRIER_CENTS, pricing.carrier_cents),
        (CUSTOMER_TOTAL_CENTS, total),
    ];
    if targets.iter().all(|(_, target)| target.is_none()) {
        return (metadata, false);
    }

    let mut map = into_object(metadata);
    let mut shipping = take_object(&mut map, SHIPPING);
    let mut rate_used = take_object(&mut shipping, RATE_USED);

    let mut changed = rate_used_needs_integer_rewrite(&rate_used);
    for (key, target) in targets {
        let Some(target) = target else {
            continue;
        };
        if cents_field(&rate_used, key) != Some(target) {
            changed = true;
        }
        rate_used.insert(key.to_string(), Value::from(target));
    }

    shipping.insert(RATE_USED.to_string(), Value::Object(rate_used));
    map.insert(SHIPPING.to_string(), Value::Object(shipping));
    (Value::Object(map), changed)
}

/// Final guard before any persistence call.
#[must_use]
pub fn ensure_rate_used_in_metadata(metadata: Value) -> Value {
    ensure_rate_used(metadata).0
}

const CARRIED_FIELDS: [&str; 4] = [SHIPMENT_ID, TRACKING_NUMBER, LABEL_URL, LABEL_CREATION];

/// Copy shipment identifiers the incoming write dropped back from storage.
///
/// Returns the document and the names of the restored keys.
#[must_use]
pub fn carry_forward_shipment_fields(stored: &Value, incoming: Value) -> (Value, Vec<&'static str>) {
    let Some(stored_shipping) = super::doc::shipping(stored) else {
        return (incoming, Vec::new());
    };

    let mut map = into_object(incoming);
    let mut shipping = take_object(&mut map, SHIPPING);
    let mut restored = Vec::new();
    for key in CARRIED_FIELDS {
        let incoming_missing = shipping.get(key).is_none_or(is_blank);
        if let Some(value) = stored_shipping.get(key).filter(|v| !is_blank(v))
            && incoming_missing
        {
            shipping.insert(key.to_string(), value.clone());
            restored.push(key);
        }
    }
    map.insert(SHIPPING.to_string(), Value::Object(shipping));
    (Value::Object(map), restored)
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
