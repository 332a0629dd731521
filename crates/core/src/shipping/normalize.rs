//! Metadata normalizer.
//!
//! `shipping_pricing` is the single source of truth for every numeric shipping
//! field. `shipping.rate_used` is a derived cache of it: whenever canonical
//! pricing has a total, the three mirrored cents fields of `rate_used` are
//! overwritten from pricing, whatever they held before. All other `rate_used`
//! keys (`external_rate_id`, `provider`, `service`, `selection_source`, ...)
//! are carried through untouched.
//!
//! Carrier correction only fires on the two signatures a bad writer actually
//! leaves behind: a carrier amount that exceeds the total, or one that equals
//! the total while packaging or margin are non-zero (the total was written
//! into the carrier slot). Any other gap between the total and the component
//! sum is an unitemized adjustment and is left alone.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::coerce::cents_field;
use super::doc::{
    self, CARRIER_CENTS, CUSTOMER_TOTAL_CENTS, PRICE_CENTS, RATE_USED, SHIPPING,
    SHIPPING_PRICING, into_object, take_object,
};
use super::pricing::{PricingBreakdown, PricingSource, locate_pricing, needs_integer_rewrite};

/// Who is normalizing, for diagnostics only.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeContext<'a> {
    /// Write path name (`webhook`, `sync_label`, `create_label`, `apply_rate`, ...).
    pub source: &'a str,
    pub order_id: Option<&'a str>,
}

impl<'a> NormalizeContext<'a> {
    #[must_use]
    pub const fn new(source: &'a str, order_id: Option<&'a str>) -> Self {
        Self { source, order_id }
    }
}

/// Output of [`normalize_shipping_metadata`].
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedShipping {
    /// The updated `shipping` sub-document.
    pub shipping_meta: Map<String, Value>,
    /// Pricing document to merge back as `shipping_pricing`, present when the
    /// stored one needed correction or was promoted from `shipping.pricing`.
    pub shipping_pricing: Option<Map<String, Value>>,
    /// Canonical pricing after correction.
    pub pricing: Option<PricingBreakdown>,
    pub pricing_source: Option<PricingSource>,
    /// Stored values disagreed with the recomputation (pricing or `rate_used`).
    pub mismatch_detected: bool,
    /// The pricing document itself was changed.
    pub corrected: bool,
    /// A non-null `rate_used` cents value was replaced by a different one.
    pub rate_used_overwritten: bool,
}

impl NormalizedShipping {
    /// Whether canonical pricing with a numeric total was found.
    #[must_use]
    pub fn canonical_detected(&self) -> bool {
        self.pricing.is_some_and(|p| p.total_cents.is_some())
    }

    /// Merge the normalized sub-documents back into `metadata`.
    #[must_use]
    pub fn apply_to(self, metadata: Value) -> Value {
        let mut map = into_object(metadata);
        map.insert(SHIPPING.to_string(), Value::Object(self.shipping_meta));
        if let Some(pricing) = self.shipping_pricing {
            map.insert(SHIPPING_PRICING.to_string(), Value::Object(pricing));
        }
        Value::Object(map)
    }
}

/// Recompute canonical pricing and force `rate_used` to agree with it.
#[must_use]
pub fn normalize_shipping_metadata(
    metadata: &Value,
    ctx: &NormalizeContext<'_>,
) -> NormalizedShipping {
    let mut shipping_meta = doc::shipping(metadata).cloned().unwrap_or_default();

    let Some((source, raw_pricing)) = locate_pricing(metadata) else {
        debug!(source = ctx.source, "No shipping pricing to normalize");
        return NormalizedShipping {
            shipping_meta,
            shipping_pricing: None,
            pricing: None,
            pricing_source: None,
            mismatch_detected: false,
            corrected: false,
            rate_used_overwritten: false,
        };
    };

    let original = PricingBreakdown::from_object(raw_pricing);
    let correction = correct_pricing(original);
    let pricing = correction.pricing;
    let corrected = correction.changed || needs_integer_rewrite(raw_pricing);

    let shipping_pricing = (corrected || source == PricingSource::LegacyShippingPricing).then(|| {
        let mut map = raw_pricing.clone();
        pricing.write_into(&mut map);
        map
    });

    let mut rate_used_overwritten = false;
    if let Some(total) = pricing.total_cents {
        let mut rate_used = take_object(&mut shipping_meta, RATE_USED);
        rate_used_overwritten = force_rate_used_cents(&mut rate_used, &pricing, total);
        shipping_meta.insert(RATE_USED.to_string(), Value::Object(rate_used));
    }

    let mismatch_detected = correction.mismatch || rate_used_overwritten;
    if mismatch_detected {
        warn!(
            source = ctx.source,
            order_id = ctx.order_id.unwrap_or("unknown"),
            stored_carrier_cents = ?original.carrier_cents,
            carrier_cents = ?pricing.carrier_cents,
            total_cents = ?pricing.total_cents,
            pricing_corrected = correction.mismatch,
            rate_used_overwritten,
            "Shipping pricing mismatch detected"
        );
    }

    NormalizedShipping {
        shipping_meta,
        shipping_pricing,
        pricing: Some(pricing),
        pricing_source: Some(source),
        mismatch_detected,
        corrected,
        rate_used_overwritten,
    }
}

/// Convenience wrapper: normalize and merge back in one step.
#[must_use]
pub fn normalize_metadata_document(metadata: Value, ctx: &NormalizeContext<'_>) -> Value {
    normalize_shipping_metadata(&metadata, ctx).apply_to(metadata)
}

struct Correction {
    pricing: PricingBreakdown,
    mismatch: bool,
    changed: bool,
}

fn correct_pricing(original: PricingBreakdown) -> Correction {
    let mut pricing = original;
    let mut mismatch = false;

    if pricing.total_cents.is_none() {
        pricing.total_cents = pricing.component_sum();
    }

    if let (Some(total), Some(sum)) = (original.total_cents, original.component_sum()) {
        // The stored total stays authoritative; the disagreement is only reported.
        mismatch = total != sum;
    }

    if let Some(total) = pricing.total_cents {
        let extras = pricing
            .packaging_cents
            .unwrap_or(0)
            .saturating_add(pricing.margin_cents.unwrap_or(0));
        let recomputed = total.checked_sub(extras).filter(|cents| *cents >= 0);

        match pricing.carrier_cents {
            None if pricing.packaging_cents.is_some() || pricing.margin_cents.is_some() => {
                pricing.carrier_cents = recomputed;
            }
            Some(carrier) if carrier > total || (carrier == total && extras > 0) => {
                mismatch = true;
                if recomputed.is_some() {
                    pricing.carrier_cents = recomputed;
                }
            }
            _ => {}
        }

        if pricing.customer_total_cents.is_none() {
            pricing.customer_total_cents = Some(total);
        }
    }

    Correction {
        changed: pricing != original,
        pricing,
        mismatch,
    }
}

/// Overwrite the mirrored cents fields; returns whether a different non-null value was replaced.
fn force_rate_used_cents(
    rate_used: &mut Map<String, Value>,
    pricing: &PricingBreakdown,
    total: i64,
) -> bool {
    let targets = [
        (PRICE_CENTS, Some(total)),
        (CARRIER_CENTS, pricing.carrier_cents),
        (CUSTOMER_TOTAL_CENTS, Some(total)),
    ];

    let mut overwritten = false;
    for (key, target) in targets {
        let Some(target) = target else {
            continue;
        };
        if let Some(previous) = cents_field(rate_used, key)
            && previous != target
        {
            overwritten = true;
        }
        rate_used.insert(key.to_string(), Value::from(target));
    }
    overwritten
}
