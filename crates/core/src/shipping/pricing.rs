//! Typed views over the pricing and `rate_used` sub-documents.

use serde::Serialize;
use serde_json::{Map, Value};

use super::coerce::{cents_field, is_integer_field};
use super::doc::{
    CARRIER_CENTS, CUSTOMER_TOTAL_CENTS, LEGACY_PRICING, MARGIN_CENTS, PACKAGING_CENTS,
    PRICE_CENTS, SHIPPING, SHIPPING_PRICING, TOTAL_CENTS,
};

const PRICING_FIELDS: [&str; 5] = [
    CARRIER_CENTS,
    PACKAGING_CENTS,
    MARGIN_CENTS,
    TOTAL_CENTS,
    CUSTOMER_TOTAL_CENTS,
];

const RATE_USED_FIELDS: [&str; 3] = [CARRIER_CENTS, PRICE_CENTS, CUSTOMER_TOTAL_CENTS];

/// Where canonical pricing was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingSource {
    /// `metadata.shipping_pricing`
    ShippingPricing,
    /// `metadata.shipping.pricing`, written by older checkout code.
    LegacyShippingPricing,
}

/// Canonical pricing breakdown, coerced to integer cents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PricingBreakdown {
    pub carrier_cents: Option<i64>,
    pub packaging_cents: Option<i64>,
    pub margin_cents: Option<i64>,
    pub total_cents: Option<i64>,
    pub customer_total_cents: Option<i64>,
}

impl PricingBreakdown {
    /// Read and coerce every pricing field from a pricing object.
    #[must_use]
    pub fn from_object(map: &Map<String, Value>) -> Self {
        Self {
            carrier_cents: cents_field(map, CARRIER_CENTS),
            packaging_cents: cents_field(map, PACKAGING_CENTS),
            margin_cents: cents_field(map, MARGIN_CENTS),
            total_cents: cents_field(map, TOTAL_CENTS),
            customer_total_cents: cents_field(map, CUSTOMER_TOTAL_CENTS),
        }
    }

    /// Whether any field carries a number.
    #[must_use]
    pub const fn has_numeric_values(&self) -> bool {
        self.carrier_cents.is_some()
            || self.packaging_cents.is_some()
            || self.margin_cents.is_some()
            || self.total_cents.is_some()
            || self.customer_total_cents.is_some()
    }

    /// `carrier + packaging + margin`, when all three are present.
    #[must_use]
    pub fn component_sum(&self) -> Option<i64> {
        self.carrier_cents?
            .checked_add(self.packaging_cents?)?
            .checked_add(self.margin_cents?)
    }

    /// Whether two breakdowns describe the same applied rate.
    #[must_use]
    pub fn same_rate_as(&self, other: &Self) -> bool {
        self.total_cents == other.total_cents && self.carrier_cents == other.carrier_cents
    }

    /// Write every present field into `map` as an integer; absent fields are left alone.
    pub fn write_into(&self, map: &mut Map<String, Value>) {
        let fields = [
            (CARRIER_CENTS, self.carrier_cents),
            (PACKAGING_CENTS, self.packaging_cents),
            (MARGIN_CENTS, self.margin_cents),
            (TOTAL_CENTS, self.total_cents),
            (CUSTOMER_TOTAL_CENTS, self.customer_total_cents),
        ];
        for (key, value) in fields {
            if let Some(cents) = value {
                map.insert(key.to_string(), Value::from(cents));
            }
        }
    }
}

/// Whether a pricing object stores any coercible field in a non-integer form.
#[must_use]
pub fn needs_integer_rewrite(map: &Map<String, Value>) -> bool {
    PRICING_FIELDS
        .iter()
        .any(|key| cents_field(map, key).is_some() && !is_integer_field(map, key))
}

/// The numeric mirror fields of `shipping.rate_used`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RateUsedCents {
    pub carrier_cents: Option<i64>,
    pub price_cents: Option<i64>,
    pub customer_total_cents: Option<i64>,
}

impl RateUsedCents {
    #[must_use]
    pub fn from_object(map: &Map<String, Value>) -> Self {
        Self {
            carrier_cents: cents_field(map, CARRIER_CENTS),
            price_cents: cents_field(map, PRICE_CENTS),
            customer_total_cents: cents_field(map, CUSTOMER_TOTAL_CENTS),
        }
    }

    #[must_use]
    pub fn from_metadata(metadata: &Value) -> Self {
        super::doc::rate_used(metadata)
            .map(Self::from_object)
            .unwrap_or_default()
    }

    /// Whether any of the cents fields is populated.
    #[must_use]
    pub const fn is_populated(&self) -> bool {
        self.carrier_cents.is_some()
            || self.price_cents.is_some()
            || self.customer_total_cents.is_some()
    }

    /// Whether these cents agree with `pricing` and none of the required ones is null.
    #[must_use]
    pub fn agrees_with(&self, pricing: &PricingBreakdown) -> bool {
        let Some(total) = pricing.total_cents else {
            return false;
        };
        let carrier_ok = match pricing.carrier_cents {
            Some(carrier) => self.carrier_cents == Some(carrier),
            None => self.carrier_cents.is_some(),
        };
        self.price_cents == Some(total) && self.customer_total_cents == Some(total) && carrier_ok
    }
}

/// Whether a `rate_used` object stores any cents field in a non-integer form.
#[must_use]
pub fn rate_used_needs_integer_rewrite(map: &Map<String, Value>) -> bool {
    RATE_USED_FIELDS
        .iter()
        .any(|key| cents_field(map, key).is_some() && !is_integer_field(map, key))
}

/// Locate canonical pricing: `shipping_pricing` first, then `shipping.pricing`.
#[must_use]
pub fn locate_pricing(metadata: &Value) -> Option<(PricingSource, &Map<String, Value>)> {
    if let Some(map) = metadata.get(SHIPPING_PRICING).and_then(Value::as_object) {
        return Some((PricingSource::ShippingPricing, map));
    }
    metadata
        .get(SHIPPING)
        .and_then(|shipping| shipping.get(LEGACY_PRICING))
        .and_then(Value::as_object)
        .map(|map| (PricingSource::LegacyShippingPricing, map))
}

/// Canonical pricing of a document, coerced; `None` when no pricing object exists.
#[must_use]
pub fn canonical_pricing(metadata: &Value) -> Option<PricingBreakdown> {
    locate_pricing(metadata).map(|(_, map)| PricingBreakdown::from_object(map))
}
