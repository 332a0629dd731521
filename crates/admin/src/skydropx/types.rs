//! Request and response types for Skydropx shipment creation.

use nopal_core::shipping::doc::{non_empty_string, path};
use nopal_core::shipping::extract::{extract_shipment_id, extract_status};
use nopal_core::shipping::{AddressFields, extract_tracking_and_label, normalize_address};
use serde::Serialize;
use serde_json::Value;

use crate::config::OriginAddress;

/// Address in the shape Skydropx expects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShipmentAddress {
    pub name: String,
    pub street1: String,
    /// State.
    #[serde(rename = "area_level1")]
    pub state: String,
    /// City or municipality.
    #[serde(rename = "area_level2")]
    pub city: String,
    /// Neighborhood, when the order carries one.
    #[serde(rename = "area_level3", skip_serializing_if = "Option::is_none")]
    pub neighborhood: Option<String>,
    pub postal_code: String,
    pub country_code: String,
    pub phone: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl ShipmentAddress {
    /// Build the destination from an order's `shipping_address` document.
    ///
    /// Common key aliases are accepted (`address1`, `zip`, `province`, ...).
    /// State and city pass through [`normalize_address`]. Missing fields are
    /// left empty so [`CreateShipmentInput::validate`] can enumerate them.
    #[must_use]
    pub fn from_order_json(address: &Value, fallback_email: Option<&str>) -> Self {
        let pick = |keys: &[&str]| {
            keys.iter()
                .find_map(|key| non_empty_string(address.get(*key)))
                .unwrap_or_default()
        };

        let name = {
            let direct = pick(&["name", "full_name", "recipient"]);
            if direct.is_empty() {
                let first = pick(&["first_name"]);
                let last = pick(&["last_name"]);
                format!("{first} {last}").trim().to_string()
            } else {
                direct
            }
        };

        let geo = normalize_address(&AddressFields::new(
            &pick(&["state", "province", "area_level1"]),
            &pick(&["city", "municipality", "area_level2"]),
            &pick(&["postal_code", "postalCode", "zip"]),
        ));

        let email = {
            let direct = pick(&["email"]);
            if direct.is_empty() {
                fallback_email.map(str::trim).unwrap_or_default().to_string()
            } else {
                direct
            }
        };

        let country = pick(&["country_code", "country"]);
        let neighborhood = pick(&["neighborhood", "colonia", "area_level3"]);
        let reference = pick(&["reference", "address2", "notes"]);

        Self {
            name,
            street1: pick(&["street1", "address1", "street", "line1"]),
            state: geo.state,
            city: geo.city,
            neighborhood: (!neighborhood.is_empty()).then_some(neighborhood),
            postal_code: geo.postal_code,
            country_code: if country.is_empty() { "MX".to_string() } else { country },
            phone: pick(&["phone", "phone_number"]),
            email,
            reference: (!reference.is_empty()).then_some(reference),
        }
    }

    /// Build the origin from configuration.
    #[must_use]
    pub fn from_origin(origin: &OriginAddress) -> Self {
        let geo = normalize_address(&AddressFields::new(
            &origin.state,
            &origin.city,
            &origin.postal_code,
        ));
        Self {
            name: origin.name.trim().to_string(),
            street1: origin.street1.trim().to_string(),
            state: geo.state,
            city: geo.city,
            neighborhood: None,
            postal_code: geo.postal_code,
            country_code: origin.country.trim().to_string(),
            phone: origin.phone.trim().to_string(),
            email: origin.email.trim().to_string(),
            reference: None,
        }
    }
}

/// Everything needed to purchase a label for a previously quoted rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateShipmentInput {
    pub rate_id: String,
    pub address_from: ShipmentAddress,
    pub address_to: ShipmentAddress,
    /// Our order id, echoed back by the provider.
    pub reference: String,
}

#[derive(Serialize)]
struct CreateShipmentBody<'a> {
    shipment: CreateShipmentShipment<'a>,
}

#[derive(Serialize)]
struct CreateShipmentShipment<'a> {
    rate_id: &'a str,
    printing_format: &'static str,
    reference: &'a str,
    address_from: &'a ShipmentAddress,
    address_to: &'a ShipmentAddress,
}

impl CreateShipmentInput {
    /// Required fields that are blank, in a stable order.
    #[must_use]
    pub fn validate(&self) -> Vec<&'static str> {
        let to = &self.address_to;
        [
            ("rate_id", self.rate_id.as_str()),
            ("address_to.name", to.name.as_str()),
            ("address_to.street1", to.street1.as_str()),
            ("address_to.city", to.city.as_str()),
            ("address_to.state", to.state.as_str()),
            ("address_to.postal_code", to.postal_code.as_str()),
            ("address_to.phone", to.phone.as_str()),
            ("address_to.email", to.email.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect()
    }

    /// Request body for `POST /api/v1/shipments`.
    #[must_use]
    pub fn to_body(&self) -> Value {
        let body = CreateShipmentBody {
            shipment: CreateShipmentShipment {
                rate_id: &self.rate_id,
                printing_format: "standard",
                reference: &self.reference,
                address_from: &self.address_from,
                address_to: &self.address_to,
            },
        };
        serde_json::to_value(body).unwrap_or(Value::Null)
    }
}

/// Result of shipment creation.
///
/// Skydropx creates shipments asynchronously: the response often carries an
/// id and a workflow status but no tracking number yet.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedShipment {
    pub shipment_id: Option<String>,
    pub tracking_number: Option<String>,
    pub label_url: Option<String>,
    /// Provider workflow status while the label is still being generated.
    pub polling: Option<String>,
    pub raw: Value,
}

impl CreatedShipment {
    #[must_use]
    pub fn from_response(raw: Value) -> Self {
        let extracted = extract_tracking_and_label(&raw);
        let polling = non_empty_string(path(&raw, &["data", "attributes", "workflow_status"]))
            .or_else(|| extract_status(&raw));
        Self {
            shipment_id: extract_shipment_id(&raw),
            tracking_number: extracted.tracking_number,
            label_url: extracted.label_url,
            polling,
            raw,
        }
    }

    #[must_use]
    pub const fn has_tracking(&self) -> bool {
        self.tracking_number.is_some()
    }
}
