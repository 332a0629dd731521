//! Tolerant extraction of tracking data from provider responses.
//!
//! The provider has shipped several response shapes over time. Each known
//! shape is a [`ShapeMatcher`]; matchers are tried in priority order and the
//! first one that yields anything decides the reported strategy. A field the
//! winning shape lacks may still be filled by a later shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::doc::{non_empty_string, path};

/// Which response shape produced the extracted values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// `data.attributes.master_tracking_number`
    JsonApiMasterTracking,
    /// `data.attributes.tracking_number` / `label_url`
    JsonApiAttributes,
    /// `included[]` entries of type `packages`
    JsonApiIncludedPackages,
    /// Top-level `tracking_number` / `label_url`
    LegacyFlat,
    /// `shipment.tracking_number` / `shipment.label_url`
    LegacyShipment,
    None,
}

impl ExtractionStrategy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::JsonApiMasterTracking => "json_api_master_tracking",
            Self::JsonApiAttributes => "json_api_attributes",
            Self::JsonApiIncludedPackages => "json_api_included_packages",
            Self::LegacyFlat => "legacy_flat",
            Self::LegacyShipment => "legacy_shipment",
            Self::None => "none",
        }
    }
}

impl std::fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracking number and label URL pulled out of a provider response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackingAndLabel {
    pub tracking_number: Option<String>,
    pub label_url: Option<String>,
    pub strategy: ExtractionStrategy,
}

impl TrackingAndLabel {
    #[must_use]
    pub const fn none() -> Self {
        Self {
            tracking_number: None,
            label_url: None,
            strategy: ExtractionStrategy::None,
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.tracking_number.is_none() && self.label_url.is_none()
    }
}

#[derive(Debug, Default)]
struct Candidate {
    tracking_number: Option<String>,
    label_url: Option<String>,
}

impl Candidate {
    const fn is_empty(&self) -> bool {
        self.tracking_number.is_none() && self.label_url.is_none()
    }
}

/// One known response shape.
struct ShapeMatcher {
    strategy: ExtractionStrategy,
    extract: fn(&Value) -> Candidate,
}

const SHAPES: &[ShapeMatcher] = &[
    ShapeMatcher {
        strategy: ExtractionStrategy::JsonApiMasterTracking,
        extract: master_tracking,
    },
    ShapeMatcher {
        strategy: ExtractionStrategy::JsonApiAttributes,
        extract: json_api_attributes,
    },
    ShapeMatcher {
        strategy: ExtractionStrategy::JsonApiIncludedPackages,
        extract: included_packages,
    },
    ShapeMatcher {
        strategy: ExtractionStrategy::LegacyFlat,
        extract: legacy_flat,
    },
    ShapeMatcher {
        strategy: ExtractionStrategy::LegacyShipment,
        extract: legacy_shipment,
    },
];

fn master_tracking(response: &Value) -> Candidate {
    let Some(tracking_number) = non_empty_string(path(
        response,
        &["data", "attributes", "master_tracking_number"],
    )) else {
        return Candidate::default();
    };
    Candidate {
        tracking_number: Some(tracking_number),
        label_url: non_empty_string(path(response, &["data", "attributes", "label_url"])),
    }
}

fn json_api_attributes(response: &Value) -> Candidate {
    Candidate {
        tracking_number: non_empty_string(path(
            response,
            &["data", "attributes", "tracking_number"],
        )),
        label_url: non_empty_string(path(response, &["data", "attributes", "label_url"])),
    }
}

fn included_packages(response: &Value) -> Candidate {
    let Some(included) = response.get("included").and_then(Value::as_array) else {
        return Candidate::default();
    };

    let mut candidate = Candidate::default();
    for entry in included {
        let is_package = entry
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|kind| matches!(kind, "packages" | "package"));
        if !is_package {
            continue;
        }
        if candidate.tracking_number.is_none() {
            candidate.tracking_number =
                non_empty_string(path(entry, &["attributes", "tracking_number"]));
        }
        if candidate.label_url.is_none() {
            candidate.label_url = non_empty_string(path(entry, &["attributes", "label_url"]));
        }
        if candidate.tracking_number.is_some() && candidate.label_url.is_some() {
            break;
        }
    }
    candidate
}

fn legacy_flat(response: &Value) -> Candidate {
    Candidate {
        tracking_number: non_empty_string(response.get("tracking_number")),
        label_url: non_empty_string(response.get("label_url")),
    }
}

fn legacy_shipment(response: &Value) -> Candidate {
    Candidate {
        tracking_number: non_empty_string(path(response, &["shipment", "tracking_number"])),
        label_url: non_empty_string(path(response, &["shipment", "label_url"])),
    }
}

/// Pull a tracking number and label URL out of any known response shape.
///
/// Never fails; an unrecognized response yields [`TrackingAndLabel::none`].
#[must_use]
pub fn extract_tracking_and_label(response: &Value) -> TrackingAndLabel {
    let mut result = TrackingAndLabel::none();

    for shape in SHAPES {
        let candidate = (shape.extract)(response);
        if candidate.is_empty() {
            continue;
        }
        if result.strategy == ExtractionStrategy::None {
            result.strategy = shape.strategy;
        }
        if result.tracking_number.is_none() {
            result.tracking_number = candidate.tracking_number;
        }
        if result.label_url.is_none() {
            result.label_url = candidate.label_url;
        }
        if result.tracking_number.is_some() && result.label_url.is_some() {
            break;
        }
    }

    result
}

/// Provider shipment id from a shipment response.
#[must_use]
pub fn extract_shipment_id(response: &Value) -> Option<String> {
    non_empty_string(path(response, &["data", "id"]))
        .or_else(|| non_empty_string(response.get("id")))
        .or_else(|| non_empty_string(path(response, &["shipment", "id"])))
        .or_else(|| non_empty_string(path(response, &["data", "attributes", "shipment_id"])))
}

/// Provider-reported status from a shipment response.
#[must_use]
pub fn extract_status(response: &Value) -> Option<String> {
    non_empty_string(path(response, &["data", "attributes", "status"]))
        .or_else(|| non_empty_string(path(response, &["data", "attributes", "workflow_status"])))
        .or_else(|| non_empty_string(response.get("status")))
        .or_else(|| non_empty_string(path(response, &["shipment", "status"])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_master_tracking_has_priority() {
        let response = json!({
            "data": {
                "attributes": {
                    "master_tracking_number": "MASTER1",
                    "tracking_number": "CHILD1",
                    "label_url": "https://labels.example/1.pdf"
                }
            }
        });
        let extracted = extract_tracking_and_label(&response);
        assert_eq!(extracted.tracking_number.as_deref(), Some("MASTER1"));
        assert_eq!(extracted.label_url.as_deref(), Some("https://labels.example/1.pdf"));
        assert_eq!(extracted.strategy, ExtractionStrategy::JsonApiMasterTracking);
    }

    #[test]
    fn test_plain_attributes_are_not_tagged_master() {
        let response = json!({
            "data": {"attributes": {"tracking_number": "T1", "label_url": "https://l/1.pdf"}}
        });
        let extracted = extract_tracking_and_label(&response);
        assert_eq!(extracted.tracking_number.as_deref(), Some("T1"));
        assert_eq!(extracted.label_url.as_deref(), Some("https://l/1.pdf"));
        assert_eq!(extracted.strategy, ExtractionStrategy::JsonApiAttributes);
    }

    #[test]
    fn test_included_packages() {
        let response = json!({
            "data": {"id": "shp_1", "attributes": {"status": "created"}},
            "included": [
                {"type": "rates", "attributes": {"tracking_number": "WRONG"}},
                {"type": "packages", "attributes": {"tracking_number": "PKG1", "label_url": "https://labels.example/p.pdf"}}
            ]
        });
        let extracted = extract_tracking_and_label(&response);
        assert_eq!(extracted.tracking_number.as_deref(), Some("PKG1"));
        assert_eq!(extracted.label_url.as_deref(), Some("https://labels.example/p.pdf"));
        assert_eq!(extracted.strategy, ExtractionStrategy::JsonApiIncludedPackages);
    }

    #[test]
    fn test_later_shape_fills_missing_label() {
        let response = json!({
            "data": {"attributes": {"tracking_number": "TRK1"}},
            "included": [{"type": "packages", "attributes": {"label_url": "https://labels.example/l.pdf"}}]
        });
        let extracted = extract_tracking_and_label(&response);
        assert_eq!(extracted.tracking_number.as_deref(), Some("TRK1"));
        assert_eq!(extracted.label_url.as_deref(), Some("https://labels.example/l.pdf"));
        assert_eq!(extracted.strategy, ExtractionStrategy::JsonApiAttributes);
    }

    #[test]
    fn test_legacy_shapes() {
        let flat = json!({"tracking_number": 123_456, "label_url": " https://l.example/a "});
        let extracted = extract_tracking_and_label(&flat);
        assert_eq!(extracted.tracking_number.as_deref(), Some("123456"));
        assert_eq!(extracted.label_url.as_deref(), Some("https://l.example/a"));
        assert_eq!(extracted.strategy, ExtractionStrategy::LegacyFlat);

        let nested = json!({"shipment": {"tracking_number": "TRK9"}});
        let extracted = extract_tracking_and_label(&nested);
        assert_eq!(extracted.tracking_number.as_deref(), Some("TRK9"));
        assert_eq!(extracted.strategy, ExtractionStrategy::LegacyShipment);
    }

    #[test]
    fn test_unrecognized_shapes_yield_none() {
        for response in [json!(null), json!([]), json!("text"), json!({"data": {"attributes": {"tracking_number": ""}}})] {
            assert_eq!(extract_tracking_and_label(&response), TrackingAndLabel::none());
        }
    }

    #[test]
    fn test_shipment_id_and_status() {
        let response = json!({"data": {"id": "shp_1", "attributes": {"status": "in_transit"}}});
        assert_eq!(extract_shipment_id(&response).as_deref(), Some("shp_1"));
        assert_eq!(extract_status(&response).as_deref(), Some("in_transit"));

        let legacy = json!({"shipment": {"id": 77, "status": "delivered"}});
        assert_eq!(extract_shipment_id(&legacy).as_deref(), Some("77"));
        assert_eq!(extract_status(&legacy).as_deref(), Some("delivered"));
    }
}
