//! The `shipping.label_creation` sub-document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::doc::{LABEL_CREATION, SHIPPING, STATUS, into_object, object, string_field, take_object};
use crate::ShippingErrorCode;

pub const STARTED_AT: &str = "started_at";
pub const FINISHED_AT: &str = "finished_at";
pub const REQUEST_ID: &str = "request_id";
pub const ERROR_CODE: &str = "error_code";

/// Lifecycle of one label-generation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelCreationStatus {
    /// A request holds the one-shot claim and is talking to the provider.
    InProgress,
    /// The provider accepted the shipment but has not produced a label yet.
    Pending,
    Created,
    Failed,
}

impl LabelCreationStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Pending => "pending",
            Self::Created => "created",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "in_progress" => Some(Self::InProgress),
            "pending" => Some(Self::Pending),
            "created" => Some(Self::Created),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for LabelCreationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current `label_creation.status` of a metadata document.
#[must_use]
pub fn label_creation_status(metadata: &Value) -> Option<LabelCreationStatus> {
    let shipping = object(metadata, SHIPPING)?;
    let label_creation = shipping.get(LABEL_CREATION)?.as_object()?;
    LabelCreationStatus::parse(&string_field(label_creation, STATUS)?)
}

fn edit_label_creation(metadata: Value, edit: impl FnOnce(&mut Map<String, Value>)) -> Value {
    let mut map = into_object(metadata);
    let mut shipping = take_object(&mut map, SHIPPING);
    let mut label_creation = take_object(&mut shipping, LABEL_CREATION);
    edit(&mut label_creation);
    shipping.insert(LABEL_CREATION.to_string(), Value::Object(label_creation));
    map.insert(SHIPPING.to_string(), Value::Object(shipping));
    Value::Object(map)
}

/// `label_creation` sub-document for a fresh claim.
///
/// The store writes it only while no other unexpired claim is held.
#[must_use]
pub fn claim(request_id: &str, now: DateTime<Utc>) -> Value {
    let mut label = Map::new();
    label.insert(STATUS.to_string(), Value::from(LabelCreationStatus::InProgress.as_str()));
    label.insert(REQUEST_ID.to_string(), Value::from(request_id));
    label.insert(STARTED_AT.to_string(), Value::from(now.to_rfc3339()));
    Value::Object(label)
}

/// Provider accepted the shipment; label still outstanding.
#[must_use]
pub fn mark_pending(metadata: Value) -> Value {
    edit_label_creation(metadata, |label| {
        label.insert(STATUS.to_string(), Value::from(LabelCreationStatus::Pending.as_str()));
    })
}

/// Label exists. Keeps an earlier `finished_at`.
#[must_use]
pub fn mark_created(metadata: Value, now: DateTime<Utc>) -> Value {
    edit_label_creation(metadata, |label| {
        label.insert(STATUS.to_string(), Value::from(LabelCreationStatus::Created.as_str()));
        if string_field(label, FINISHED_AT).is_none() {
            label.insert(FINISHED_AT.to_string(), Value::from(now.to_rfc3339()));
        }
        label.remove(ERROR_CODE);
    })
}

#[must_use]
pub fn mark_failed(metadata: Value, code: ShippingErrorCode, now: DateTime<Utc>) -> Value {
    edit_label_creation(metadata, |label| {
        label.insert(STATUS.to_string(), Value::from(LabelCreationStatus::Failed.as_str()));
        label.insert(ERROR_CODE.to_string(), Value::from(code.as_str()));
        label.insert(FINISHED_AT.to_string(), Value::from(now.to_rfc3339()));
    })
}

/// When the current claim was taken, if one is recorded.
#[must_use]
pub fn claim_started_at(metadata: &Value) -> Option<DateTime<Utc>> {
    let shipping = object(metadata, SHIPPING)?;
    let label_creation = shipping.get(LABEL_CREATION)?.as_object()?;
    let raw = string_field(label_creation, STARTED_AT)?;
    DateTime::parse_from_rfc3339(&raw)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).single().unwrap_or_default()
    }

    #[test]
    fn test_claim_then_create() {
        let claimed = json!({
            "shipping": {
                "rate_used": {"price_cents": 1},
                "label_creation": claim("req-1", at(10))
            }
        });

        assert_eq!(label_creation_status(&claimed), Some(LabelCreationStatus::InProgress));
        assert_eq!(claim_started_at(&claimed), Some(at(10)));
        assert_eq!(claimed["shipping"]["rate_used"]["price_cents"], json!(1));

        let created = mark_created(claimed, at(11));
        assert_eq!(label_creation_status(&created), Some(LabelCreationStatus::Created));
        assert_eq!(created["shipping"]["label_creation"]["request_id"], json!("req-1"));

        let again = mark_created(created.clone(), at(12));
        assert_eq!(
            again["shipping"]["label_creation"]["finished_at"],
            created["shipping"]["label_creation"]["finished_at"]
        );
    }

    #[test]
    fn test_failure_records_code() {
        let failed = mark_failed(json!({}), ShippingErrorCode::SkydropxBadRequest, at(9));
        assert_eq!(label_creation_status(&failed), Some(LabelCreationStatus::Failed));
        assert_eq!(
            failed["shipping"]["label_creation"]["error_code"],
            json!("skydropx_bad_request")
        );
    }

    #[test]
    fn test_unknown_status_is_none() {
        let metadata = json!({"shipping": {"label_creation": {"status": "weird"}}});
        assert_eq!(label_creation_status(&metadata), None);
    }
}
