//! The single reconcile pipeline every write path goes through.
//!
//! ```text
//! candidate ──► normalize ──► carry forward ──► preserve ──► ensure ──► stamp _last_write
//!                 (pricing wins)   (ids)         (vs stored)   (final guard)
//! ```
//!
//! `stored` must be the freshest copy of the document available, read
//! immediately before the write.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::doc::{LAST_WRITE, SHIPPING, into_object, take_object};
use super::facts::MirrorColumns;
use super::normalize::{NormalizeContext, normalize_shipping_metadata};
use super::preserve::{carry_forward_shipment_fields, ensure_rate_used, preserve_rate_used};

/// Who is writing, and when.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileContext<'a> {
    /// Route name recorded in `_last_write.route`.
    pub source: &'a str,
    pub order_id: Option<&'a str>,
    /// Code revision recorded in `_last_write.revision`.
    pub revision: &'a str,
    pub now: DateTime<Utc>,
}

/// Diagnostics collected while reconciling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub canonical_detected: bool,
    pub mismatch_detected: bool,
    pub pricing_corrected: bool,
    pub rate_used_overwritten: bool,
    pub rate_used_restored: bool,
    pub pricing_restored: bool,
    pub rate_used_ensured: bool,
    pub carried_forward: Vec<&'static str>,
}

/// Output of [`reconcile`]: the document to persist and the columns to mirror.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub metadata: Value,
    pub mirrors: MirrorColumns,
    pub report: ReconcileReport,
}

/// Reconcile an incoming candidate document against the stored one.
#[must_use]
pub fn reconcile(stored: &Value, incoming: Value, ctx: &ReconcileContext<'_>) -> Reconciled {
    let normalize_ctx = NormalizeContext::new(ctx.source, ctx.order_id);
    let normalized = normalize_shipping_metadata(&incoming, &normalize_ctx);

    let mut report = ReconcileReport {
        canonical_detected: normalized.canonical_detected(),
        mismatch_detected: normalized.mismatch_detected,
        pricing_corrected: normalized.corrected,
        rate_used_overwritten: normalized.rate_used_overwritten,
        ..ReconcileReport::default()
    };
    let candidate = normalized.apply_to(incoming);

    let (candidate, carried_forward) = carry_forward_shipment_fields(stored, candidate);
    report.carried_forward = carried_forward;

    let preserved = preserve_rate_used(stored, candidate);
    report.rate_used_restored = preserved.rate_used_restored;
    report.pricing_restored = preserved.pricing_restored;

    let (ensured, rate_used_ensured) = ensure_rate_used(preserved.metadata);
    report.rate_used_ensured = rate_used_ensured;
    if !report.canonical_detected && report.pricing_restored {
        report.canonical_detected = true;
    }

    let metadata = stamp_last_write(ensured, ctx, &report);
    let mirrors = MirrorColumns::from_metadata(&metadata);

    debug!(
        source = ctx.source,
        order_id = ctx.order_id.unwrap_or("unknown"),
        report = ?report,
        "Reconciled shipping metadata"
    );

    Reconciled {
        metadata,
        mirrors,
        report,
    }
}

fn stamp_last_write(metadata: Value, ctx: &ReconcileContext<'_>, report: &ReconcileReport) -> Value {
    let mut last_write = Map::new();
    last_write.insert("route".to_string(), Value::from(ctx.source));
    last_write.insert("at".to_string(), Value::from(ctx.now.to_rfc3339()));
    last_write.insert("revision".to_string(), Value::from(ctx.revision));
    if let Some(order_id) = ctx.order_id {
        last_write.insert("order_id".to_string(), Value::from(order_id));
    }
    last_write.insert("canonical_detected".to_string(), Value::from(report.canonical_detected));
    last_write.insert("mismatch_detected".to_string(), Value::from(report.mismatch_detected));
    last_write.insert(
        "rate_used_overwritten".to_string(),
        Value::from(report.rate_used_overwritten),
    );
    last_write.insert("rate_used_restored".to_string(), Value::from(report.rate_used_restored));

    let mut map = into_object(metadata);
    let mut shipping = take_object(&mut map, SHIPPING);
    shipping.insert(LAST_WRITE.to_string(), Value::Object(last_write));
    map.insert(SHIPPING.to_string(), Value::Object(shipping));
    Value::Object(map)
}
