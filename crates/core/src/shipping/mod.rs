//! Shipping metadata reconciliation.
//!
//! Every order carries a semi-structured metadata document. Its shipping part
//! looks like this:
//!
//! ```json
//! {
//!   "shipping_pricing": {"carrier_cents": 14964, "packaging_cents": 2000,
//!                        "margin_cents": 3671, "total_cents": 21635,
//!                        "customer_total_cents": 21635},
//!   "shipping": {
//!     "rate_used": {"external_rate_id": "...", "provider": "...", "service": "...",
//!                   "carrier_cents": 14964, "price_cents": 21635,
//!                   "customer_total_cents": 21635},
//!     "shipment_id": "...", "tracking_number": "...", "label_url": "...",
//!     "status": "label_created",
//!     "label_creation": {"status": "created", "started_at": "...", "finished_at": "..."},
//!     "_last_write": {"route": "webhook", "at": "...", "revision": "..."}
//!   }
//! }
//! ```
//!
//! Writers never assemble this document by hand; they build a candidate and
//! pass it through [`reconcile`].

pub mod address;
pub mod coerce;
pub mod doc;
pub mod extract;
pub mod facts;
pub mod label;
pub mod normalize;
pub mod preserve;
pub mod pricing;
pub mod rate;
pub mod reconcile;
pub mod status;
pub mod webhook;

pub use address::{AddressFields, normalize_address};
pub use coerce::coerce_cents;
pub use extract::{ExtractionStrategy, TrackingAndLabel, extract_tracking_and_label};
pub use facts::{MirrorColumns, ShipmentFacts, changed_fields, merge_facts};
pub use label::LabelCreationStatus;
pub use normalize::{NormalizeContext, NormalizedShipping, normalize_shipping_metadata};
pub use preserve::{Preserved, ensure_rate_used_in_metadata, preserve_rate_used};
pub use pricing::{PricingBreakdown, RateUsedCents};
pub use rate::{RateSelection, apply_rate_selection};
pub use reconcile::{ReconcileContext, ReconcileReport, Reconciled, reconcile};
pub use status::ShippingStatus;
pub use webhook::{WebhookEvent, WebhookPayload};
