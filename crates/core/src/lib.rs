//! Nopal Core - Shipping metadata reconciliation.
//!
//! This crate owns the rules that keep an order's shipping metadata document
//! consistent while several independent writers (rate application, label
//! creation, provider webhooks, admin resyncs) race to update it:
//! - `admin` - Back-office service that hosts the write paths
//! - `cli` - Command-line tools for migrations and offline inspection
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. Every write path calls the same
//! [`shipping::reconcile`] pipeline, so the invariants live in one place.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs and the stable error-code taxonomy
//! - [`shipping`] - Normalizers, preservation helpers, extractors, reconcile

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod shipping;
pub mod types;

pub use types::*;
