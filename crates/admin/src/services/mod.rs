//! Business logic services for admin.
//!
//! # Services
//!
//! - `email` - Shipping notifications via SMTP
//! - `shipping` - Shipping write-path orchestrators (webhook, sync, label, rate)

pub mod email;
pub mod shipping;

pub use email::{EmailError, EmailNotifier, EmailService};
pub use shipping::{ShippingError, ShippingService};
