//! Core types for Nopal.
//!
//! This module provides type-safe wrappers for identifiers and the error-code
//! vocabulary shared by every shipping write path.

pub mod error_code;
pub mod id;

pub use error_code::ShippingErrorCode;
pub use id::*;
