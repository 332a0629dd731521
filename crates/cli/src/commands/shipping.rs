//! Shipping maintenance commands.
//!
//! # Usage
//!
//! ```bash
//! # Reconcile a metadata document offline (file or stdin)
//! nopal-cli shipping normalize --file metadata.json --source backfill
//! cat metadata.json | nopal-cli shipping normalize
//!
//! # Pull an order's shipment state from Skydropx and store it
//! nopal-cli shipping sync --order-id 9b2f7c1e-4a0d-4e55-8a57-0f4f3c1d2b6a
//! ```

use std::io::Read;
use std::path::Path;

use chrono::Utc;
use nopal_admin::config::{AdminConfig, ConfigError};
use nopal_admin::db;
use nopal_admin::services::ShippingError;
use nopal_admin::skydropx::SkydropxError;
use nopal_admin::state::AppState;
use nopal_core::OrderId;
use nopal_core::shipping::{ReconcileContext, reconcile};
use serde_json::{Map, Value, json};
use thiserror::Error;

/// Errors that can occur during shipping commands.
#[derive(Debug, Error)]
pub enum ShippingCommandError {
    #[error("Failed to read input: {0}")]
    Io(#[from] std::io::Error),

    #[error("Input is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid order id: {0}")]
    InvalidOrderId(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Skydropx client error: {0}")]
    Skydropx(#[from] SkydropxError),

    #[error("Sync failed: {0}")]
    Shipping(#[from] ShippingError),
}

/// Reconcile `input` as a fresh write from `source` and describe the result.
#[must_use]
pub fn normalize_document(input: Value, source: &str, order_id: Option<&str>) -> Value {
    let revision = env!("CARGO_PKG_VERSION");
    let ctx = ReconcileContext {
        source,
        order_id,
        revision,
        now: Utc::now(),
    };
    let reconciled = reconcile(&Value::Object(Map::new()), input, &ctx);
    json!({
        "metadata": reconciled.metadata,
        "mirrors": reconciled.mirrors,
        "report": reconciled.report,
    })
}

/// Read a metadata document from `file` (or stdin), reconcile it and print the result.
///
/// # Errors
///
/// Returns an error if the input cannot be read or is not JSON.
pub fn normalize(
    file: Option<&Path>,
    source: &str,
    order_id: Option<&str>,
) -> Result<(), ShippingCommandError> {
    let raw = match file {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };
    let input: Value = serde_json::from_str(&raw)?;
    let output = normalize_document(input, source, order_id);

    if output["report"]["mismatch_detected"] == json!(true) {
        tracing::warn!(source = %source, "Pricing mismatch detected and corrected");
    }

    #[allow(clippy::print_stdout)]
    {
        println!("{}", serde_json::to_string_pretty(&output)?);
    }
    Ok(())
}

/// Run the admin sync path for one order.
///
/// # Errors
///
/// Returns an error if configuration is missing, the database is unreachable
/// or the sync itself fails (including `tracking_pending`).
pub async fn sync(order_id: &str) -> Result<(), ShippingCommandError> {
    let order_id = OrderId::parse(order_id)
        .map_err(|_| ShippingCommandError::InvalidOrderId(order_id.to_owned()))?;

    let config = AdminConfig::from_env()?;
    tracing::info!("Connecting to admin database...");
    let pool = db::create_pool(&config.database_url).await?;
    let state = AppState::new(config, pool)?;

    let outcome = state.shipping().sync_order(order_id).await?;
    tracing::info!(
        order_id = %order_id,
        changed = ?outcome.changed,
        "Sync complete"
    );

    #[allow(clippy::print_stdout)]
    {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_stamps_source() {
        let output = normalize_document(
            json!({"shipping_pricing": {"carrier_cents": 14964, "total_cents": 21635}}),
            "backfill",
            Some("order-1"),
        );
        let last_write = &output["metadata"]["shipping"]["_last_write"];
        assert_eq!(last_write["route"], json!("backfill"));
        assert_eq!(last_write["order_id"], json!("order-1"));
        assert_eq!(output["report"]["canonical_detected"], json!(true));
    }

    #[test]
    fn test_normalize_mirrors_tracking() {
        let output = normalize_document(
            json!({"shipping": {"tracking_number": "TRK1", "status": "in_transit"}}),
            "cli",
            None,
        );
        assert_eq!(output["mirrors"]["tracking_number"], json!("TRK1"));
        assert_eq!(output["mirrors"]["status"], json!("in_transit"));
    }
}
