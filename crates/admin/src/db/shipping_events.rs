//! Shipping event log repository.

use serde_json::Value;
use sqlx::PgPool;

use nopal_core::OrderId;

use super::RepositoryError;
use crate::services::shipping::ports::EventLog;

/// Repository for the `shipping_events` table.
pub struct ShippingEventRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ShippingEventRepository<'a> {
    /// Create a new shipping event repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }
}

impl EventLog for ShippingEventRepository<'_> {
    async fn insert_event_if_absent(
        &self,
        provider: &str,
        provider_event_id: &str,
        order_id: Option<OrderId>,
        payload: &Value,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            INSERT INTO shipping_events (provider, provider_event_id, order_id, payload)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (provider, provider_event_id) DO NOTHING
            ",
        )
        .bind(provider)
        .bind(provider_event_id)
        .bind(order_id)
        .bind(payload)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn remove_event(
        &self,
        provider: &str,
        provider_event_id: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "DELETE FROM shipping_events WHERE provider = $1 AND provider_event_id = $2",
        )
        .bind(provider)
        .bind(provider_event_id)
        .execute(self.pool)
        .await?;

        Ok(())
    }
}
