//! Order repository for the shipping write paths.
//!
//! Queries are checked at runtime (`sqlx::query_as`) so the crate builds
//! without a live database.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use nopal_core::OrderId;

use super::RepositoryError;
use crate::services::shipping::ports::{OrderRecord, OrderStore, OrderWrite};

const ORDER_COLUMNS: &str = "id, metadata, shipping_tracking_number, shipping_label_url, \
     shipping_status, shipping_shipment_id, shipping_address, customer_email, updated_at";

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    metadata: Value,
    shipping_tracking_number: Option<String>,
    shipping_label_url: Option<String>,
    shipping_status: Option<String>,
    shipping_shipment_id: Option<String>,
    shipping_address: Value,
    customer_email: Option<String>,
    updated_at: DateTime<Utc>,
}

impl From<OrderRow> for OrderRecord {
    fn from(row: OrderRow) -> Self {
        Self {
            id: OrderId::new(row.id),
            metadata: row.metadata,
            shipping_tracking_number: row.shipping_tracking_number,
            shipping_label_url: row.shipping_label_url,
            shipping_status: row.shipping_status,
            shipping_shipment_id: row.shipping_shipment_id,
            shipping_address: row.shipping_address,
            customer_email: row.customer_email,
            updated_at: row.updated_at,
        }
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for order shipping state.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_where(
        &self,
        condition: &str,
        value: &str,
    ) -> Result<Option<OrderRecord>, RepositoryError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE {condition} LIMIT 1");
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(value)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(OrderRecord::from))
    }

    /// Legacy lookup restricted to the `window` most recently updated orders.
    async fn fetch_recent_where(
        &self,
        condition: &str,
        value: &str,
        window: i64,
    ) -> Result<Option<OrderRecord>, RepositoryError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM ( \
                 SELECT {ORDER_COLUMNS} FROM orders ORDER BY updated_at DESC LIMIT $2 \
             ) recent WHERE {condition} ORDER BY updated_at DESC LIMIT 1"
        );
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(value)
            .bind(window)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(OrderRecord::from))
    }

    async fn write(
        &self,
        id: OrderId,
        write: &OrderWrite,
        only_untracked: bool,
    ) -> Result<Option<OrderRecord>, RepositoryError> {
        let guard = if only_untracked {
            " AND shipping_tracking_number IS NULL"
        } else {
            ""
        };
        let sql = format!(
            "UPDATE orders SET \
                 metadata = $2, \
                 shipping_tracking_number = COALESCE($3, shipping_tracking_number), \
                 shipping_label_url = COALESCE($4, shipping_label_url), \
                 shipping_status = COALESCE($5, shipping_status), \
                 shipping_shipment_id = COALESCE($6, shipping_shipment_id), \
                 updated_at = NOW() \
             WHERE id = $1{guard} \
             RETURNING {ORDER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id)
            .bind(&write.metadata)
            .bind(write.mirrors.tracking_number.as_deref())
            .bind(write.mirrors.label_url.as_deref())
            .bind(write.mirrors.status.as_deref())
            .bind(write.mirrors.shipment_id.as_deref())
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(OrderRecord::from))
    }
}

impl OrderStore for OrderRepository<'_> {
    async fn get_order(&self, id: OrderId) -> Result<Option<OrderRecord>, RepositoryError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(OrderRecord::from))
    }

    async fn find_by_shipment_id(
        &self,
        shipment_id: &str,
    ) -> Result<Option<OrderRecord>, RepositoryError> {
        self.fetch_one_where("shipping_shipment_id = $1", shipment_id)
            .await
    }

    async fn find_by_metadata_shipment_id(
        &self,
        shipment_id: &str,
        window: i64,
    ) -> Result<Option<OrderRecord>, RepositoryError> {
        self.fetch_recent_where(
            "recent.metadata #>> '{shipping,shipment_id}' = $1",
            shipment_id,
            window,
        )
        .await
    }

    async fn find_by_tracking_number(
        &self,
        tracking_number: &str,
    ) -> Result<Option<OrderRecord>, RepositoryError> {
        self.fetch_one_where("shipping_tracking_number = $1", tracking_number)
            .await
    }

    async fn find_by_metadata_tracking_number(
        &self,
        tracking_number: &str,
        window: i64,
    ) -> Result<Option<OrderRecord>, RepositoryError> {
        self.fetch_recent_where(
            "recent.metadata #>> '{shipping,tracking_number}' = $1",
            tracking_number,
            window,
        )
        .await
    }

    async fn update_shipping(
        &self,
        id: OrderId,
        write: &OrderWrite,
    ) -> Result<OrderRecord, RepositoryError> {
        self.write(id, write, false)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    async fn update_shipping_if_untracked(
        &self,
        id: OrderId,
        write: &OrderWrite,
    ) -> Result<Option<OrderRecord>, RepositoryError> {
        self.write(id, write, true).await
    }

    async fn claim_label(
        &self,
        id: OrderId,
        label_creation: &Value,
        stale_before: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET metadata = jsonb_set(
                    CASE WHEN jsonb_typeof(metadata -> 'shipping') = 'object'
                         THEN metadata
                         ELSE metadata || '{"shipping": {}}'::jsonb
                    END,
                    '{shipping,label_creation}',
                    $2,
                    true
                ),
                updated_at = NOW()
            WHERE id = $1
              AND shipping_tracking_number IS NULL
              AND NULLIF(metadata #>> '{shipping,tracking_number}', '') IS NULL
              AND (
                  metadata #>> '{shipping,label_creation,status}' IS DISTINCT FROM 'in_progress'
                  OR COALESCE(
                      (metadata #>> '{shipping,label_creation,started_at}')::timestamptz,
                      '-infinity'::timestamptz
                  ) < $3
              )
            "#,
        )
        .bind(id)
        .bind(label_creation)
        .bind(stale_before)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
