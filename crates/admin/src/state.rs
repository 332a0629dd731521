//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::AdminConfig;
use crate::db::{OrderRepository, ShippingEventRepository};
use crate::services::{EmailNotifier, ShippingService};
use crate::skydropx::{SkydropxClient, SkydropxError};

/// The shipping service wired to Postgres, Skydropx and SMTP.
pub type AdminShipping<'a> = ShippingService<
    OrderRepository<'a>,
    ShippingEventRepository<'a>,
    SkydropxClient,
    EmailNotifier,
>;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: AdminConfig,
    pool: PgPool,
    skydropx: Option<SkydropxClient>,
    notifier: EmailNotifier,
}

impl AppState {
    /// Build state from configuration and a connected pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the Skydropx HTTP client cannot be built.
    pub fn new(config: AdminConfig, pool: PgPool) -> Result<Self, SkydropxError> {
        let skydropx = config.skydropx().map(SkydropxClient::new).transpose()?;
        if skydropx.is_none() {
            tracing::warn!("Skydropx not configured, label creation and sync are disabled");
        }
        let notifier = EmailNotifier::from_config(config.email());

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                skydropx,
                notifier,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &AdminConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Shipping orchestrators bound to this request's borrow of the pool.
    #[must_use]
    pub fn shipping(&self) -> AdminShipping<'_> {
        let provider = self.inner.skydropx.clone().zip(
            self.inner
                .config
                .skydropx()
                .map(|skydropx| skydropx.origin.clone()),
        );
        ShippingService::new(
            OrderRepository::new(&self.inner.pool),
            ShippingEventRepository::new(&self.inner.pool),
            self.inner.notifier.clone(),
            self.inner.config.shipping.clone(),
        )
        .with_optional_provider(provider)
    }
}
