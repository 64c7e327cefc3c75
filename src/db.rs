use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

use crate::config::DuplicatePhonePolicy;
use crate::errors::{AppError, ResultExt};

const SCHEMA_SQL: &str = include_str!("../migrations/0001_create_leads.sql");

/// Unique index that enforces one lead per phone number.
pub const PHONE_UNIQUE_INDEX: &str = "leads_phone_number_key";

/// Explicit connection handle for the lead database.
///
/// `connect` is idempotent: it hands out the live pool, or opens a new one
/// when none exists or the previous one was closed. Only reconnects are
/// serialized; callers holding a live pool never wait on them.
pub struct Database {
    url: String,
    max_connections: u32,
    policy: DuplicatePhonePolicy,
    pool: RwLock<Option<PgPool>>,
    connecting: Mutex<()>,
}

impl Database {
    pub fn new(url: impl Into<String>, max_connections: u32, policy: DuplicatePhonePolicy) -> Self {
        Self {
            url: url.into(),
            max_connections,
            policy,
            pool: RwLock::new(None),
            connecting: Mutex::new(()),
        }
    }

    /// Returns a live pool, connecting and bootstrapping the schema if needed.
    pub async fn connect(&self) -> Result<PgPool, AppError> {
        if let Some(pool) = self.live_pool().await {
            return Ok(pool);
        }

        let _connecting = self.connecting.lock().await;
        // Another caller may have reconnected while we waited
        if let Some(pool) = self.live_pool().await {
            return Ok(pool);
        }
        if self.pool.read().await.is_some() {
            tracing::warn!("Database pool was closed; reconnecting");
        }

        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&self.url)
            .await
            .context("connecting to database")?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .context("database health probe")?;

        bootstrap_schema(&pool, self.policy).await?;

        tracing::info!(
            "Database connection pool established (max {} connections)",
            self.max_connections
        );
        *self.pool.write().await = Some(pool.clone());
        Ok(pool)
    }

    async fn live_pool(&self) -> Option<PgPool> {
        self.pool
            .read()
            .await
            .as_ref()
            .filter(|pool| !pool.is_closed())
            .cloned()
    }

    /// Closes the pool. A later `connect` opens a fresh one.
    pub async fn close(&self) {
        let pool = self.pool.write().await.take();
        if let Some(pool) = pool {
            pool.close().await;
            tracing::info!("Database connection pool closed");
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.live_pool().await.is_some()
    }
}

/// Creates the `leads` table and indexes, then applies the duplicate-phone policy
/// by creating or dropping the unique phone index.
async fn bootstrap_schema(pool: &PgPool, policy: DuplicatePhonePolicy) -> Result<(), AppError> {
    sqlx::raw_sql(SCHEMA_SQL)
        .execute(pool)
        .await
        .context("creating leads schema")?;

    match policy {
        DuplicatePhonePolicy::Reject => {
            sqlx::query(&format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {} ON leads (phone_number)",
                PHONE_UNIQUE_INDEX
            ))
            .execute(pool)
            .await
            .context("creating unique phone index (existing duplicates must be removed first)")?;
            tracing::info!("Duplicate phone numbers rejected ({} active)", PHONE_UNIQUE_INDEX);
        }
        DuplicatePhonePolicy::Allow => {
            sqlx::query(&format!("DROP INDEX IF EXISTS {}", PHONE_UNIQUE_INDEX))
                .execute(pool)
                .await
                .context("dropping unique phone index")?;
            tracing::info!("Duplicate phone numbers allowed");
        }
    }

    Ok(())
}
