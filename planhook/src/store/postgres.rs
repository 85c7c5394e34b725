//! PostgreSQL user store.
//!
//! One pool is built at startup and shared by every request. The pool
//! connects lazily, so the service can start while the database is down and
//! pick it up once it returns; requests in the meantime fail individually
//! after the acquire timeout.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use super::{PlanWrite, StoreError, UserStore};
use crate::order::PlanTier;
use crate::Config;

/// Longest identifier PostgreSQL keeps without truncation.
const MAX_IDENTIFIER_LEN: usize = 63;

/// PostgreSQL implementation of [`UserStore`].
///
/// Users live in a single table with `email` as primary key, which is what
/// makes every write an atomic single-row upsert or update.
pub struct PostgresUserStore {
    pool: PgPool,
    table: String,
    schema_ready: OnceCell<()>,
}

impl PostgresUserStore {
    /// Build a lazily connecting pool from the service configuration.
    pub fn from_config(config: &Config) -> Result<Self, StoreError> {
        let mut options = PgConnectOptions::from_str(&config.database_url)?;
        if let Some(name) = &config.database_name {
            options = options.database(name);
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.store_max_connections.max(1))
            .acquire_timeout(config.store_acquire_timeout())
            .idle_timeout(Duration::from_secs(600))
            .connect_lazy_with(options);

        Self::new(pool, &config.users_table)
    }

    /// Wrap an existing pool. The table name must be a plain identifier.
    pub fn new(pool: PgPool, table: &str) -> Result<Self, StoreError> {
        validate_table_name(table)?;
        Ok(Self {
            pool,
            table: table.to_string(),
            schema_ready: OnceCell::new(),
        })
    }

    /// Create the users table once per process.
    ///
    /// `main` runs this through [`UserStore::prepare`] before serving; writes
    /// still call it so a store that was unreachable at startup catches up.
    /// Replicas racing on `CREATE TABLE IF NOT EXISTS` can lose with a
    /// unique violation on the catalog (23505) or "already exists" (42P07);
    /// either means the table is there.
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.schema_ready
            .get_or_try_init(|| async {
                let sql = format!(
                    "CREATE TABLE IF NOT EXISTS {} (\
                         email TEXT PRIMARY KEY, \
                         plan SMALLINT NOT NULL DEFAULT 0 CHECK (plan BETWEEN 0 AND 3)\
                     )",
                    self.table
                );
                match sqlx::query(&sql).execute(&self.pool).await {
                    Ok(_) => info!(table = %self.table, "postgres_schema_ready"),
                    Err(e) if is_concurrent_create(&e) => {
                        info!(table = %self.table, "postgres_schema_created_concurrently")
                    }
                    Err(e) => return Err(classify(e)),
                }
                Ok::<_, StoreError>(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for PostgresUserStore {
    async fn upsert_plan(&self, email: &str, plan: PlanTier) -> Result<PlanWrite, StoreError> {
        self.ensure_schema().await?;

        // xmax is zero only on a freshly inserted row version
        let sql = format!(
            "INSERT INTO {} (email, plan) VALUES ($1, $2) \
             ON CONFLICT (email) DO UPDATE SET plan = EXCLUDED.plan \
             RETURNING (xmax = 0) AS inserted",
            self.table
        );

        let inserted: bool = sqlx::query_scalar(&sql)
            .bind(email)
            .bind(plan.level())
            .fetch_one(&self.pool)
            .await
            .map_err(classify)?;

        Ok(if inserted {
            PlanWrite::Created
        } else {
            PlanWrite::Updated
        })
    }

    async fn update_plan(&self, email: &str, plan: PlanTier) -> Result<PlanWrite, StoreError> {
        self.ensure_schema().await?;

        let sql = format!("UPDATE {} SET plan = $2 WHERE email = $1", self.table);

        let result = sqlx::query(&sql)
            .bind(email)
            .bind(plan.level())
            .execute(&self.pool)
            .await
            .map_err(classify)?;

        Ok(if result.rows_affected() == 0 {
            PlanWrite::NotFound
        } else {
            PlanWrite::Updated
        })
    }

    async fn find_plan(&self, email: &str) -> Result<Option<PlanTier>, StoreError> {
        self.ensure_schema().await?;

        let sql = format!("SELECT plan FROM {} WHERE email = $1", self.table);

        let level: Option<i16> = sqlx::query_scalar(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;

        match level {
            None => Ok(None),
            Some(level) => PlanTier::from_level(level)
                .map(Some)
                .ok_or(StoreError::CorruptPlan(level)),
        }
    }

    async fn prepare(&self) -> Result<(), StoreError> {
        self.ensure_schema().await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn close(&self) {
        if self.pool.is_closed() {
            warn!("postgres_pool_already_closed");
            return;
        }
        self.pool.close().await;
        info!("postgres_pool_closed");
    }
}

/// Connection-level failures become `Unavailable`; the rest stay as-is.
fn classify(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable("timed out acquiring a connection".to_string())
        }
        sqlx::Error::PoolClosed => StoreError::Unavailable("pool is closed".to_string()),
        sqlx::Error::Io(e) => StoreError::Unavailable(e.to_string()),
        other => StoreError::Database(other),
    }
}

/// Whether a DDL error only means another process created the table first.
fn is_concurrent_create(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            matches!(db.code().as_deref(), Some("23505") | Some("42P07"))
        }
        _ => false,
    }
}

/// Accept `table` or `schema.table` made of ASCII letters, digits and `_`.
///
/// The name is interpolated into SQL, so nothing else gets through.
fn validate_table_name(table: &str) -> Result<(), StoreError> {
    let valid_part = |part: &str| {
        !part.is_empty()
            && part.len() <= MAX_IDENTIFIER_LEN
            && part
                .chars()
                .next()
                .map_or(false, |c| c.is_ascii_alphabetic() || c == '_')
            && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    };

    let parts: Vec<&str> = table.split('.').collect();
    if parts.len() > 2 || !parts.iter().all(|p| valid_part(p)) {
        return Err(StoreError::InvalidTable(table.to_string()));
    }
    Ok(())
}
