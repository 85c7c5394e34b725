//! User store port and its implementations.
//!
//! The processor only sees [`UserStore`]. Each write is a single atomic
//! statement keyed by email, so concurrent webhooks for the same user need no
//! in-process locking.
//!
//! - [`PostgresUserStore`]: pooled PostgreSQL client used in production
//! - [`MemoryUserStore`]: process-local map for local runs and tests

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use crate::order::PlanTier;

pub use memory::MemoryUserStore;
pub use postgres::PostgresUserStore;

/// What a plan write did to the user record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanWrite {
    /// No record existed; one was created with the plan.
    Created,
    /// An existing record's plan was set.
    Updated,
    /// No record existed and none was created.
    NotFound,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A row holds a level outside the known tiers, which only happens
    /// when the table was created without the `plan` CHECK constraint.
    #[error("stored plan level {0} is not a known tier")]
    CorruptPlan(i16),

    #[error("invalid table name {0:?}")]
    InvalidTable(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persistence for user plan levels, keyed by unique email.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Set the user's plan, creating the record if it does not exist.
    ///
    /// Returns [`PlanWrite::Created`] or [`PlanWrite::Updated`].
    async fn upsert_plan(&self, email: &str, plan: PlanTier) -> Result<PlanWrite, StoreError>;

    /// Set the plan of an existing user only.
    ///
    /// Returns [`PlanWrite::Updated`] or [`PlanWrite::NotFound`].
    async fn update_plan(&self, email: &str, plan: PlanTier) -> Result<PlanWrite, StoreError>;

    /// Current plan for `email`, if the user exists.
    ///
    /// Not on the webhook path; used by operational checks and tests to
    /// read back what a write stored.
    async fn find_plan(&self, email: &str) -> Result<Option<PlanTier>, StoreError>;

    /// Create the schema the store needs. Run once at startup, before
    /// serving. Safe when several replicas start against the same database.
    async fn prepare(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Check that the store is reachable.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Release pooled connections. Further calls fail with `Unavailable`.
    async fn close(&self);
}
