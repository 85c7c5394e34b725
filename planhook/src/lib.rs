//! Planhook - order webhook receiver that syncs purchased plans onto users.
//!
//! The storefront calls us when an order is created. We check the HMAC
//! signature, map the purchased product to a plan tier, and set that tier on
//! the buyer's user record.
//!
//! ## Architecture
//!
//! ```text
//! POST /webhook → signature check (raw bytes) → OrderProcessor → UserStore
//! ```

pub mod config;
pub mod order;
pub mod store;
pub mod web;

// Re-export commonly used types
pub use config::{Config, PlanPolicy, StoreBackend};
pub use order::{OrderOutcome, OrderProcessor, PlanMapping, PlanTier, ProcessError};
pub use store::{MemoryUserStore, PostgresUserStore, StoreError, UserStore};
pub use web::AppState;
