//! Order webhook processing.
//!
//! ## Processing Flow
//!
//! ```text
//! raw body (signature already verified) → parse_event() → OrderProcessor::process() → OrderOutcome
//! ```

pub mod plans;
pub mod processor;
pub mod types;

pub use plans::{PlanMapping, PlanTier, PLAN_TABLE, PLAN_TABLE_VERSION};
pub use processor::{parse_event, OrderOutcome, OrderProcessor, ProcessError};
pub use types::{OrderCreatedData, WebhookEvent, ORDER_CREATED};
