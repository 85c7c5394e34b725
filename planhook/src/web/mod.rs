//! Web server module for handling inbound order webhooks.
//!
//! This module provides the HTTP surface:
//! - `GET /webhook`: plain-text liveness acknowledgement
//! - `GET /health`: JSON liveness
//! - `POST /webhook`: signed order notifications
//!
//! Requests are handled inline; there is no queue behind the handler.

pub mod handlers;
pub mod signature;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

pub use handlers::{
    health, order_webhook, webhook_liveness, AppState, HealthResponse, WebhookResponse,
};
pub use signature::{sign_payload, verify_order_signature};

/// Canonical webhook path for both the liveness check and deliveries.
pub const WEBHOOK_PATH: &str = "/webhook";

/// Build the router with tracing attached.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(WEBHOOK_PATH, get(webhook_liveness).post(order_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
