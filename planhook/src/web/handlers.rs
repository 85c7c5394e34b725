//! Webhook endpoint handlers.
//!
//! The order webhook handler:
//! 1. Takes the body as raw bytes
//! 2. Verifies the HMAC signature over those exact bytes
//! 3. Parses and processes the event
//! 4. Maps the outcome to a status code
//!
//! Every failure is turned into a response here; nothing propagates further.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::order::{parse_event, OrderOutcome, OrderProcessor, PlanTier, ProcessError};
use crate::store::StoreError;
use crate::web::signature::verify_order_signature;
use crate::Config;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub processor: Arc<OrderProcessor>,
}

impl AppState {
    pub fn new(config: Config, processor: OrderProcessor) -> Self {
        Self {
            config: Arc::new(config),
            processor: Arc::new(processor),
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Plain-text liveness check on the webhook path itself.
pub async fn webhook_liveness() -> &'static str {
    "Webhook accessible"
}

// =============================================================================
// Order Webhook
// =============================================================================

/// Webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<PlanTier>,
}

impl WebhookResponse {
    fn new(status: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            plan: None,
        }
    }
}

type WebhookReply = (StatusCode, Json<WebhookResponse>);

/// Order webhook endpoint.
///
/// The body is extracted as `Bytes`, not `Json`, so the signature is checked
/// against exactly what the sender signed.
pub async fn order_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> WebhookReply {
    let signature = headers
        .get(state.config.signature_header.as_str())
        .and_then(|v| v.to_str().ok());

    info!(
        body_length = body.len(),
        has_signature = signature.is_some(),
        "order_webhook_received"
    );

    if !verify_order_signature(state.config.webhook_secret.as_deref(), &body, signature) {
        warn!(
            signature_header = %state.config.signature_header,
            "order_webhook_signature_invalid"
        );
        return (
            StatusCode::BAD_REQUEST,
            Json(WebhookResponse::new("invalid_signature", "Invalid signature")),
        );
    }

    let event = match parse_event(&body) {
        Ok(event) => event,
        Err(e) => return process_error_reply(e),
    };

    match state.processor.process(event).await {
        Ok(OrderOutcome::Ignored { event }) => (
            StatusCode::OK,
            Json(WebhookResponse::new(
                "ignored",
                format!("Event {} ignored", event),
            )),
        ),
        Ok(OrderOutcome::Updated {
            email,
            plan,
            created,
        }) => {
            info!(email = %email, plan = plan.level(), created = created, "order_webhook_applied");
            (
                StatusCode::OK,
                Json(WebhookResponse {
                    status: "updated",
                    message: "Plan upgraded successfully".to_string(),
                    plan: Some(plan),
                }),
            )
        }
        Err(e) => process_error_reply(e),
    }
}

fn process_error_reply(err: ProcessError) -> WebhookReply {
    match err {
        ProcessError::InvalidPayload(reason) => {
            warn!(reason = %reason, "order_webhook_invalid_payload");
            (
                StatusCode::BAD_REQUEST,
                Json(WebhookResponse::new("invalid_payload", reason)),
            )
        }
        ProcessError::UserNotFound(_) => (
            StatusCode::NOT_FOUND,
            Json(WebhookResponse::new("not_found", "User not found")),
        ),
        ProcessError::Store(e) => {
            let unavailable = matches!(e, StoreError::Unavailable(_));
            error!(error = %e, store_unavailable = unavailable, "order_webhook_store_failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(WebhookResponse::new("error", "Internal Server Error")),
            )
        }
    }
}
