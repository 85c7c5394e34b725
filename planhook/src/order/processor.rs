//! Order event processing.
//!
//! Turns a verified webhook into at most one plan write:
//!
//! ```text
//! WebhookEvent → filter → extract email/title → resolve tier → store write → OrderOutcome
//! ```

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};

use super::plans::{PlanMapping, PlanTier};
use super::types::{OrderCreatedData, WebhookEvent, ORDER_CREATED};
use crate::config::PlanPolicy;
use crate::store::{PlanWrite, StoreError, UserStore};

/// Successful result of processing one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderOutcome {
    /// The event type is not one we act on. Nothing was written.
    Ignored { event: String },
    /// The user's plan was set, `created` when the record was new.
    Updated {
        email: String,
        plan: PlanTier,
        created: bool,
    },
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("no user with email {0}")]
    UserNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Parse a raw body into the webhook envelope.
///
/// Call this only after the signature has been checked against the same bytes.
pub fn parse_event(body: &[u8]) -> Result<WebhookEvent, ProcessError> {
    serde_json::from_slice(body).map_err(|e| ProcessError::InvalidPayload(e.to_string()))
}

/// Applies `order.created` events to the user store.
#[derive(Clone)]
pub struct OrderProcessor {
    store: Arc<dyn UserStore>,
    plans: PlanMapping,
    policy: PlanPolicy,
}

impl OrderProcessor {
    pub fn new(store: Arc<dyn UserStore>, plans: PlanMapping, policy: PlanPolicy) -> Self {
        Self {
            store,
            plans,
            policy,
        }
    }

    /// Process one verified event.
    ///
    /// Writes exactly once for a well-formed `order.created` event and never
    /// otherwise. The write sets the plan rather than adjusting it, so a
    /// redelivered event leaves the same final state.
    pub async fn process(&self, event: WebhookEvent) -> Result<OrderOutcome, ProcessError> {
        if event.event != ORDER_CREATED {
            info!(event = %event.event, "order_event_ignored");
            return Ok(OrderOutcome::Ignored { event: event.event });
        }

        let data: OrderCreatedData = serde_json::from_value(event.data)
            .map_err(|e| ProcessError::InvalidPayload(e.to_string()))?;

        let email = data.customer_email().trim();
        if email.is_empty() || !email.contains('@') {
            warn!(email_length = email.len(), "order_invalid_customer_email");
            return Err(ProcessError::InvalidPayload(
                "customer_email is not an email address".to_string(),
            ));
        }

        let title = data.first_product_title().ok_or_else(|| {
            warn!(email = %email, "order_without_product_variants");
            ProcessError::InvalidPayload("product_variants is empty".to_string())
        })?;

        let plan = self.plans.resolve(title);
        if !self.plans.is_known(title) {
            warn!(
                product_title = %title,
                table_version = self.plans.version(),
                "order_unknown_product_defaulting_to_free"
            );
        }

        info!(
            email = %email,
            product_title = %title,
            plan = plan.level(),
            policy = self.policy.as_str(),
            "order_plan_resolved"
        );

        let write = match self.policy {
            PlanPolicy::Upsert => self.store.upsert_plan(email, plan).await,
            PlanPolicy::RequireExisting => self.store.update_plan(email, plan).await,
        };

        match write {
            Ok(PlanWrite::Created) => {
                info!(email = %email, plan = plan.level(), "order_user_created");
                Ok(OrderOutcome::Updated {
                    email: email.to_string(),
                    plan,
                    created: true,
                })
            }
            Ok(PlanWrite::Updated) => {
                info!(email = %email, plan = plan.level(), "order_plan_updated");
                Ok(OrderOutcome::Updated {
                    email: email.to_string(),
                    plan,
                    created: false,
                })
            }
            Ok(PlanWrite::NotFound) => {
                warn!(email = %email, "order_user_not_found");
                Err(ProcessError::UserNotFound(email.to_string()))
            }
            Err(e) => {
                error!(email = %email, error = %e, "order_plan_write_failed");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryUserStore;

    fn order_body(event: &str, email: &str, title: &str) -> String {
        format!(
            r#"{{"event":"{}","data":{{"payment":{{"gateway":{{"data":{{"customer_email":"{}"}}}}}},"product_variants":[{{"product_title":"{}"}}]}}}}"#,
            event, email, title
        )
    }

    fn build_processor(store: Arc<MemoryUserStore>, policy: PlanPolicy) -> OrderProcessor {
        OrderProcessor::new(store, PlanMapping::default(), policy)
    }

    async fn run(processor: &OrderProcessor, body: &str) -> Result<OrderOutcome, ProcessError> {
        processor.process(parse_event(body.as_bytes())?).await
    }

    #[tokio::test]
    async fn test_known_product_sets_plan() {
        let store = Arc::new(MemoryUserStore::new());
        let processor = build_processor(store.clone(), PlanPolicy::Upsert);

        let outcome = run(&processor, &order_body("order.created", "a@x.com", "Pro"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            OrderOutcome::Updated {
                email: "a@x.com".to_string(),
                plan: PlanTier::Pro,
                created: true,
            }
        );
        assert_eq!(store.find_plan("a@x.com").await.unwrap(), Some(PlanTier::Pro));
    }

    #[tokio::test]
    async fn test_unknown_product_sets_free() {
        let store = Arc::new(MemoryUserStore::with_users([("a@x.com", PlanTier::Pro)]));
        let processor = build_processor(store.clone(), PlanPolicy::Upsert);

        run(&processor, &order_body("order.created", "a@x.com", "Unknown"))
            .await
            .unwrap();

        assert_eq!(store.find_plan("a@x.com").await.unwrap(), Some(PlanTier::Free));
    }

    #[tokio::test]
    async fn test_other_events_are_ignored_without_write() {
        let store = Arc::new(MemoryUserStore::new());
        let processor = build_processor(store.clone(), PlanPolicy::Upsert);

        for event in ["order.refunded", "order.updated", "ORDER.CREATED", ""] {
            let outcome = run(&processor, &order_body(event, "a@x.com", "Pro"))
                .await
                .unwrap();
            assert_eq!(
                outcome,
                OrderOutcome::Ignored {
                    event: event.to_string()
                }
            );
        }

        // Ignored events need no particular data shape
        let outcome = run(&processor, r#"{"event":"customer.deleted","data":[1,2]}"#)
            .await
            .unwrap();
        assert!(matches!(outcome, OrderOutcome::Ignored { .. }));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_replay_is_idempotent() {
        let store = Arc::new(MemoryUserStore::new());
        let processor = build_processor(store.clone(), PlanPolicy::Upsert);
        let body = order_body("order.created", "a@x.com", "Starter");

        let first = run(&processor, &body).await.unwrap();
        let second = run(&processor, &body).await.unwrap();

        assert!(matches!(first, OrderOutcome::Updated { created: true, .. }));
        assert!(matches!(second, OrderOutcome::Updated { created: false, .. }));
        assert_eq!(
            store.find_plan("a@x.com").await.unwrap(),
            Some(PlanTier::Starter)
        );
        assert_eq!(store.user_count().await, 1);
    }

    #[tokio::test]
    async fn test_require_existing_reports_not_found() {
        let store = Arc::new(MemoryUserStore::new());
        let processor = build_processor(store.clone(), PlanPolicy::RequireExisting);

        let err = run(&processor, &order_body("order.created", "a@x.com", "Pro"))
            .await
            .unwrap_err();

        assert!(matches!(err, ProcessError::UserNotFound(ref e) if e == "a@x.com"));
        assert_eq!(store.user_count().await, 0);
    }

    #[tokio::test]
    async fn test_require_existing_updates_known_user() {
        let store = Arc::new(MemoryUserStore::with_users([("a@x.com", PlanTier::Free)]));
        let processor = build_processor(store.clone(), PlanPolicy::RequireExisting);

        let outcome = run(&processor, &order_body("order.created", "a@x.com", "Enterprise"))
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            OrderOutcome::Updated {
                plan: PlanTier::Enterprise,
                created: false,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_malformed_payloads_are_rejected_without_write() {
        let store = Arc::new(MemoryUserStore::new());
        let processor = build_processor(store.clone(), PlanPolicy::Upsert);

        let blank_email = order_body("order.created", "  ", "Pro");
        let not_an_email = order_body("order.created", "not-an-email", "Pro");
        let bodies = [
            "not json",
            r#"{"data":{}}"#,
            r#"{"event":"order.created"}"#,
            r#"{"event":"order.created","data":{"product_variants":[{"product_title":"Pro"}]}}"#,
            r#"{"event":"order.created","data":{"payment":{"gateway":{"data":{"customer_email":"a@x.com"}}},"product_variants":[]}}"#,
            r#"{"event":"order.created","data":{"payment":{"gateway":{"data":{"customer_email":"a@x.com"}}},"product_variants":[{}]}}"#,
            blank_email.as_str(),
            not_an_email.as_str(),
        ];

        for body in bodies {
            let err = run(&processor, body).await.unwrap_err();
            assert!(
                matches!(err, ProcessError::InvalidPayload(_)),
                "body {} gave {:?}",
                body,
                err
            );
        }
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_is_reported() {
        let store = Arc::new(MemoryUserStore::new());
        store.set_offline(true);
        let processor = build_processor(store.clone(), PlanPolicy::Upsert);

        let err = run(&processor, &order_body("order.created", "a@x.com", "Pro"))
            .await
            .unwrap_err();

        assert!(matches!(err, ProcessError::Store(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_email_is_trimmed() {
        let store = Arc::new(MemoryUserStore::new());
        let processor = build_processor(store.clone(), PlanPolicy::Upsert);

        run(&processor, &order_body("order.created", " a@x.com ", "Pro"))
            .await
            .unwrap();

        assert_eq!(store.find_plan("a@x.com").await.unwrap(), Some(PlanTier::Pro));
    }
}
