//! Webhook payload types.
//!
//! Deserialisation is two-stage: the envelope (`event` + opaque `data`)
//! first, then the `order.created` shape only for events we act on, so
//! unrelated event types never fail on their own payload layout.

use serde::Deserialize;

/// Event tag of the only notification that changes a plan.
pub const ORDER_CREATED: &str = "order.created";

/// Untrusted webhook envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// `data` of an `order.created` event. Unlisted fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderCreatedData {
    pub payment: Payment,
    pub product_variants: Vec<ProductVariant>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Payment {
    pub gateway: Gateway,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Gateway {
    pub data: GatewayData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayData {
    pub customer_email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductVariant {
    pub product_title: String,
}

impl OrderCreatedData {
    pub fn customer_email(&self) -> &str {
        &self.payment.gateway.data.customer_email
    }

    /// Title of the first purchased variant; later variants are ignored.
    pub fn first_product_title(&self) -> Option<&str> {
        self.product_variants
            .first()
            .map(|v| v.product_title.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_without_data() {
        let event: WebhookEvent = serde_json::from_str(r#"{"event":"order.refunded"}"#).unwrap();
        assert_eq!(event.event, "order.refunded");
        assert!(event.data.is_null());
    }

    #[test]
    fn test_order_created_data_ignores_extra_fields() {
        let data: OrderCreatedData = serde_json::from_str(
            r#"{
                "id": 991,
                "payment": {"gateway": {"name": "stripe", "data": {"customer_email": "a@x.com", "last4": "4242"}}},
                "product_variants": [
                    {"product_title": "Starter", "price": 900},
                    {"product_title": "Enterprise"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(data.customer_email(), "a@x.com");
        assert_eq!(data.first_product_title(), Some("Starter"));
    }

    #[test]
    fn test_order_created_data_missing_email() {
        let result: Result<OrderCreatedData, _> = serde_json::from_str(
            r#"{"payment":{"gateway":{"data":{}}},"product_variants":[]}"#,
        );
        let err = result.unwrap_err().to_string();
        assert!(err.contains("customer_email"), "{}", err);
    }
}
