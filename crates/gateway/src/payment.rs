//! Default payment adapter. A tenant's real processor (Stripe, a local PSP)
//! would implement `checkout::PaymentCapability` the same way
//! `messaging::telephony::WhatsAppCloudApiProvider` wraps WhatsApp Cloud
//! API — one stateless per-call HTTP request, no persistent session.

use async_trait::async_trait;
use checkout::{Order, PaymentCapability};

/// Posts the order to a configured webhook URL and treats any 2xx response
/// as acceptance; the provider is expected to confirm or fail the charge
/// asynchronously via the payment-callback webhook.
pub struct HttpPaymentProvider {
    client: reqwest::Client,
    endpoint: Option<String>,
}

impl HttpPaymentProvider {
    pub fn new(endpoint: Option<String>) -> Self {
        Self { client: reqwest::Client::new(), endpoint }
    }
}

#[async_trait]
impl PaymentCapability for HttpPaymentProvider {
    async fn initiate(&self, order: &Order) -> Result<String, String> {
        let Some(endpoint) = &self.endpoint else {
            return Err("no payment provider endpoint configured".to_string());
        };

        let resp = self
            .client
            .post(endpoint)
            .json(&serde_json::json!({
                "order_id": order.id,
                "amount_cents": order.total_cents,
                "currency": order.currency,
            }))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !resp.status().is_success() {
            return Err(format!("payment provider returned {}", resp.status()));
        }

        Ok(uuid::Uuid::new_v4().to_string())
    }
}
