use async_trait::async_trait;
use serde::Deserialize;

use crate::error::MessagingError;

/// Sends a single WhatsApp message through a tenant's configured provider.
///
/// Unlike the long-lived, connect/disconnect adapters this is generalized
/// from, WhatsApp Cloud API delivery is a stateless per-call HTTP request —
/// there is no persistent session to hold open or reconnect.
#[async_trait]
pub trait TelephonyCapability: Send + Sync {
    /// Stable lowercase identifier for this provider (e.g. `"whatsapp_cloud"`).
    fn name(&self) -> &str;

    /// Send `content` to `to_e164`, returning the provider's message id.
    async fn send(&self, to_e164: &str, content: &str) -> Result<String, MessagingError>;
}

/// WhatsApp Cloud API adapter. One instance per tenant, holding that
/// tenant's phone-number-id and access token.
pub struct WhatsAppCloudApiProvider {
    client: reqwest::Client,
    base_url: String,
    phone_number_id: String,
    access_token: String,
}

impl WhatsAppCloudApiProvider {
    pub fn new(phone_number_id: String, access_token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: "https://graph.facebook.com/v20.0".to_string(),
            phone_number_id,
            access_token,
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

#[derive(Deserialize)]
struct SendResponse {
    messages: Vec<SendResponseMessage>,
}

#[derive(Deserialize)]
struct SendResponseMessage {
    id: String,
}

#[async_trait]
impl TelephonyCapability for WhatsAppCloudApiProvider {
    fn name(&self) -> &str {
        "whatsapp_cloud"
    }

    async fn send(&self, to_e164: &str, content: &str) -> Result<String, MessagingError> {
        let url = format!("{}/{}/messages", self.base_url, self.phone_number_id);
        let body = serde_json::json!({
            "messaging_product": "whatsapp",
            "to": to_e164,
            "type": "text",
            "text": { "body": content },
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| MessagingError::SendFailed(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(MessagingError::SendFailed(format!("{status}: {text}")));
        }

        let parsed: SendResponse = resp
            .json()
            .await
            .map_err(|e| MessagingError::SendFailed(e.to_string()))?;
        parsed
            .messages
            .into_iter()
            .next()
            .map(|m| m.id)
            .ok_or_else(|| MessagingError::SendFailed("empty messages array in response".into()))
    }
}
