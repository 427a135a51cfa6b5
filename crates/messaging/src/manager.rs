use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::{info, warn};

use crate::db;
use crate::error::{MessagingError, Result};
use crate::rate_limit::{QuotaDecision, RateLimiter};
use crate::telephony::TelephonyCapability;
use crate::types::{Customer, Direction, DispatchOutcome, MessageStatus};
use platform_core::types::{MessageType, QuietHours, SubscriptionTier};

/// Everything the dispatcher needs to decide and execute a single send.
pub struct DispatchRequest<'a> {
    pub tenant_id: &'a str,
    pub conversation_id: &'a str,
    pub customer: &'a Customer,
    pub message_type: MessageType,
    pub content: String,
    /// Minutes since local midnight at dispatch time, used for the
    /// quiet-hours check. Callers compute this from the tenant's timezone.
    pub minute_of_day: u16,
}

/// Whether `message_type` is ever gated by consent at all. Transactional
/// sends always bypass consent (spec §4.8).
fn requires_consent_check(message_type: MessageType) -> bool {
    !message_type.bypasses_consent()
}

/// Whether `customer` has opted in for `message_type`, given the nuanced
/// per-category bypass rules (spec §4.8): transactional never needs it,
/// reminders need `consent_reminder`, re-engagement and campaign sends need
/// `consent_promotional`. Manual/fallback in-conversation replies piggyback
/// on the customer having initiated contact and need no separate consent.
fn has_consent(message_type: MessageType, customer: &Customer) -> bool {
    match message_type {
        MessageType::AutomatedTransactional => true,
        MessageType::Reminder => customer.consent_reminder,
        MessageType::ReEngagement | MessageType::Campaign => customer.consent_promotional,
        MessageType::ManualOutbound | MessageType::Fallback | MessageType::CustomerInbound => true,
    }
}

/// Drives every outbound WhatsApp send through the five-step contract
/// (consent, rate-limit, quiet-hours, template, dispatch) before handing off
/// to the tenant's telephony provider.
pub struct MessagingDispatcher {
    conn: Arc<Mutex<Connection>>,
    telephony: Arc<dyn TelephonyCapability>,
    rate_limiter: RateLimiter,
}

impl MessagingDispatcher {
    pub fn new(conn: Arc<Mutex<Connection>>, telephony: Arc<dyn TelephonyCapability>) -> Self {
        Self { conn, telephony, rate_limiter: RateLimiter::new() }
    }

    /// Execute the full dispatch contract for a single outbound message.
    ///
    /// Automated categories (`Reminder`, `ReEngagement`, `Campaign`) defer
    /// past a quota or quiet-hours block instead of failing; explicit sends
    /// (`ManualOutbound`, `AutomatedTransactional`, `Fallback`) return an
    /// error immediately so the caller can surface it to the operator.
    pub async fn dispatch(
        &self,
        req: DispatchRequest<'_>,
        tier: SubscriptionTier,
        quiet_hours: Option<QuietHours>,
    ) -> Result<DispatchOutcome> {
        let is_automated = matches!(
            req.message_type,
            MessageType::Reminder | MessageType::ReEngagement | MessageType::Campaign
        );

        // Step 1: consent.
        if requires_consent_check(req.message_type) && !has_consent(req.message_type, req.customer) {
            if is_automated {
                return Ok(DispatchOutcome::Deferred {
                    retry_at: String::new(),
                    reason: "consent not granted".to_string(),
                });
            }
            return Err(MessagingError::ConsentRequired);
        }

        // Step 2: rate limit.
        let quota = {
            let conn = self.conn.lock().unwrap();
            self.rate_limiter.check(&conn, req.tenant_id, tier)?
        };
        if quota == QuotaDecision::Exceeded {
            if is_automated {
                let retry_at = (chrono::Utc::now() + chrono::Duration::hours(24)).to_rfc3339();
                info!(tenant_id = req.tenant_id, "quota exceeded, deferring automated send 24h");
                return Ok(DispatchOutcome::Deferred {
                    retry_at,
                    reason: "daily quota exceeded".to_string(),
                });
            }
            return Err(MessagingError::RateLimitExceeded);
        }

        // Step 3: quiet hours. Transactional sends are time-sensitive and bypass this.
        if !req.message_type.is_time_sensitive() {
            if let Some(qh) = quiet_hours {
                if qh.contains(req.minute_of_day) {
                    let wait_minutes = qh.minutes_until_exit(req.minute_of_day);
                    let retry_at = (chrono::Utc::now()
                        + chrono::Duration::minutes(wait_minutes as i64))
                    .to_rfc3339();
                    return Ok(DispatchOutcome::Deferred { retry_at, reason: "quiet hours".to_string() });
                }
            }
        }

        // Step 4 (template rendering) happens before this call — `req.content`
        // already holds the rendered text.

        // Step 5: dispatch.
        let provider_message_id = self
            .telephony
            .send(&req.customer.phone_e164, &req.content)
            .await;

        let conn = self.conn.lock().unwrap();
        let message = match provider_message_id {
            Ok(id) => db::record_message(
                &conn,
                req.tenant_id,
                req.conversation_id,
                Direction::Outbound,
                req.message_type,
                &req.content,
                Some(&id),
                MessageStatus::Sent,
            )?,
            Err(e) => {
                warn!(tenant_id = req.tenant_id, error = %e, "telephony send failed");
                db::record_message(
                    &conn,
                    req.tenant_id,
                    req.conversation_id,
                    Direction::Outbound,
                    req.message_type,
                    &req.content,
                    None,
                    MessageStatus::Failed,
                )?;
                return Err(e);
            }
        };

        Ok(DispatchOutcome::Sent(message))
    }

    /// Render a stored template's `{{var}}` placeholders and bump its usage
    /// counter. Returns the rendered text.
    pub fn render_template(&self, tenant_id: &str, name: &str, vars: &[(&str, &str)]) -> Result<String> {
        let conn = self.conn.lock().unwrap();
        let template = db::get_template(&conn, tenant_id, name)?
            .ok_or_else(|| MessagingError::TemplateNotFound(name.to_string()))?;
        let mut rendered = template.content.clone();
        for (key, value) in vars {
            rendered = rendered.replace(&format!("{{{{{key}}}}}"), value);
        }
        db::increment_template_usage(&conn, tenant_id, &template.id)?;
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FakeTelephony {
        reply_id: String,
        fail: bool,
    }

    #[async_trait]
    impl TelephonyCapability for FakeTelephony {
        fn name(&self) -> &str {
            "fake"
        }
        async fn send(&self, _to: &str, _content: &str) -> std::result::Result<String, MessagingError> {
            if self.fail {
                Err(MessagingError::SendFailed("boom".into()))
            } else {
                Ok(self.reply_id.clone())
            }
        }
    }

    fn setup() -> (Arc<Mutex<Connection>>, Customer, String) {
        let conn = Connection::open_in_memory().unwrap();
        db::init_db(&conn).unwrap();
        let customer = db::create_customer(&conn, "tenant-1", "+15551234567", None).unwrap();
        let conversation = db::create_conversation(&conn, "tenant-1", &customer.id).unwrap();
        (Arc::new(Mutex::new(conn)), customer, conversation.id)
    }

    #[tokio::test]
    async fn transactional_send_succeeds_without_consent() {
        let (conn, customer, conversation_id) = setup();
        let telephony = Arc::new(FakeTelephony { reply_id: "wamid.1".into(), fail: false });
        let dispatcher = MessagingDispatcher::new(conn, telephony);
        let outcome = dispatcher
            .dispatch(
                DispatchRequest {
                    tenant_id: "tenant-1",
                    conversation_id: &conversation_id,
                    customer: &customer,
                    message_type: MessageType::AutomatedTransactional,
                    content: "your order shipped".into(),
                    minute_of_day: 12 * 60,
                },
                SubscriptionTier::Starter,
                None,
            )
            .await
            .unwrap();
        assert!(matches!(outcome, DispatchOutcome::Sent(_)));
    }

    #[tokio::test]
    async fn promotional_send_without_consent_errors() {
        let (conn, customer, conversation_id) = setup();
        let telephony = Arc::new(FakeTelephony { reply_id: "wamid.1".into(), fail: false });
        let dispatcher = MessagingDispatcher::new(conn, telephony);
        let err = dispatcher
            .dispatch(
                DispatchRequest {
                    tenant_id: "tenant-1",
                    conversation_id: &conversation_id,
                    customer: &customer,
                    message_type: MessageType::Campaign,
                    content: "20% off today".into(),
                    minute_of_day: 12 * 60,
                },
                SubscriptionTier::Starter,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MessagingError::ConsentRequired));
    }

    #[tokio::test]
    async fn reminder_defers_during_quiet_hours() {
        let (conn, mut customer, conversation_id) = setup();
        customer.consent_reminder = true;
        let telephony = Arc::new(FakeTelephony { reply_id: "wamid.1".into(), fail: false });
        let dispatcher = MessagingDispatcher::new(conn, telephony);
        let qh = QuietHours { start_minute: 22 * 60, end_minute: 8 * 60 };
        let outcome = dispatcher
            .dispatch(
                DispatchRequest {
                    tenant_id: "tenant-1",
                    conversation_id: &conversation_id,
                    customer: &customer,
                    message_type: MessageType::Reminder,
                    content: "your appointment is tomorrow".into(),
                    minute_of_day: 23 * 60,
                },
                SubscriptionTier::Starter,
                Some(qh),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, DispatchOutcome::Deferred { .. }));
    }

    #[tokio::test]
    async fn failed_send_records_failed_message_and_errors() {
        let (conn, customer, conversation_id) = setup();
        let telephony = Arc::new(FakeTelephony { reply_id: String::new(), fail: true });
        let dispatcher = MessagingDispatcher::new(conn.clone(), telephony);
        let err = dispatcher
            .dispatch(
                DispatchRequest {
                    tenant_id: "tenant-1",
                    conversation_id: &conversation_id,
                    customer: &customer,
                    message_type: MessageType::AutomatedTransactional,
                    content: "hi".into(),
                    minute_of_day: 12 * 60,
                },
                SubscriptionTier::Starter,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MessagingError::SendFailed(_)));
        let count: u32 = {
            let c = conn.lock().unwrap();
            c.query_row("SELECT COUNT(*) FROM messages WHERE status = 'failed'", [], |r| r.get(0))
                .unwrap()
        };
        assert_eq!(count, 1);
    }

    #[test]
    fn render_template_substitutes_and_counts_usage() {
        let (conn, _customer, _conversation_id) = setup();
        {
            let c = conn.lock().unwrap();
            db::upsert_template(&c, "tenant-1", "order_confirmation", "Hi {{name}}, order {{order_id}} confirmed!").unwrap();
        }
        let telephony = Arc::new(FakeTelephony { reply_id: "x".into(), fail: false });
        let dispatcher = MessagingDispatcher::new(conn, telephony);
        let rendered = dispatcher
            .render_template("tenant-1", "order_confirmation", &[("name", "Ana"), ("order_id", "A100")])
            .unwrap();
        assert_eq!(rendered, "Hi Ana, order A100 confirmed!");
    }
}
