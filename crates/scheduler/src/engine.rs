use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::db::{self, init_db};
use crate::error::Result;
use crate::types::{ScheduledMessage, ScheduledMessageStatus};
use messaging::{db as messaging_db, DispatchRequest, MessagingDispatcher};
use platform_core::types::{MessageType, QuietHours, SubscriptionTier};

/// Resolves the per-tenant facts the dispatch contract needs (tier, quiet
/// hours) without coupling this crate to a concrete tenancy storage layer.
pub trait TenantLookup: Send + Sync {
    fn resolve(&self, tenant_id: &str) -> Option<(SubscriptionTier, Option<QuietHours>)>;
}

/// Poll interval for the pending-scheduled-messages worker. Must stay
/// within the spec's 60-second resolution requirement.
const POLL_SECS: u64 = 30;

/// Schedule two appointment reminders (24h and 2h before `appointment_time`),
/// skipping any whose fire time has already passed (spec §4.9).
pub fn schedule_appointment_reminders(
    conn: &Connection,
    tenant_id: &str,
    conversation_id: &str,
    customer_id: &str,
    appointment_time: DateTime<Utc>,
) -> Result<Vec<ScheduledMessage>> {
    let now = Utc::now();
    let mut created = Vec::new();
    for (offset_hours, template) in [(24, "appointment_reminder_24h"), (2, "appointment_reminder_2h")] {
        let fire_at = appointment_time - chrono::Duration::hours(offset_hours);
        if fire_at <= now {
            continue;
        }
        let vars = serde_json::json!({ "appointment_time": appointment_time.to_rfc3339() }).to_string();
        let msg = db::create_scheduled_message(
            conn,
            tenant_id,
            conversation_id,
            customer_id,
            MessageType::Reminder,
            &fire_at.to_rfc3339(),
            template,
            &vars,
        )?;
        created.push(msg);
    }
    Ok(created)
}

/// Schedule a single re-engagement nudge at `at`.
pub fn schedule_re_engagement(
    conn: &Connection,
    tenant_id: &str,
    conversation_id: &str,
    customer_id: &str,
    at: DateTime<Utc>,
) -> Result<ScheduledMessage> {
    db::create_scheduled_message(
        conn,
        tenant_id,
        conversation_id,
        customer_id,
        MessageType::ReEngagement,
        &at.to_rfc3339(),
        "re_engagement",
        "{}",
    )
}

/// Cancel all still-pending scheduled messages for a conversation — e.g. an
/// appointment cancellation or checkout completion (spec §4.9).
pub fn cancel_for_conversation(conn: &Connection, conversation_id: &str) -> Result<u32> {
    db::cancel_pending_for_conversation(conn, conversation_id)
}

/// Drives the pending-scheduled-messages worker: polls every [`POLL_SECS`]
/// seconds, renders and dispatches anything due, and updates its status.
pub struct SchedulerEngine {
    conn: Arc<Mutex<Connection>>,
    dispatcher: Arc<MessagingDispatcher>,
    tenants: Arc<dyn TenantLookup>,
}

impl SchedulerEngine {
    /// `conn` is the platform's shared writer connection — the same one the
    /// `MessagingDispatcher` was built from, so `messaging`'s tables are
    /// visible to this worker.
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        dispatcher: Arc<MessagingDispatcher>,
        tenants: Arc<dyn TenantLookup>,
    ) -> Result<Self> {
        {
            let c = conn.lock().unwrap();
            init_db(&c)?;
        }
        Ok(Self { conn, dispatcher, tenants })
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("scheduler engine started");
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(POLL_SECS));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!("scheduler tick error: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn tick(&mut self) -> Result<()> {
        let now = Utc::now();
        let due = {
            let conn = self.conn.lock().unwrap();
            db::due_messages(&conn, &now.to_rfc3339())?
        };
        for msg in due {
            self.fire(msg, now).await;
        }
        Ok(())
    }

    async fn fire(&self, msg: ScheduledMessage, now: DateTime<Utc>) {
        let Some((tier, quiet_hours)) = self.tenants.resolve(&msg.tenant_id) else {
            warn!(tenant_id = %msg.tenant_id, "no tenant settings found, skipping scheduled message");
            return;
        };

        let content = match self.dispatcher.render_template(&msg.tenant_id, &msg.template_name, &[]) {
            Ok(c) => c,
            Err(e) => {
                error!(scheduled_message_id = %msg.id, error = %e, "failed to render template");
                let conn = self.conn.lock().unwrap();
                let _ = db::set_status(&conn, &msg.id, ScheduledMessageStatus::Failed);
                return;
            }
        };

        let customer = {
            let conn = self.conn.lock().unwrap();
            messaging_db::get_customer(&conn, &msg.tenant_id, &msg.customer_id)
        };
        let customer = match customer {
            Ok(Some(c)) => c,
            Ok(None) => {
                warn!(scheduled_message_id = %msg.id, "customer not found, marking failed");
                let conn = self.conn.lock().unwrap();
                let _ = db::set_status(&conn, &msg.id, ScheduledMessageStatus::Failed);
                return;
            }
            Err(e) => {
                error!(scheduled_message_id = %msg.id, error = %e, "customer lookup failed");
                return;
            }
        };

        let minute_of_day = (now.timestamp() / 60 % 1440) as u16;
        let outcome = self
            .dispatcher
            .dispatch(
                DispatchRequest {
                    tenant_id: &msg.tenant_id,
                    conversation_id: &msg.conversation_id,
                    customer: &customer,
                    message_type: msg.message_type,
                    content,
                    minute_of_day,
                },
                tier,
                quiet_hours,
            )
            .await;

        match outcome {
            Ok(messaging::DispatchOutcome::Sent(_)) => {
                let conn = self.conn.lock().unwrap();
                let _ = db::set_status(&conn, &msg.id, ScheduledMessageStatus::Sent);
            }
            Ok(messaging::DispatchOutcome::Deferred { reason, .. }) => {
                info!(scheduled_message_id = %msg.id, %reason, "dispatch deferred, will retry next tick");
            }
            Err(e) => {
                error!(scheduled_message_id = %msg.id, error = %e, "dispatch failed");
                let conn = self.conn.lock().unwrap();
                let _ = db::set_status(&conn, &msg.id, ScheduledMessageStatus::Failed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FakeTelephony;

    #[async_trait]
    impl messaging::TelephonyCapability for FakeTelephony {
        fn name(&self) -> &str {
            "fake"
        }
        async fn send(&self, _to: &str, _content: &str) -> std::result::Result<String, messaging::MessagingError> {
            Ok("wamid.test".to_string())
        }
    }

    struct FixedTenant(SubscriptionTier, Option<QuietHours>);

    impl TenantLookup for FixedTenant {
        fn resolve(&self, _tenant_id: &str) -> Option<(SubscriptionTier, Option<QuietHours>)> {
            Some((self.0, self.1))
        }
    }

    fn setup() -> (Arc<Mutex<Connection>>, String, String) {
        let conn = Connection::open_in_memory().unwrap();
        messaging::db::init_db(&conn).unwrap();
        init_db(&conn).unwrap();
        let customer = messaging::db::create_customer(&conn, "tenant-1", "+15551234567", None).unwrap();
        let conversation = messaging::db::create_conversation(&conn, "tenant-1", &customer.id).unwrap();
        messaging::db::upsert_template(&conn, "tenant-1", "re_engagement", "come back and see us!").unwrap();
        (Arc::new(Mutex::new(conn)), customer.id, conversation.id)
    }

    #[test]
    fn appointment_reminders_skip_past_offsets() {
        let (conn, customer_id, conversation_id) = setup();
        let c = conn.lock().unwrap();
        let appt = Utc::now() + chrono::Duration::hours(1);
        let created =
            schedule_appointment_reminders(&c, "tenant-1", &conversation_id, &customer_id, appt).unwrap();
        // Only the 2h-before slot can't fire either since appt is only 1h out — both skipped.
        assert!(created.is_empty());

        let appt_far = Utc::now() + chrono::Duration::hours(48);
        let created_far =
            schedule_appointment_reminders(&c, "tenant-1", &conversation_id, &customer_id, appt_far).unwrap();
        assert_eq!(created_far.len(), 2);
    }

    #[tokio::test]
    async fn due_message_is_dispatched_and_marked_sent() {
        let (conn, customer_id, conversation_id) = setup();
        let msg = {
            let c = conn.lock().unwrap();
            schedule_re_engagement(
                &c,
                "tenant-1",
                &conversation_id,
                &customer_id,
                Utc::now() - chrono::Duration::seconds(1),
            )
            .unwrap()
        };

        let dispatcher = Arc::new(MessagingDispatcher::new(conn.clone(), Arc::new(FakeTelephony)));
        let tenants: Arc<dyn TenantLookup> = Arc::new(FixedTenant(SubscriptionTier::Growth, None));
        let mut engine = SchedulerEngine::new(conn.clone(), dispatcher, tenants).unwrap();

        engine.tick().await.unwrap();

        let c = conn.lock().unwrap();
        let refreshed = db::get_scheduled_message(&c, &msg.id).unwrap().unwrap();
        assert_eq!(refreshed.status, ScheduledMessageStatus::Sent);
    }
}
