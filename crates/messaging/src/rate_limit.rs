use std::sync::Mutex;

use dashmap::DashMap;
use rusqlite::Connection;
use tracing::warn;

use crate::db;
use crate::error::Result;
use platform_core::types::SubscriptionTier;

/// Outcome of a quota check (§4.8): the dispatcher queues automated sends
/// that exceed quota for next day, and rejects explicit/manual sends outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    Allow,
    Exceeded,
}

/// Tracks the one-warning-per-day flag per tenant so the 80% utilization
/// warning doesn't re-fire on every send. The count itself lives in the
/// `messages` table (sliding 24h window query), not here — this struct only
/// caches the "have we warned today" bit in memory.
pub struct RateLimiter {
    warned_today: DashMap<String, Mutex<String>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self { warned_today: DashMap::new() }
    }

    /// Checks the tenant's trailing-24h outbound count against its tier
    /// quota. Logs a one-time-per-day warning at >=80% utilization.
    pub fn check(
        &self,
        conn: &Connection,
        tenant_id: &str,
        tier: SubscriptionTier,
    ) -> Result<QuotaDecision> {
        let used = db::count_outbound_last_24h(conn, tenant_id)?;
        let quota = tier.daily_message_quota();

        if used * 100 >= quota * 80 {
            self.warn_once(tenant_id, used, quota);
        }

        if used >= quota {
            return Ok(QuotaDecision::Exceeded);
        }
        Ok(QuotaDecision::Allow)
    }

    fn warn_once(&self, tenant_id: &str, used: u32, quota: u32) {
        let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
        let entry = self
            .warned_today
            .entry(tenant_id.to_string())
            .or_insert_with(|| Mutex::new(String::new()));
        let mut last_warned = entry.lock().unwrap();
        if *last_warned == today {
            return;
        }
        *last_warned = today;
        warn!(tenant_id, used, quota, "tenant approaching daily message quota");
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::init_db(&conn).unwrap();
        conn
    }

    #[test]
    fn allows_under_quota() {
        let conn = setup();
        let limiter = RateLimiter::new();
        let decision = limiter.check(&conn, "tenant-1", SubscriptionTier::Starter).unwrap();
        assert_eq!(decision, QuotaDecision::Allow);
    }

    #[test]
    fn exceeded_when_at_quota() {
        let conn = setup();
        let limiter = RateLimiter::new();
        let customer = db::create_customer(&conn, "tenant-1", "+15551234567", None).unwrap();
        let conversation = db::create_conversation(&conn, "tenant-1", &customer.id).unwrap();
        for _ in 0..SubscriptionTier::Starter.daily_message_quota() {
            db::record_message(
                &conn,
                "tenant-1",
                &conversation.id,
                crate::types::Direction::Outbound,
                platform_core::types::MessageType::ManualOutbound,
                "hi",
                None,
                crate::types::MessageStatus::Sent,
            )
            .unwrap();
        }
        let decision = limiter.check(&conn, "tenant-1", SubscriptionTier::Starter).unwrap();
        assert_eq!(decision, QuotaDecision::Exceeded);
    }
}
