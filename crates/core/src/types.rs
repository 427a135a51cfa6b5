use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a tenant (UUIDv7 — time-sortable for log correlation).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TenantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique identifier for a conversation (UUIDv7).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle status of a Tenant.
///
/// Transitions are a monotonic subset: trial -> {active | trial_expired | canceled};
/// active <-> suspended; any -> canceled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    Trial,
    Active,
    TrialExpired,
    Suspended,
    Canceled,
}

impl fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Trial => "trial",
            Self::Active => "active",
            Self::TrialExpired => "trial_expired",
            Self::Suspended => "suspended",
            Self::Canceled => "canceled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TenantStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trial" => Ok(Self::Trial),
            "active" => Ok(Self::Active),
            "trial_expired" => Ok(Self::TrialExpired),
            "suspended" => Ok(Self::Suspended),
            "canceled" => Ok(Self::Canceled),
            other => Err(format!("unknown tenant status: {other}")),
        }
    }
}

impl TenantStatus {
    /// Whether `self -> next` is an allowed transition (spec §3).
    pub fn can_transition_to(self, next: TenantStatus) -> bool {
        use TenantStatus::*;
        match (self, next) {
            (Trial, Active | TrialExpired | Canceled) => true,
            (Active, Suspended | Canceled) => true,
            (Suspended, Active | Canceled) => true,
            (s, n) if s == n => true,
            _ => false,
        }
    }
}

/// Subscription tier — gates daily message quota and A/B variant count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    Starter,
    Growth,
    Scale,
    Enterprise,
}

impl SubscriptionTier {
    /// Daily outbound message quota used by the rate limiter (§4.8).
    pub fn daily_message_quota(self) -> u32 {
        match self {
            Self::Starter => 250,
            Self::Growth => 1_000,
            Self::Scale => 5_000,
            Self::Enterprise => 25_000,
        }
    }

    /// Maximum number of A/B variants a campaign on this tier may use (§4.10).
    pub fn max_campaign_variants(self) -> u32 {
        match self {
            Self::Starter => 2,
            Self::Growth => 3,
            Self::Scale => 4,
            Self::Enterprise => 6,
        }
    }
}

impl fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Starter => "starter",
            Self::Growth => "growth",
            Self::Scale => "scale",
            Self::Enterprise => "enterprise",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for SubscriptionTier {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "starter" => Ok(Self::Starter),
            "growth" => Ok(Self::Growth),
            "scale" => Ok(Self::Scale),
            "enterprise" => Ok(Self::Enterprise),
            other => Err(format!("unknown subscription tier: {other}")),
        }
    }
}

/// Category of an outbound message — drives consent bypass and rate-limit
/// accounting in the Messaging Dispatcher (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    CustomerInbound,
    ManualOutbound,
    AutomatedTransactional,
    Reminder,
    ReEngagement,
    Fallback,
    Campaign,
}

impl MessageType {
    /// Transactional messages bypass both quiet hours and consent (§4.3, §4.8).
    pub fn is_time_sensitive(self) -> bool {
        matches!(self, Self::AutomatedTransactional)
    }

    pub fn bypasses_consent(self) -> bool {
        matches!(self, Self::AutomatedTransactional)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::CustomerInbound => "customer_inbound",
            Self::ManualOutbound => "manual_outbound",
            Self::AutomatedTransactional => "automated_transactional",
            Self::Reminder => "reminder",
            Self::ReEngagement => "re_engagement",
            Self::Fallback => "fallback",
            Self::Campaign => "campaign",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for MessageType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer_inbound" => Ok(Self::CustomerInbound),
            "manual_outbound" => Ok(Self::ManualOutbound),
            "automated_transactional" => Ok(Self::AutomatedTransactional),
            "reminder" => Ok(Self::Reminder),
            "re_engagement" => Ok(Self::ReEngagement),
            "fallback" => Ok(Self::Fallback),
            "campaign" => Ok(Self::Campaign),
            other => Err(format!("unknown message type: {other}")),
        }
    }
}

/// A quiet-hours window in local time. May wrap midnight
/// (e.g. `start=22:00, end=08:00`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHours {
    /// Minutes since local midnight, inclusive.
    pub start_minute: u16,
    /// Minutes since local midnight, exclusive.
    pub end_minute: u16,
}

impl QuietHours {
    /// Whether `minute_of_day` (0..1440) falls inside the window, handling wrap.
    pub fn contains(&self, minute_of_day: u16) -> bool {
        if self.start_minute == self.end_minute {
            return false;
        }
        if self.start_minute < self.end_minute {
            minute_of_day >= self.start_minute && minute_of_day < self.end_minute
        } else {
            minute_of_day >= self.start_minute || minute_of_day < self.end_minute
        }
    }

    /// Minutes from `minute_of_day` until this window's exit boundary.
    /// Only meaningful when `contains(minute_of_day)` is true; callers use
    /// this to shift a quiet-hours-blocked send to the next allowed instant,
    /// possibly rolling into the next day.
    pub fn minutes_until_exit(&self, minute_of_day: u16) -> u16 {
        if minute_of_day < self.end_minute {
            self.end_minute - minute_of_day
        } else {
            (1440 - minute_of_day) + self.end_minute
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_status_transitions() {
        assert!(TenantStatus::Trial.can_transition_to(TenantStatus::Active));
        assert!(TenantStatus::Active.can_transition_to(TenantStatus::Suspended));
        assert!(TenantStatus::Suspended.can_transition_to(TenantStatus::Active));
        assert!(!TenantStatus::TrialExpired.can_transition_to(TenantStatus::Active));
        assert!(TenantStatus::Active.can_transition_to(TenantStatus::Canceled));
    }

    #[test]
    fn quiet_hours_wraps_midnight() {
        let qh = QuietHours { start_minute: 22 * 60, end_minute: 8 * 60 };
        assert!(qh.contains(23 * 60));
        assert!(qh.contains(0));
        assert!(qh.contains(7 * 60 + 59));
        assert!(!qh.contains(12 * 60));
    }

    #[test]
    fn quiet_hours_same_day() {
        let qh = QuietHours { start_minute: 9 * 60, end_minute: 17 * 60 };
        assert!(qh.contains(10 * 60));
        assert!(!qh.contains(8 * 60));
        assert!(!qh.contains(18 * 60));
    }

    #[test]
    fn minutes_until_exit_same_day() {
        let qh = QuietHours { start_minute: 9 * 60, end_minute: 17 * 60 };
        assert_eq!(qh.minutes_until_exit(10 * 60), 7 * 60);
    }

    #[test]
    fn minutes_until_exit_wraps_midnight() {
        let qh = QuietHours { start_minute: 22 * 60, end_minute: 8 * 60 };
        // 23:00 -> exits at 08:00 next day: 1h to midnight + 8h = 9h
        assert_eq!(qh.minutes_until_exit(23 * 60), 9 * 60);
    }
}
