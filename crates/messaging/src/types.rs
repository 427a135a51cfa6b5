use serde::{Deserialize, Serialize};

use platform_core::types::MessageType;

/// A tenant-scoped end customer. The same phone number in two different
/// tenants is two unrelated rows — no cross-tenant linkage (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub tenant_id: String,
    pub phone_e164: String,
    pub display_name: Option<String>,
    pub language: Option<String>,
    pub timezone: Option<String>,
    /// Transactional messages cannot be opted out; this is always true and
    /// kept only for API symmetry with the other two consent flags.
    pub consent_transactional: bool,
    pub consent_reminder: bool,
    pub consent_promotional: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Open,
    Bot,
    Handoff,
    Closed,
    Dormant,
}

impl std::fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Open => "open",
            Self::Bot => "bot",
            Self::Handoff => "handoff",
            Self::Closed => "closed",
            Self::Dormant => "dormant",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ConversationStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "bot" => Ok(Self::Bot),
            "handoff" => Ok(Self::Handoff),
            "closed" => Ok(Self::Closed),
            "dormant" => Ok(Self::Dormant),
            other => Err(format!("unknown conversation status: {other}")),
        }
    }
}

/// Tenant-scoped, per-customer conversation. A "session" is a maximal run of
/// messages with no gap >= 24h; `current_session_start`/`session_message_count`
/// feed the checkout machine's 3-message budget (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub tenant_id: String,
    pub customer_id: String,
    pub status: ConversationStatus,
    pub current_session_start: String,
    pub session_message_count: u32,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", if *self == Self::Inbound { "inbound" } else { "outbound" })
    }
}

impl std::str::FromStr for Direction {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inbound" => Ok(Self::Inbound),
            "outbound" => Ok(Self::Outbound),
            other => Err(format!("unknown direction: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Queued,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for MessageStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "sent" => Ok(Self::Sent),
            "delivered" => Ok(Self::Delivered),
            "read" => Ok(Self::Read),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown message status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub tenant_id: String,
    pub conversation_id: String,
    pub direction: Direction,
    pub message_type: MessageType,
    pub content: String,
    pub provider_message_id: Option<String>,
    pub status: MessageStatus,
    pub created_at: String,
}

/// Tenant-scoped template with `{{placeholder}}` tokens; a usage counter is
/// incremented on every render (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageTemplate {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub content: String,
    pub usage_count: u64,
    pub created_at: String,
}

/// Outcome of a single dispatch attempt (spec §4.8).
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    Sent(Message),
    /// Send deferred past quiet hours or a rate-limit window; `retry_at` is
    /// an RFC3339 timestamp the scheduler should re-attempt at.
    Deferred { retry_at: String, reason: String },
}
