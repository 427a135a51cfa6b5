use serde::{Deserialize, Serialize};

use platform_core::types::MessageType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduledMessageStatus {
    Pending,
    Sent,
    Canceled,
    Failed,
}

impl std::fmt::Display for ScheduledMessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Canceled => "canceled",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ScheduledMessageStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "sent" => Ok(Self::Sent),
            "canceled" => Ok(Self::Canceled),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown scheduled message status: {other}")),
        }
    }
}

/// A message queued for future dispatch — an appointment reminder, a
/// re-engagement nudge, or a deferred automated send (spec §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledMessage {
    pub id: String,
    pub tenant_id: String,
    pub conversation_id: String,
    pub customer_id: String,
    pub message_type: MessageType,
    /// RFC3339 instant this message becomes due.
    pub scheduled_for: String,
    pub template_name: String,
    /// JSON-encoded `{key: value}` map of template substitution variables.
    pub template_vars: String,
    pub status: ScheduledMessageStatus,
    pub created_at: String,
    pub updated_at: String,
}
