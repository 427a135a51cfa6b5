use serde::{Deserialize, Serialize};

/// One catalog item (or other referenceable entity) the agent mentioned
/// to a customer during the current conversation, in presentation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MentionedItem {
    pub item_id: String,
    pub label: String,
    /// 1-based position in the most recent list the agent presented —
    /// what "the second one" or "#2" resolves against.
    pub position: u32,
}

/// Per-conversation ordered list of recently mentioned items, expiring after
/// a TTL so a reference from an hour-old message doesn't leak into a new
/// shopping intent.
#[derive(Debug, Clone)]
pub struct ReferenceContext {
    pub conversation_id: String,
    pub items: Vec<MentionedItem>,
    pub built_at: chrono::DateTime<chrono::Utc>,
}

/// How a deictic expression in customer text resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// "the second one", "#2" -> resolved by list position.
    Ordinal(String),
    /// "that one", "this" -> resolved to the single most recent mention.
    Demonstrative(String),
    /// "the blue jacket" -> resolved by matching words in the label.
    Descriptive(String),
    NoMatch,
}
