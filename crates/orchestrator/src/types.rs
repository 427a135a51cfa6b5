use serde::{Deserialize, Serialize};

/// Most-recent-session window plus a carried-forward summary of everything
/// older — the "context pack" the orchestrator hands to intent inference
/// and, when the turn isn't a checkout transition, to the LLM prompt
/// (spec §4.7 step 3).
#[derive(Debug, Clone)]
pub struct ContextPack {
    pub recent_messages: Vec<messaging::Message>,
    pub prior_session_summary: Option<String>,
    pub catalog_matches: Vec<grounding::CatalogItem>,
}

/// The handler decision intent inference produces for one turn
/// (spec §4.7 step 5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerDecision {
    Browse { query: String },
    SelectProduct { item_ref: String },
    ConfirmQuantity { quantity: u32 },
    SelectPaymentMethod { method: String },
    AskGeneric,
}

/// Per-conversation counters the pipeline persists between turns: the
/// running low-confidence streak that trips handoff (spec §4.7 step 8) and
/// the language lock (spec §4.7 step 2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub conversation_id: String,
    pub locked_language: Option<String>,
    pub low_confidence_streak: u32,
    pub updated_at: String,
}

/// Maximum consecutive low-confidence turns before handoff is forced,
/// independent of any single turn's confidence (spec §4.7 step 8).
pub const LOW_CONFIDENCE_STREAK_CAP: u32 = 2;

/// Below this, a single turn's own confidence estimate triggers handoff.
pub const CONFIDENCE_THRESHOLD: f64 = 0.55;

/// A recorded validation-log entry for one grounding-stage transformation
/// applied to a draft response (spec §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationLogEntry {
    pub id: String,
    pub tenant_id: String,
    pub conversation_id: String,
    pub transformation: String,
    pub detail: String,
    pub created_at: String,
}

/// What happened to one harmonized customer turn once the pipeline finished.
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    /// A reply was dispatched to the customer.
    Replied { content: String },
    /// A checkout-machine transition occurred; `reply` is the (possibly
    /// empty, budget-limited) confirmation message emitted alongside it.
    CheckoutAdvanced { state: checkout::CheckoutState, reply: Option<String> },
    /// Every configured provider failed, or the confidence/handoff cap was
    /// tripped; the conversation was marked for human handoff.
    HandedOff { courtesy_message: String },
}
