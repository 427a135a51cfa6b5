use serde::{Deserialize, Serialize};

/// An event recorded in the same transaction as the business-data write that
/// caused it, so dispatch is never lost to a crash between "write" and
/// "notify" (the outbox pattern).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: String,
    pub tenant_id: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    /// JSON-encoded event body, shape depends on `event_type`.
    pub payload: String,
    pub created_at: String,
    pub dispatched_at: Option<String>,
}

/// An immutable record of a sensitive operation (spec §3, §9). Writes are
/// best-effort: a failed audit write is logged but never aborts the
/// operation it is describing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: String,
    pub tenant_id: String,
    pub actor_user_id: Option<String>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    /// JSON-encoded free-form detail blob (before/after values, reason, etc.).
    pub details: String,
    pub created_at: String,
}
