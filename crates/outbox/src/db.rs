use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use crate::error::Result;
use crate::types::{AuditLog, OutboxEvent};

pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS outbox_events (
            id               TEXT NOT NULL PRIMARY KEY,
            tenant_id        TEXT NOT NULL,
            aggregate_type   TEXT NOT NULL,
            aggregate_id     TEXT NOT NULL,
            event_type       TEXT NOT NULL,
            payload          TEXT NOT NULL,
            created_at       TEXT NOT NULL,
            dispatched_at    TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_outbox_pending ON outbox_events(dispatched_at, created_at);

        CREATE TABLE IF NOT EXISTS audit_log (
            id              TEXT NOT NULL PRIMARY KEY,
            tenant_id       TEXT NOT NULL,
            actor_user_id   TEXT,
            action          TEXT NOT NULL,
            resource_type   TEXT NOT NULL,
            resource_id     TEXT NOT NULL,
            details         TEXT NOT NULL DEFAULT '{}',
            created_at      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_audit_tenant ON audit_log(tenant_id, created_at);",
    )
}

/// Insert an outbox row on the same `conn` as the business-data write that
/// produced it — callers are expected to wrap both in one transaction so
/// the write and the event are atomic.
pub fn enqueue_event(
    conn: &Connection,
    tenant_id: &str,
    aggregate_type: &str,
    aggregate_id: &str,
    event_type: &str,
    payload: &str,
) -> Result<OutboxEvent> {
    let id = Uuid::now_v7().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO outbox_events
            (id, tenant_id, aggregate_type, aggregate_id, event_type, payload, created_at, dispatched_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL)",
        params![id, tenant_id, aggregate_type, aggregate_id, event_type, payload, now],
    )?;
    Ok(OutboxEvent {
        id,
        tenant_id: tenant_id.to_string(),
        aggregate_type: aggregate_type.to_string(),
        aggregate_id: aggregate_id.to_string(),
        event_type: event_type.to_string(),
        payload: payload.to_string(),
        created_at: now,
        dispatched_at: None,
    })
}

pub fn pending_events(conn: &Connection, limit: u32) -> Result<Vec<OutboxEvent>> {
    let mut stmt = conn.prepare(
        "SELECT id, tenant_id, aggregate_type, aggregate_id, event_type, payload, created_at, dispatched_at
         FROM outbox_events WHERE dispatched_at IS NULL ORDER BY created_at LIMIT ?1",
    )?;
    let rows = stmt
        .query_map(params![limit], row_to_event)?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

pub fn mark_dispatched(conn: &Connection, id: &str) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute("UPDATE outbox_events SET dispatched_at = ?1 WHERE id = ?2", params![now, id])?;
    Ok(())
}

fn row_to_event(row: &Row) -> rusqlite::Result<OutboxEvent> {
    Ok(OutboxEvent {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        aggregate_type: row.get(2)?,
        aggregate_id: row.get(3)?,
        event_type: row.get(4)?,
        payload: row.get(5)?,
        created_at: row.get(6)?,
        dispatched_at: row.get(7)?,
    })
}

/// Write an audit entry. Callers should never let a failure here abort the
/// operation being audited — log and continue (spec §9).
pub fn write_audit_log(
    conn: &Connection,
    tenant_id: &str,
    actor_user_id: Option<&str>,
    action: &str,
    resource_type: &str,
    resource_id: &str,
    details: &str,
) -> Result<AuditLog> {
    let id = Uuid::now_v7().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO audit_log (id, tenant_id, actor_user_id, action, resource_type, resource_id, details, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![id, tenant_id, actor_user_id, action, resource_type, resource_id, details, now],
    )?;
    Ok(AuditLog {
        id,
        tenant_id: tenant_id.to_string(),
        actor_user_id: actor_user_id.map(str::to_string),
        action: action.to_string(),
        resource_type: resource_type.to_string(),
        resource_id: resource_id.to_string(),
        details: details.to_string(),
        created_at: now,
    })
}
