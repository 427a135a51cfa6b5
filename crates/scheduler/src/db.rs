use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::error::{Result, SchedulerError};
use crate::types::{ScheduledMessage, ScheduledMessageStatus};
use platform_core::types::MessageType;

pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS scheduled_messages (
            id               TEXT NOT NULL PRIMARY KEY,
            tenant_id        TEXT NOT NULL,
            conversation_id  TEXT NOT NULL,
            customer_id      TEXT NOT NULL,
            message_type     TEXT NOT NULL,
            scheduled_for    TEXT NOT NULL,
            template_name    TEXT NOT NULL,
            template_vars    TEXT NOT NULL DEFAULT '{}',
            status           TEXT NOT NULL DEFAULT 'pending',
            created_at       TEXT NOT NULL,
            updated_at       TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_scheduled_due ON scheduled_messages(status, scheduled_for);
        CREATE INDEX IF NOT EXISTS idx_scheduled_conversation ON scheduled_messages(conversation_id);",
    )
}

#[allow(clippy::too_many_arguments)]
pub fn create_scheduled_message(
    conn: &Connection,
    tenant_id: &str,
    conversation_id: &str,
    customer_id: &str,
    message_type: MessageType,
    scheduled_for: &str,
    template_name: &str,
    template_vars: &str,
) -> Result<ScheduledMessage> {
    let id = Uuid::now_v7().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO scheduled_messages
            (id, tenant_id, conversation_id, customer_id, message_type, scheduled_for,
             template_name, template_vars, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'pending', ?9, ?9)",
        params![
            id,
            tenant_id,
            conversation_id,
            customer_id,
            message_type.to_string(),
            scheduled_for,
            template_name,
            template_vars,
            now,
        ],
    )?;
    get_scheduled_message(conn, &id)?.ok_or(SchedulerError::NotFound { id })
}

pub fn get_scheduled_message(conn: &Connection, id: &str) -> Result<Option<ScheduledMessage>> {
    conn.query_row(
        "SELECT id, tenant_id, conversation_id, customer_id, message_type, scheduled_for,
            template_name, template_vars, status, created_at, updated_at
         FROM scheduled_messages WHERE id = ?1",
        params![id],
        row_to_scheduled,
    )
    .optional()
    .map_err(SchedulerError::Database)
}

/// All pending messages whose `scheduled_for` has arrived, oldest first.
pub fn due_messages(conn: &Connection, now: &str) -> Result<Vec<ScheduledMessage>> {
    let mut stmt = conn.prepare(
        "SELECT id, tenant_id, conversation_id, customer_id, message_type, scheduled_for,
            template_name, template_vars, status, created_at, updated_at
         FROM scheduled_messages
         WHERE status = 'pending' AND scheduled_for <= ?1
         ORDER BY scheduled_for",
    )?;
    let rows = stmt
        .query_map(params![now], row_to_scheduled)?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

pub fn set_status(conn: &Connection, id: &str, status: ScheduledMessageStatus) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    let n = conn.execute(
        "UPDATE scheduled_messages SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.to_string(), now, id],
    )?;
    if n == 0 {
        return Err(SchedulerError::NotFound { id: id.to_string() });
    }
    Ok(())
}

/// Cancel every still-pending scheduled message for a conversation — used
/// when an appointment is canceled or a checkout completes (spec §4.9).
pub fn cancel_pending_for_conversation(conn: &Connection, conversation_id: &str) -> Result<u32> {
    let now = chrono::Utc::now().to_rfc3339();
    let n = conn.execute(
        "UPDATE scheduled_messages SET status = 'canceled', updated_at = ?1
         WHERE conversation_id = ?2 AND status = 'pending'",
        params![now, conversation_id],
    )?;
    Ok(n as u32)
}

fn row_to_scheduled(row: &Row) -> rusqlite::Result<ScheduledMessage> {
    let message_type_str: String = row.get(4)?;
    let message_type = message_type_str
        .parse()
        .unwrap_or(platform_core::types::MessageType::Fallback);
    let status_str: String = row.get(8)?;
    let status = status_str.parse().unwrap_or(ScheduledMessageStatus::Pending);
    Ok(ScheduledMessage {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        conversation_id: row.get(2)?,
        customer_id: row.get(3)?,
        message_type,
        scheduled_for: row.get(5)?,
        template_name: row.get(6)?,
        template_vars: row.get(7)?,
        status,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}
