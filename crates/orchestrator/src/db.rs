use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::Result;
use crate::types::ConversationState;

pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS orchestrator_conversation_state (
            conversation_id      TEXT NOT NULL PRIMARY KEY,
            tenant_id            TEXT NOT NULL,
            locked_language      TEXT,
            low_confidence_streak INTEGER NOT NULL DEFAULT 0,
            updated_at           TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS validation_log (
            id              TEXT NOT NULL PRIMARY KEY,
            tenant_id       TEXT NOT NULL,
            conversation_id TEXT NOT NULL,
            transformation  TEXT NOT NULL,
            detail          TEXT NOT NULL,
            created_at      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_validation_log_conv ON validation_log(conversation_id, created_at);",
    )
}

pub fn get_state(conn: &Connection, conversation_id: &str) -> Result<Option<ConversationState>> {
    conn.query_row(
        "SELECT conversation_id, locked_language, low_confidence_streak, updated_at
         FROM orchestrator_conversation_state WHERE conversation_id = ?1",
        params![conversation_id],
        |row| {
            Ok(ConversationState {
                conversation_id: row.get(0)?,
                locked_language: row.get(1)?,
                low_confidence_streak: row.get(2)?,
                updated_at: row.get(3)?,
            })
        },
    )
    .optional()
    .map_err(Into::into)
}

pub fn upsert_state(
    conn: &Connection,
    tenant_id: &str,
    conversation_id: &str,
    locked_language: Option<&str>,
    low_confidence_streak: u32,
) -> Result<ConversationState> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO orchestrator_conversation_state
            (conversation_id, tenant_id, locked_language, low_confidence_streak, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(conversation_id) DO UPDATE SET
            locked_language = excluded.locked_language,
            low_confidence_streak = excluded.low_confidence_streak,
            updated_at = excluded.updated_at",
        params![conversation_id, tenant_id, locked_language, low_confidence_streak, now],
    )?;
    Ok(ConversationState {
        conversation_id: conversation_id.to_string(),
        locked_language: locked_language.map(str::to_string),
        low_confidence_streak,
        updated_at: now,
    })
}

pub fn record_validation(
    conn: &Connection,
    tenant_id: &str,
    conversation_id: &str,
    transformation: &str,
    detail: &str,
) -> Result<()> {
    let id = Uuid::now_v7().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO validation_log (id, tenant_id, conversation_id, transformation, detail, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![id, tenant_id, conversation_id, transformation, detail, now],
    )?;
    Ok(())
}
