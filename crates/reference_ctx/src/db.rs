use rusqlite::Connection;

use crate::error::Result;

/// The reference context itself is a pure in-memory TTL cache (see
/// `manager::ReferenceContextManager`) and is never queried directly, but a
/// durable mirror is kept so a gateway restart doesn't silently break
/// mid-conversation deictic resolution for conversations still inside the
/// TTL window.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS reference_context (
            conversation_id TEXT PRIMARY KEY,
            items_json      TEXT NOT NULL,
            built_at        TEXT NOT NULL
        );",
    )?;
    Ok(())
}

pub fn persist(
    conn: &Connection,
    conversation_id: &str,
    items_json: &str,
    built_at: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO reference_context (conversation_id, items_json, built_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(conversation_id) DO UPDATE SET items_json=excluded.items_json, built_at=excluded.built_at",
        rusqlite::params![conversation_id, items_json, built_at],
    )?;
    Ok(())
}

pub fn load(conn: &Connection, conversation_id: &str) -> Result<Option<(String, String)>> {
    match conn.query_row(
        "SELECT items_json, built_at FROM reference_context WHERE conversation_id = ?1",
        rusqlite::params![conversation_id],
        |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
    ) {
        Ok(v) => Ok(Some(v)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
