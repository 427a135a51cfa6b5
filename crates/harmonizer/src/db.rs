use rusqlite::Connection;

use crate::error::Result;

/// Initialise the idempotency ledger for inbound provider messages.
/// Safe to call on every startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS inbound_message_log (
            provider_message_id TEXT PRIMARY KEY,
            conversation_id     TEXT NOT NULL,
            received_at         TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_inbound_log_conversation
            ON inbound_message_log(conversation_id, received_at);",
    )?;
    Ok(())
}

/// Records a provider message id, returning `Ok(true)` the first time it is
/// seen and `Ok(false)` on any repeat delivery (at-least-once webhook retry).
pub fn record_if_new(
    conn: &Connection,
    provider_message_id: &str,
    conversation_id: &str,
    received_at: &str,
) -> Result<bool> {
    let rows = conn.execute(
        "INSERT OR IGNORE INTO inbound_message_log (provider_message_id, conversation_id, received_at)
         VALUES (?1, ?2, ?3)",
        rusqlite::params![provider_message_id, conversation_id, received_at],
    )?;
    Ok(rows > 0)
}
