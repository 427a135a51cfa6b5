use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::error::{MessagingError, Result};
use crate::types::{
    Conversation, ConversationStatus, Customer, Direction, Message, MessageStatus,
    MessageTemplate,
};
use platform_core::types::MessageType;

/// Idempotent schema init, safe to call on every startup.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS customers (
            id                      TEXT PRIMARY KEY,
            tenant_id               TEXT NOT NULL,
            phone_e164              TEXT NOT NULL,
            display_name            TEXT,
            language                TEXT,
            timezone                TEXT,
            consent_transactional   INTEGER NOT NULL DEFAULT 1,
            consent_reminder        INTEGER NOT NULL DEFAULT 0,
            consent_promotional     INTEGER NOT NULL DEFAULT 0,
            created_at              TEXT NOT NULL,
            updated_at              TEXT NOT NULL,
            UNIQUE(tenant_id, phone_e164)
        );
        CREATE INDEX IF NOT EXISTS idx_customers_tenant ON customers(tenant_id);

        CREATE TABLE IF NOT EXISTS conversations (
            id                      TEXT PRIMARY KEY,
            tenant_id               TEXT NOT NULL,
            customer_id             TEXT NOT NULL,
            status                  TEXT NOT NULL,
            current_session_start   TEXT NOT NULL,
            session_message_count   INTEGER NOT NULL DEFAULT 0,
            created_at              TEXT NOT NULL,
            updated_at              TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_conversations_tenant ON conversations(tenant_id);
        CREATE INDEX IF NOT EXISTS idx_conversations_customer ON conversations(customer_id);

        CREATE TABLE IF NOT EXISTS messages (
            id                      TEXT PRIMARY KEY,
            tenant_id               TEXT NOT NULL,
            conversation_id         TEXT NOT NULL,
            direction               TEXT NOT NULL,
            message_type            TEXT NOT NULL,
            content                 TEXT NOT NULL,
            provider_message_id     TEXT,
            status                  TEXT NOT NULL,
            created_at              TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_messages_tenant ON messages(tenant_id, created_at);

        CREATE TABLE IF NOT EXISTS message_templates (
            id          TEXT PRIMARY KEY,
            tenant_id   TEXT NOT NULL,
            name        TEXT NOT NULL,
            content     TEXT NOT NULL,
            usage_count INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL,
            UNIQUE(tenant_id, name)
        );",
    )
}

pub fn create_customer(
    conn: &Connection,
    tenant_id: &str,
    phone_e164: &str,
    display_name: Option<&str>,
) -> Result<Customer> {
    let id = Uuid::now_v7().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO customers (id, tenant_id, phone_e164, display_name, language, timezone,
            consent_transactional, consent_reminder, consent_promotional, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, NULL, NULL, 1, 0, 0, ?5, ?5)",
        params![id, tenant_id, phone_e164, display_name, now],
    )?;
    get_customer(conn, tenant_id, &id)?.ok_or_else(|| MessagingError::NotFound(id))
}

pub fn get_customer(conn: &Connection, tenant_id: &str, id: &str) -> Result<Option<Customer>> {
    conn.query_row(
        "SELECT id, tenant_id, phone_e164, display_name, language, timezone,
            consent_transactional, consent_reminder, consent_promotional, created_at, updated_at
         FROM customers WHERE tenant_id = ?1 AND id = ?2",
        params![tenant_id, id],
        row_to_customer,
    )
    .optional()
    .map_err(MessagingError::Database)
}

pub fn get_customer_by_phone(
    conn: &Connection,
    tenant_id: &str,
    phone_e164: &str,
) -> Result<Option<Customer>> {
    conn.query_row(
        "SELECT id, tenant_id, phone_e164, display_name, language, timezone,
            consent_transactional, consent_reminder, consent_promotional, created_at, updated_at
         FROM customers WHERE tenant_id = ?1 AND phone_e164 = ?2",
        params![tenant_id, phone_e164],
        row_to_customer,
    )
    .optional()
    .map_err(MessagingError::Database)
}

pub fn set_consent(
    conn: &Connection,
    tenant_id: &str,
    customer_id: &str,
    reminder: Option<bool>,
    promotional: Option<bool>,
) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    if let Some(v) = reminder {
        conn.execute(
            "UPDATE customers SET consent_reminder = ?1, updated_at = ?2 WHERE tenant_id = ?3 AND id = ?4",
            params![v, now, tenant_id, customer_id],
        )?;
    }
    if let Some(v) = promotional {
        conn.execute(
            "UPDATE customers SET consent_promotional = ?1, updated_at = ?2 WHERE tenant_id = ?3 AND id = ?4",
            params![v, now, tenant_id, customer_id],
        )?;
    }
    Ok(())
}

fn row_to_customer(row: &Row) -> rusqlite::Result<Customer> {
    Ok(Customer {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        phone_e164: row.get(2)?,
        display_name: row.get(3)?,
        language: row.get(4)?,
        timezone: row.get(5)?,
        consent_transactional: row.get(6)?,
        consent_reminder: row.get(7)?,
        consent_promotional: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

pub fn create_conversation(
    conn: &Connection,
    tenant_id: &str,
    customer_id: &str,
) -> Result<Conversation> {
    let id = Uuid::now_v7().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO conversations (id, tenant_id, customer_id, status, current_session_start,
            session_message_count, created_at, updated_at)
         VALUES (?1, ?2, ?3, 'open', ?4, 0, ?4, ?4)",
        params![id, tenant_id, customer_id, now],
    )?;
    get_conversation(conn, tenant_id, &id)?.ok_or_else(|| MessagingError::NotFound(id))
}

pub fn get_conversation(
    conn: &Connection,
    tenant_id: &str,
    id: &str,
) -> Result<Option<Conversation>> {
    conn.query_row(
        "SELECT id, tenant_id, customer_id, status, current_session_start,
            session_message_count, created_at, updated_at
         FROM conversations WHERE tenant_id = ?1 AND id = ?2",
        params![tenant_id, id],
        row_to_conversation,
    )
    .optional()
    .map_err(MessagingError::Database)
}

/// Page of a tenant's conversations, most recently updated first.
pub fn list_conversations(
    conn: &Connection,
    tenant_id: &str,
    limit: u32,
    offset: u32,
) -> Result<Vec<Conversation>> {
    let mut stmt = conn.prepare(
        "SELECT id, tenant_id, customer_id, status, current_session_start,
            session_message_count, created_at, updated_at
         FROM conversations WHERE tenant_id = ?1
         ORDER BY updated_at DESC LIMIT ?2 OFFSET ?3",
    )?;
    let rows = stmt.query_map(params![tenant_id, limit, offset], row_to_conversation)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(MessagingError::Database)
}

pub fn count_conversations(conn: &Connection, tenant_id: &str) -> Result<u32> {
    conn.query_row(
        "SELECT COUNT(*) FROM conversations WHERE tenant_id = ?1",
        params![tenant_id],
        |row| row.get(0),
    )
    .map_err(MessagingError::Database)
}

/// Looks up a conversation by id alone, with no tenant filter — used by
/// background workers (the harmonizer flush task) that only have the id to
/// hand and need the row's own `tenant_id` before they can do anything
/// tenant-scoped with it.
pub fn get_conversation_by_id(conn: &Connection, id: &str) -> Result<Option<Conversation>> {
    conn.query_row(
        "SELECT id, tenant_id, customer_id, status, current_session_start,
            session_message_count, created_at, updated_at
         FROM conversations WHERE id = ?1",
        params![id],
        row_to_conversation,
    )
    .optional()
    .map_err(MessagingError::Database)
}

/// Most recent open-or-bot conversation for a customer, if any.
pub fn get_active_conversation(
    conn: &Connection,
    tenant_id: &str,
    customer_id: &str,
) -> Result<Option<Conversation>> {
    conn.query_row(
        "SELECT id, tenant_id, customer_id, status, current_session_start,
            session_message_count, created_at, updated_at
         FROM conversations
         WHERE tenant_id = ?1 AND customer_id = ?2 AND status IN ('open', 'bot', 'handoff')
         ORDER BY updated_at DESC LIMIT 1",
        params![tenant_id, customer_id],
        row_to_conversation,
    )
    .optional()
    .map_err(MessagingError::Database)
}

pub fn set_conversation_status(
    conn: &Connection,
    tenant_id: &str,
    id: &str,
    status: ConversationStatus,
) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE conversations SET status = ?1, updated_at = ?2 WHERE tenant_id = ?3 AND id = ?4",
        params![status.to_string(), now, tenant_id, id],
    )?;
    Ok(())
}

pub fn increment_session_count(conn: &Connection, tenant_id: &str, id: &str) -> Result<u32> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE conversations SET session_message_count = session_message_count + 1, updated_at = ?1
         WHERE tenant_id = ?2 AND id = ?3",
        params![now, tenant_id, id],
    )?;
    conn.query_row(
        "SELECT session_message_count FROM conversations WHERE tenant_id = ?1 AND id = ?2",
        params![tenant_id, id],
        |row| row.get(0),
    )
    .map_err(MessagingError::Database)
}

fn row_to_conversation(row: &Row) -> rusqlite::Result<Conversation> {
    let status_str: String = row.get(3)?;
    let status = status_str.parse().unwrap_or(ConversationStatus::Open);
    Ok(Conversation {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        customer_id: row.get(2)?,
        status,
        current_session_start: row.get(4)?,
        session_message_count: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

pub fn record_message(
    conn: &Connection,
    tenant_id: &str,
    conversation_id: &str,
    direction: Direction,
    message_type: MessageType,
    content: &str,
    provider_message_id: Option<&str>,
    status: MessageStatus,
) -> Result<Message> {
    let id = Uuid::now_v7().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO messages (id, tenant_id, conversation_id, direction, message_type, content,
            provider_message_id, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            id,
            tenant_id,
            conversation_id,
            direction.to_string(),
            message_type.to_string(),
            content,
            provider_message_id,
            status.to_string(),
            now,
        ],
    )?;
    Ok(Message {
        id,
        tenant_id: tenant_id.to_string(),
        conversation_id: conversation_id.to_string(),
        direction,
        message_type,
        content: content.to_string(),
        provider_message_id: provider_message_id.map(str::to_string),
        status,
        created_at: now,
    })
}

/// Most recent `limit` messages in a conversation, oldest first — the
/// window the orchestrator folds into its context pack (spec §4.7 step 3).
pub fn get_recent_messages(
    conn: &Connection,
    tenant_id: &str,
    conversation_id: &str,
    limit: u32,
) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare(
        "SELECT id, tenant_id, conversation_id, direction, message_type, content,
                provider_message_id, status, created_at
         FROM messages WHERE tenant_id = ?1 AND conversation_id = ?2
         ORDER BY created_at DESC LIMIT ?3",
    )?;
    let rows = stmt.query_map(params![tenant_id, conversation_id, limit], |row| {
        let direction_str: String = row.get(3)?;
        let message_type_str: String = row.get(4)?;
        let status_str: String = row.get(7)?;
        Ok(Message {
            id: row.get(0)?,
            tenant_id: row.get(1)?,
            conversation_id: row.get(2)?,
            direction: direction_str.parse().unwrap_or(Direction::Inbound),
            message_type: message_type_str.parse().unwrap_or(MessageType::CustomerInbound),
            content: row.get(5)?,
            provider_message_id: row.get(6)?,
            status: status_str.parse().unwrap_or(MessageStatus::Queued),
            created_at: row.get(8)?,
        })
    })?;
    let mut out: Vec<Message> = rows.filter_map(|r| r.ok()).collect();
    out.reverse();
    Ok(out)
}

/// Number of messages in sessions that preceded `current_session_start`,
/// used to decide whether a prior-session summary is worth building at all.
pub fn count_messages_before(conn: &Connection, tenant_id: &str, conversation_id: &str, before: &str) -> Result<u32> {
    conn.query_row(
        "SELECT COUNT(*) FROM messages WHERE tenant_id = ?1 AND conversation_id = ?2 AND created_at < ?3",
        params![tenant_id, conversation_id, before],
        |row| row.get(0),
    )
    .map_err(MessagingError::Database)
}

/// Last `limit` messages of the session(s) before `current_session_start`,
/// oldest first — the tail end of the prior session is the highest-signal
/// slice for a carried-forward summary (spec §4.7 step 3).
pub fn get_messages_before(
    conn: &Connection,
    tenant_id: &str,
    conversation_id: &str,
    before: &str,
    limit: u32,
) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare(
        "SELECT id, tenant_id, conversation_id, direction, message_type, content,
                provider_message_id, status, created_at
         FROM messages WHERE tenant_id = ?1 AND conversation_id = ?2 AND created_at < ?3
         ORDER BY created_at DESC LIMIT ?4",
    )?;
    let rows = stmt.query_map(params![tenant_id, conversation_id, before, limit], |row| {
        let direction_str: String = row.get(3)?;
        let message_type_str: String = row.get(4)?;
        let status_str: String = row.get(7)?;
        Ok(Message {
            id: row.get(0)?,
            tenant_id: row.get(1)?,
            conversation_id: row.get(2)?,
            direction: direction_str.parse().unwrap_or(Direction::Inbound),
            message_type: message_type_str.parse().unwrap_or(MessageType::CustomerInbound),
            content: row.get(5)?,
            provider_message_id: row.get(6)?,
            status: status_str.parse().unwrap_or(MessageStatus::Queued),
            created_at: row.get(8)?,
        })
    })?;
    let mut out: Vec<Message> = rows.filter_map(|r| r.ok()).collect();
    out.reverse();
    Ok(out)
}

/// Count of outbound messages sent to `tenant_id` in the trailing 24h,
/// used by the rate limiter's sliding window.
pub fn count_outbound_last_24h(conn: &Connection, tenant_id: &str) -> Result<u32> {
    let cutoff = (chrono::Utc::now() - chrono::Duration::hours(24)).to_rfc3339();
    conn.query_row(
        "SELECT COUNT(*) FROM messages
         WHERE tenant_id = ?1 AND direction = 'outbound' AND created_at >= ?2",
        params![tenant_id, cutoff],
        |row| row.get(0),
    )
    .map_err(MessagingError::Database)
}

pub fn get_template(
    conn: &Connection,
    tenant_id: &str,
    name: &str,
) -> Result<Option<MessageTemplate>> {
    conn.query_row(
        "SELECT id, tenant_id, name, content, usage_count, created_at
         FROM message_templates WHERE tenant_id = ?1 AND name = ?2",
        params![tenant_id, name],
        row_to_template,
    )
    .optional()
    .map_err(MessagingError::Database)
}

pub fn list_templates(conn: &Connection, tenant_id: &str) -> Result<Vec<MessageTemplate>> {
    let mut stmt = conn.prepare(
        "SELECT id, tenant_id, name, content, usage_count, created_at
         FROM message_templates WHERE tenant_id = ?1 ORDER BY name",
    )?;
    let rows = stmt.query_map(params![tenant_id], row_to_template)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(MessagingError::Database)
}

pub fn upsert_template(
    conn: &Connection,
    tenant_id: &str,
    name: &str,
    content: &str,
) -> Result<MessageTemplate> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO message_templates (id, tenant_id, name, content, usage_count, created_at)
         VALUES (?1, ?2, ?3, ?4, 0, ?5)
         ON CONFLICT(tenant_id, name) DO UPDATE SET content = excluded.content",
        params![Uuid::now_v7().to_string(), tenant_id, name, content, now],
    )?;
    get_template(conn, tenant_id, name)?.ok_or_else(|| MessagingError::TemplateNotFound(name.to_string()))
}

pub fn increment_template_usage(conn: &Connection, tenant_id: &str, id: &str) -> Result<()> {
    conn.execute(
        "UPDATE message_templates SET usage_count = usage_count + 1 WHERE tenant_id = ?1 AND id = ?2",
        params![tenant_id, id],
    )?;
    Ok(())
}

fn row_to_template(row: &Row) -> rusqlite::Result<MessageTemplate> {
    Ok(MessageTemplate {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        name: row.get(2)?,
        content: row.get(3)?,
        usage_count: row.get(4)?,
        created_at: row.get(5)?,
    })
}
