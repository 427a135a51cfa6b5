use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::error::{CheckoutError, Result};
use crate::types::{CheckoutSession, CheckoutState, Order, OrderStatus, PaymentRequest, PaymentStatus};

pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS checkout_sessions (
            id                      TEXT NOT NULL PRIMARY KEY,
            tenant_id               TEXT NOT NULL,
            conversation_id         TEXT NOT NULL,
            customer_id             TEXT NOT NULL,
            state                   TEXT NOT NULL,
            product_sku             TEXT,
            quantity                INTEGER,
            payment_method          TEXT,
            order_id                TEXT,
            outbound_message_count  INTEGER NOT NULL DEFAULT 0,
            created_at              TEXT NOT NULL,
            updated_at              TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_checkout_conversation ON checkout_sessions(conversation_id);

        CREATE TABLE IF NOT EXISTS orders (
            id                      TEXT NOT NULL PRIMARY KEY,
            tenant_id               TEXT NOT NULL,
            checkout_session_id     TEXT NOT NULL,
            customer_id             TEXT NOT NULL,
            sku                     TEXT NOT NULL,
            quantity                INTEGER NOT NULL,
            unit_price_cents        INTEGER NOT NULL,
            total_cents             INTEGER NOT NULL,
            currency                TEXT NOT NULL,
            status                  TEXT NOT NULL,
            created_at              TEXT NOT NULL,
            updated_at              TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_orders_tenant ON orders(tenant_id, created_at);

        CREATE TABLE IF NOT EXISTS payment_requests (
            id                  TEXT NOT NULL PRIMARY KEY,
            tenant_id           TEXT NOT NULL,
            order_id            TEXT NOT NULL,
            provider            TEXT NOT NULL,
            status              TEXT NOT NULL,
            provider_reference  TEXT,
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_payment_requests_order ON payment_requests(order_id);",
    )
}

pub fn create_session(
    conn: &Connection,
    tenant_id: &str,
    conversation_id: &str,
    customer_id: &str,
) -> Result<CheckoutSession> {
    let id = Uuid::now_v7().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO checkout_sessions
            (id, tenant_id, conversation_id, customer_id, state, product_sku, quantity,
             payment_method, order_id, outbound_message_count, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 'browsing', NULL, NULL, NULL, NULL, 0, ?5, ?5)",
        params![id, tenant_id, conversation_id, customer_id, now],
    )?;
    get_session(conn, &id)?.ok_or_else(|| CheckoutError::NotFound(id))
}

pub fn get_session(conn: &Connection, id: &str) -> Result<Option<CheckoutSession>> {
    conn.query_row(
        "SELECT id, tenant_id, conversation_id, customer_id, state, product_sku, quantity,
            payment_method, order_id, outbound_message_count, created_at, updated_at
         FROM checkout_sessions WHERE id = ?1",
        params![id],
        row_to_session,
    )
    .optional()
    .map_err(CheckoutError::Database)
}

pub fn get_active_session_for_conversation(
    conn: &Connection,
    conversation_id: &str,
) -> Result<Option<CheckoutSession>> {
    conn.query_row(
        "SELECT id, tenant_id, conversation_id, customer_id, state, product_sku, quantity,
            payment_method, order_id, outbound_message_count, created_at, updated_at
         FROM checkout_sessions
         WHERE conversation_id = ?1 AND state NOT IN ('closed', 'failed')
         ORDER BY updated_at DESC LIMIT 1",
        params![conversation_id],
        row_to_session,
    )
    .optional()
    .map_err(CheckoutError::Database)
}

#[allow(clippy::too_many_arguments)]
pub fn update_session(
    conn: &Connection,
    id: &str,
    state: CheckoutState,
    product_sku: Option<&str>,
    quantity: Option<u32>,
    payment_method: Option<&str>,
    order_id: Option<&str>,
    outbound_message_count: u32,
) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    let n = conn.execute(
        "UPDATE checkout_sessions SET state = ?1, product_sku = ?2, quantity = ?3,
            payment_method = ?4, order_id = ?5, outbound_message_count = ?6, updated_at = ?7
         WHERE id = ?8",
        params![state.to_string(), product_sku, quantity, payment_method, order_id, outbound_message_count, now, id],
    )?;
    if n == 0 {
        return Err(CheckoutError::NotFound(id.to_string()));
    }
    Ok(())
}

fn row_to_session(row: &Row) -> rusqlite::Result<CheckoutSession> {
    let state_str: String = row.get(4)?;
    Ok(CheckoutSession {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        conversation_id: row.get(2)?,
        customer_id: row.get(3)?,
        state: state_str.parse().unwrap_or(CheckoutState::Browsing),
        product_sku: row.get(5)?,
        quantity: row.get(6)?,
        payment_method: row.get(7)?,
        order_id: row.get(8)?,
        outbound_message_count: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

#[allow(clippy::too_many_arguments)]
pub fn create_order(
    conn: &Connection,
    tenant_id: &str,
    checkout_session_id: &str,
    customer_id: &str,
    sku: &str,
    quantity: u32,
    unit_price_cents: i64,
    currency: &str,
) -> Result<Order> {
    let id = Uuid::now_v7().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    let total_cents = unit_price_cents * quantity as i64;
    conn.execute(
        "INSERT INTO orders
            (id, tenant_id, checkout_session_id, customer_id, sku, quantity, unit_price_cents,
             total_cents, currency, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'pending_payment', ?10, ?10)",
        params![id, tenant_id, checkout_session_id, customer_id, sku, quantity, unit_price_cents, total_cents, currency, now],
    )?;
    get_order(conn, &id)?.ok_or_else(|| CheckoutError::NotFound(id))
}

pub fn get_order(conn: &Connection, id: &str) -> Result<Option<Order>> {
    conn.query_row(
        "SELECT id, tenant_id, checkout_session_id, customer_id, sku, quantity, unit_price_cents,
            total_cents, currency, status, created_at, updated_at
         FROM orders WHERE id = ?1",
        params![id],
        row_to_order,
    )
    .optional()
    .map_err(CheckoutError::Database)
}

pub fn set_order_status(conn: &Connection, id: &str, status: OrderStatus) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    let n = conn.execute(
        "UPDATE orders SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.to_string(), now, id],
    )?;
    if n == 0 {
        return Err(CheckoutError::NotFound(id.to_string()));
    }
    Ok(())
}

fn row_to_order(row: &Row) -> rusqlite::Result<Order> {
    let status_str: String = row.get(9)?;
    Ok(Order {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        checkout_session_id: row.get(2)?,
        customer_id: row.get(3)?,
        sku: row.get(4)?,
        quantity: row.get(5)?,
        unit_price_cents: row.get(6)?,
        total_cents: row.get(7)?,
        currency: row.get(8)?,
        status: status_str.parse().unwrap_or(OrderStatus::PendingPayment),
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

pub fn create_payment_request(
    conn: &Connection,
    tenant_id: &str,
    order_id: &str,
    provider: &str,
) -> Result<PaymentRequest> {
    let id = Uuid::now_v7().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO payment_requests (id, tenant_id, order_id, provider, status, provider_reference, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 'initiated', NULL, ?5, ?5)",
        params![id, tenant_id, order_id, provider, now],
    )?;
    Ok(PaymentRequest {
        id,
        tenant_id: tenant_id.to_string(),
        order_id: order_id.to_string(),
        provider: provider.to_string(),
        status: PaymentStatus::Initiated,
        provider_reference: None,
        created_at: now.clone(),
        updated_at: now,
    })
}

pub fn get_payment_request_by_order_id(conn: &Connection, order_id: &str) -> Result<Option<PaymentRequest>> {
    conn.query_row(
        "SELECT id, tenant_id, order_id, provider, status, provider_reference, created_at, updated_at
         FROM payment_requests WHERE order_id = ?1 ORDER BY created_at DESC LIMIT 1",
        params![order_id],
        row_to_payment_request,
    )
    .optional()
    .map_err(CheckoutError::Database)
}

fn row_to_payment_request(row: &Row) -> rusqlite::Result<PaymentRequest> {
    let status_str: String = row.get(4)?;
    Ok(PaymentRequest {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        order_id: row.get(2)?,
        provider: row.get(3)?,
        status: status_str.parse().unwrap_or(PaymentStatus::Initiated),
        provider_reference: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

pub fn set_payment_status(
    conn: &Connection,
    id: &str,
    status: PaymentStatus,
    provider_reference: Option<&str>,
) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    let n = conn.execute(
        "UPDATE payment_requests SET status = ?1, provider_reference = COALESCE(?2, provider_reference), updated_at = ?3
         WHERE id = ?4",
        params![status.to_string(), provider_reference, now, id],
    )?;
    if n == 0 {
        return Err(CheckoutError::NotFound(id.to_string()));
    }
    Ok(())
}
