use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::error::{Result, WalletError};
use crate::types::{Withdrawal, WithdrawalStatus};

pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS withdrawals (
            id              TEXT NOT NULL PRIMARY KEY,
            tenant_id       TEXT NOT NULL,
            requested_by    TEXT NOT NULL,
            approved_by     TEXT,
            amount_cents    INTEGER NOT NULL,
            currency        TEXT NOT NULL,
            status          TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_withdrawals_tenant ON withdrawals(tenant_id, created_at);",
    )
}

pub fn create_withdrawal(
    conn: &Connection,
    tenant_id: &str,
    requested_by: &str,
    amount_cents: i64,
    currency: &str,
) -> Result<Withdrawal> {
    let id = Uuid::now_v7().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO withdrawals
            (id, tenant_id, requested_by, approved_by, amount_cents, currency, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, NULL, ?4, ?5, 'pending', ?6, ?6)",
        params![id, tenant_id, requested_by, amount_cents, currency, now],
    )?;
    get_withdrawal(conn, &id)?.ok_or_else(|| WalletError::NotFound(id))
}

pub fn get_withdrawal(conn: &Connection, id: &str) -> Result<Option<Withdrawal>> {
    conn.query_row(
        "SELECT id, tenant_id, requested_by, approved_by, amount_cents, currency, status, created_at, updated_at
         FROM withdrawals WHERE id = ?1",
        params![id],
        row_to_withdrawal,
    )
    .optional()
    .map_err(WalletError::Database)
}

pub fn list_withdrawals(conn: &Connection, tenant_id: &str) -> Result<Vec<Withdrawal>> {
    let mut stmt = conn.prepare(
        "SELECT id, tenant_id, requested_by, approved_by, amount_cents, currency, status, created_at, updated_at
         FROM withdrawals WHERE tenant_id = ?1 ORDER BY created_at DESC",
    )?;
    let rows = stmt.query_map(params![tenant_id], row_to_withdrawal)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(WalletError::Database)
}

pub fn set_status(conn: &Connection, id: &str, status: WithdrawalStatus, approved_by: Option<&str>) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    let n = conn.execute(
        "UPDATE withdrawals SET status = ?1, approved_by = ?2, updated_at = ?3 WHERE id = ?4",
        params![status.to_string(), approved_by, now, id],
    )?;
    if n == 0 {
        return Err(WalletError::NotFound(id.to_string()));
    }
    Ok(())
}

fn row_to_withdrawal(row: &Row) -> rusqlite::Result<Withdrawal> {
    let status_str: String = row.get(6)?;
    Ok(Withdrawal {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        requested_by: row.get(2)?,
        approved_by: row.get(3)?,
        amount_cents: row.get(4)?,
        currency: row.get(5)?,
        status: status_str.parse().unwrap_or(WithdrawalStatus::Pending),
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}
