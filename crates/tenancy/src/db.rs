use rusqlite::{Connection, Result};
use std::str::FromStr;

use crate::types::{Role, Tenant, TenantSettings, TenantUser, User};
use platform_core::types::{SubscriptionTier, TenantStatus};

pub(crate) fn row_to_tenant(row: &rusqlite::Row<'_>) -> rusqlite::Result<Tenant> {
    let status = TenantStatus::from_str(&row.get::<_, String>(2)?).unwrap_or(TenantStatus::Trial);
    let tier = SubscriptionTier::from_str(&row.get::<_, String>(3)?).unwrap_or(SubscriptionTier::Starter);
    Ok(Tenant {
        id: row.get(0)?,
        name: row.get(1)?,
        status,
        subscription_tier: tier,
        api_key_hash: row.get(4)?,
        whatsapp_phone_id: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        deleted_at: row.get(8)?,
    })
}

pub(crate) fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        display_name: row.get(2)?,
        is_platform_operator: row.get::<_, i64>(3)? != 0,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

pub(crate) fn row_to_tenant_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<TenantUser> {
    let role = Role::from_str(&row.get::<_, String>(2)?).unwrap_or(Role::Viewer);
    Ok(TenantUser {
        tenant_id: row.get(0)?,
        user_id: row.get(1)?,
        role,
        created_at: row.get(3)?,
    })
}

pub(crate) fn row_to_settings(row: &rusqlite::Row<'_>) -> rusqlite::Result<TenantSettings> {
    Ok(TenantSettings {
        tenant_id: row.get(0)?,
        quiet_hours_start_minute: row.get(1)?,
        quiet_hours_end_minute: row.get(2)?,
        harmonizer_window_secs: row.get(3)?,
        consent_required: row.get::<_, i64>(4)? != 0,
        timezone: row.get(5)?,
        fallback_message: row.get(6)?,
        handoff_message: row.get(7)?,
        webhook_secret: row.get(8)?,
    })
}

/// Initialise all tables for the tenancy subsystem. Idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    create_tenants_table(conn)?;
    create_tenant_settings_table(conn)?;
    create_users_table(conn)?;
    create_tenant_users_table(conn)?;
    create_role_permissions_table(conn)?;
    create_user_permissions_table(conn)?;
    create_tenant_integrations_table(conn)?;
    Ok(())
}

fn create_tenants_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS tenants (
            id                TEXT PRIMARY KEY NOT NULL,
            name              TEXT NOT NULL,
            status            TEXT NOT NULL DEFAULT 'trial',
            subscription_tier TEXT NOT NULL DEFAULT 'starter',
            api_key_hash      TEXT NOT NULL UNIQUE,
            whatsapp_phone_id TEXT,
            created_at        TEXT NOT NULL,
            updated_at        TEXT NOT NULL,
            deleted_at        TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_tenants_api_key ON tenants (api_key_hash);",
    )
}

fn create_tenant_settings_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS tenant_settings (
            tenant_id               TEXT PRIMARY KEY NOT NULL REFERENCES tenants(id),
            quiet_hours_start_minute INTEGER,
            quiet_hours_end_minute   INTEGER,
            harmonizer_window_secs   INTEGER,
            consent_required         INTEGER NOT NULL DEFAULT 1,
            timezone                 TEXT NOT NULL DEFAULT 'UTC',
            fallback_message         TEXT,
            handoff_message          TEXT,
            webhook_secret           TEXT
        );",
    )
}

fn create_users_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id                    TEXT PRIMARY KEY NOT NULL,
            email                 TEXT NOT NULL UNIQUE,
            display_name          TEXT NOT NULL,
            is_platform_operator  INTEGER NOT NULL DEFAULT 0,
            created_at            TEXT NOT NULL,
            updated_at            TEXT NOT NULL
        );",
    )
}

fn create_tenant_users_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS tenant_users (
            tenant_id  TEXT NOT NULL REFERENCES tenants(id),
            user_id    TEXT NOT NULL REFERENCES users(id),
            role       TEXT NOT NULL DEFAULT 'viewer',
            created_at TEXT NOT NULL,
            PRIMARY KEY (tenant_id, user_id)
        );
        CREATE INDEX IF NOT EXISTS idx_tenant_users_user ON tenant_users (user_id);",
    )
}

fn create_role_permissions_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS role_permissions (
            role       TEXT NOT NULL,
            permission TEXT NOT NULL,
            allowed    INTEGER NOT NULL,
            PRIMARY KEY (role, permission)
        );",
    )
}

fn create_user_permissions_table(conn: &Connection) -> Result<()> {
    // A UserPermission row always overrides the role default for (tenant, user, permission).
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS user_permissions (
            tenant_id  TEXT NOT NULL,
            user_id    TEXT NOT NULL,
            permission TEXT NOT NULL,
            allowed    INTEGER NOT NULL,
            PRIMARY KEY (tenant_id, user_id, permission)
        );",
    )
}

fn create_tenant_integrations_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS tenant_integrations (
            tenant_id  TEXT NOT NULL REFERENCES tenants(id),
            provider   TEXT NOT NULL,
            ciphertext TEXT NOT NULL,
            nonce      TEXT NOT NULL,
            last_four  TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (tenant_id, provider)
        );",
    )
}
