use chrono::Utc;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::error::{Result, TenancyError};
use crate::types::{Role, RolePermission, Tenant, TenantSettings, TenantUser, User};
use platform_core::types::{SubscriptionTier, TenantStatus};

/// Atomically creates a tenant, its default settings row, and seeds the
/// owner's role-permission defaults in one transaction (spec §9 "atomic
/// bundled tenant initialization").
pub fn create_tenant(
    conn: &mut Connection,
    name: &str,
    api_key_hash: &str,
    tier: SubscriptionTier,
) -> Result<Tenant> {
    let now = Utc::now().to_rfc3339();
    let tenant = Tenant {
        id: Uuid::now_v7().to_string(),
        name: name.to_string(),
        status: TenantStatus::Trial,
        subscription_tier: tier,
        api_key_hash: api_key_hash.to_string(),
        whatsapp_phone_id: None,
        created_at: now.clone(),
        updated_at: now.clone(),
        deleted_at: None,
    };

    let tx = conn.transaction().map_err(TenancyError::DatabaseError)?;
    tx.execute(
        "INSERT INTO tenants (id, name, status, subscription_tier, api_key_hash,
            whatsapp_phone_id, created_at, updated_at, deleted_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,NULL)",
        params![
            tenant.id,
            tenant.name,
            tenant.status.to_string(),
            tenant.subscription_tier.to_string(),
            tenant.api_key_hash,
            tenant.whatsapp_phone_id,
            tenant.created_at,
            tenant.updated_at,
        ],
    )?;
    tx.execute(
        "INSERT INTO tenant_settings (tenant_id, consent_required, timezone)
         VALUES (?1, 1, 'UTC')",
        params![tenant.id],
    )?;
    seed_default_role_permissions(&tx)?;
    tx.commit().map_err(TenancyError::DatabaseError)?;

    Ok(tenant)
}

fn seed_default_role_permissions(conn: &Connection) -> Result<()> {
    use crate::types::Permission::*;
    let grants: &[(Role, &[crate::types::Permission])] = &[
        (
            Role::Owner,
            &[
                ManageTenantSettings,
                ManageUsers,
                ManageCampaigns,
                SendManualMessages,
                ViewConversations,
                ManageCatalog,
                ApproveWithdrawals,
                ViewBilling,
                ManageIntegrations,
            ],
        ),
        (
            Role::Manager,
            &[
                ManageCampaigns,
                SendManualMessages,
                ViewConversations,
                ManageCatalog,
                ApproveWithdrawals,
                ManageIntegrations,
            ],
        ),
        (Role::Agent, &[SendManualMessages, ViewConversations]),
        (Role::Viewer, &[ViewConversations]),
    ];

    for (role, allowed) in grants {
        for perm in [
            ManageTenantSettings,
            ManageUsers,
            ManageCampaigns,
            SendManualMessages,
            ViewConversations,
            ManageCatalog,
            ApproveWithdrawals,
            ViewBilling,
            ManageIntegrations,
        ] {
            let is_allowed = allowed.contains(&perm);
            conn.execute(
                "INSERT OR IGNORE INTO role_permissions (role, permission, allowed) VALUES (?1,?2,?3)",
                params![role.to_string(), perm.to_string(), is_allowed as i32],
            )?;
        }
    }
    Ok(())
}

pub fn get_tenant(conn: &Connection, tenant_id: &str) -> Result<Option<Tenant>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, status, subscription_tier, api_key_hash, whatsapp_phone_id,
                created_at, updated_at, deleted_at
         FROM tenants WHERE id = ?1 AND deleted_at IS NULL",
    )?;
    match stmt.query_row(params![tenant_id], crate::db::row_to_tenant) {
        Ok(t) => Ok(Some(t)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(TenancyError::DatabaseError(e)),
    }
}

pub fn get_tenant_by_api_key_hash(conn: &Connection, api_key_hash: &str) -> Result<Option<Tenant>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, status, subscription_tier, api_key_hash, whatsapp_phone_id,
                created_at, updated_at, deleted_at
         FROM tenants WHERE api_key_hash = ?1 AND deleted_at IS NULL",
    )?;
    match stmt.query_row(params![api_key_hash], crate::db::row_to_tenant) {
        Ok(t) => Ok(Some(t)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(TenancyError::DatabaseError(e)),
    }
}

pub fn get_tenant_settings(conn: &Connection, tenant_id: &str) -> Result<TenantSettings> {
    let mut stmt = conn.prepare(
        "SELECT tenant_id, quiet_hours_start_minute, quiet_hours_end_minute,
                harmonizer_window_secs, consent_required, timezone,
                fallback_message, handoff_message, webhook_secret
         FROM tenant_settings WHERE tenant_id = ?1",
    )?;
    match stmt.query_row(params![tenant_id], crate::db::row_to_settings) {
        Ok(s) => Ok(s),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(TenantSettings {
            tenant_id: tenant_id.to_string(),
            ..Default::default()
        }),
        Err(e) => Err(TenancyError::DatabaseError(e)),
    }
}

/// Upserts a tenant's settings row. Fields left `None` in `settings` fall
/// back to the column's existing stored value rather than clearing it —
/// callers read-modify-write via `get_tenant_settings` first.
pub fn upsert_tenant_settings(conn: &Connection, settings: &TenantSettings) -> Result<()> {
    conn.execute(
        "INSERT INTO tenant_settings
            (tenant_id, quiet_hours_start_minute, quiet_hours_end_minute,
             harmonizer_window_secs, consent_required, timezone,
             fallback_message, handoff_message, webhook_secret)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)
         ON CONFLICT(tenant_id) DO UPDATE SET
            quiet_hours_start_minute = excluded.quiet_hours_start_minute,
            quiet_hours_end_minute = excluded.quiet_hours_end_minute,
            harmonizer_window_secs = excluded.harmonizer_window_secs,
            consent_required = excluded.consent_required,
            timezone = excluded.timezone,
            fallback_message = excluded.fallback_message,
            handoff_message = excluded.handoff_message,
            webhook_secret = excluded.webhook_secret",
        params![
            settings.tenant_id,
            settings.quiet_hours_start_minute,
            settings.quiet_hours_end_minute,
            settings.harmonizer_window_secs,
            settings.consent_required as i32,
            settings.timezone,
            settings.fallback_message,
            settings.handoff_message,
            settings.webhook_secret,
        ],
    )?;
    Ok(())
}

/// Transitions a tenant's status, enforcing the allowed-transition graph.
pub fn transition_tenant_status(
    conn: &Connection,
    tenant_id: &str,
    next: TenantStatus,
) -> Result<()> {
    let tenant =
        get_tenant(conn, tenant_id)?.ok_or_else(|| TenancyError::TenantNotFound(tenant_id.to_string()))?;
    if !tenant.status.can_transition_to(next) {
        return Err(TenancyError::PermissionDenied(format!(
            "cannot transition tenant from {} to {next}",
            tenant.status
        )));
    }
    conn.execute(
        "UPDATE tenants SET status=?2, updated_at=?3 WHERE id=?1",
        params![tenant_id, next.to_string(), Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

pub fn create_user(conn: &Connection, email: &str, display_name: &str) -> Result<User> {
    let now = Utc::now().to_rfc3339();
    let user = User {
        id: Uuid::now_v7().to_string(),
        email: email.to_string(),
        display_name: display_name.to_string(),
        is_platform_operator: false,
        created_at: now.clone(),
        updated_at: now,
    };
    conn.execute(
        "INSERT INTO users (id, email, display_name, is_platform_operator, created_at, updated_at)
         VALUES (?1,?2,?3,?4,?5,?6)",
        params![
            user.id,
            user.email,
            user.display_name,
            user.is_platform_operator as i32,
            user.created_at,
            user.updated_at,
        ],
    )?;
    Ok(user)
}

pub fn get_user(conn: &Connection, user_id: &str) -> Result<Option<User>> {
    let mut stmt = conn.prepare(
        "SELECT id, email, display_name, is_platform_operator, created_at, updated_at
         FROM users WHERE id = ?1",
    )?;
    match stmt.query_row(params![user_id], crate::db::row_to_user) {
        Ok(u) => Ok(Some(u)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(TenancyError::DatabaseError(e)),
    }
}

pub fn add_tenant_user(
    conn: &Connection,
    tenant_id: &str,
    user_id: &str,
    role: Role,
) -> Result<TenantUser> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO tenant_users (tenant_id, user_id, role, created_at) VALUES (?1,?2,?3,?4)
         ON CONFLICT(tenant_id, user_id) DO UPDATE SET role=excluded.role",
        params![tenant_id, user_id, role.to_string(), now],
    )?;
    Ok(TenantUser {
        tenant_id: tenant_id.to_string(),
        user_id: user_id.to_string(),
        role,
        created_at: now,
    })
}

pub fn get_tenant_user(conn: &Connection, tenant_id: &str, user_id: &str) -> Result<Option<TenantUser>> {
    let mut stmt = conn.prepare(
        "SELECT tenant_id, user_id, role, created_at FROM tenant_users
         WHERE tenant_id = ?1 AND user_id = ?2",
    )?;
    match stmt.query_row(params![tenant_id, user_id], crate::db::row_to_tenant_user) {
        Ok(tu) => Ok(Some(tu)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(TenancyError::DatabaseError(e)),
    }
}

/// Number of staff accounts on a tenant, used by onboarding status to tell
/// whether the owner has invited anyone beyond themselves.
pub fn count_tenant_users(conn: &Connection, tenant_id: &str) -> Result<u32> {
    conn.query_row(
        "SELECT COUNT(*) FROM tenant_users WHERE tenant_id = ?1",
        params![tenant_id],
        |row| row.get(0),
    )
    .map_err(TenancyError::DatabaseError)
}

pub fn list_role_permissions(conn: &Connection, role: Role) -> Result<Vec<RolePermission>> {
    let mut stmt =
        conn.prepare("SELECT role, permission, allowed FROM role_permissions WHERE role = ?1")?;
    let rows = stmt
        .query_map(params![role.to_string()], |row| {
            let role = role; // fixed by query
            let permission: String = row.get(1)?;
            let allowed: i64 = row.get(2)?;
            Ok((role, permission, allowed != 0))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows
        .into_iter()
        .filter_map(|(role, perm, allowed)| {
            perm.parse().ok().map(|permission| RolePermission { role, permission, allowed })
        })
        .collect())
}
