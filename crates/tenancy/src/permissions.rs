use rusqlite::{params, Connection};

use crate::error::Result;
use crate::identity::{get_tenant_user, get_user};
use crate::types::Permission;

/// Result of a permission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionCheck {
    Allowed,
    Denied { reason: String },
}

/// Evaluates RBAC grants for a (tenant, user, permission) triple.
///
/// Precedence, highest to lowest:
///   1. Platform operator — bypasses every check.
///   2. `UserPermission` override for this (tenant, user, permission).
///   3. `RolePermission` default for the membership's role.
///   4. No row at any level — deny.
/// At levels 2 and 3, an explicit `allowed = false` always wins over an
/// explicit `allowed = true` recorded at the same level (deny-overrides-allow);
/// this only matters if a future migration allows multiple rows per key, but
/// the check is written against that invariant rather than the current
/// single-row-per-key schema so it keeps holding if that changes.
pub struct PermissionResolver;

impl PermissionResolver {
    pub fn check(
        conn: &Connection,
        tenant_id: &str,
        user_id: &str,
        permission: Permission,
    ) -> Result<PermissionCheck> {
        if let Some(user) = get_user(conn, user_id)? {
            if user.is_platform_operator {
                return Ok(PermissionCheck::Allowed);
            }
        }

        let overrides = user_permission_overrides(conn, tenant_id, user_id, permission)?;
        if overrides.iter().any(|allowed| !allowed) {
            return Ok(PermissionCheck::Denied {
                reason: format!("{permission} explicitly denied for this user"),
            });
        }
        if overrides.iter().any(|allowed| *allowed) {
            return Ok(PermissionCheck::Allowed);
        }

        let membership = get_tenant_user(conn, tenant_id, user_id)?;
        let Some(membership) = membership else {
            return Ok(PermissionCheck::Denied {
                reason: "no tenant membership".to_string(),
            });
        };

        let role_allowed = role_permission_allowed(conn, membership.role, permission)?;
        if role_allowed {
            Ok(PermissionCheck::Allowed)
        } else {
            Ok(PermissionCheck::Denied {
                reason: format!("role {} lacks {permission}", membership.role),
            })
        }
    }

    /// Enforces the four-eyes constraint: the user approving an action may
    /// not be the same user who requested it.
    pub fn check_four_eyes(requested_by: &str, approved_by: &str) -> PermissionCheck {
        if requested_by == approved_by {
            PermissionCheck::Denied {
                reason: "approver cannot be the requester".to_string(),
            }
        } else {
            PermissionCheck::Allowed
        }
    }
}

fn user_permission_overrides(
    conn: &Connection,
    tenant_id: &str,
    user_id: &str,
    permission: Permission,
) -> Result<Vec<bool>> {
    let mut stmt = conn.prepare(
        "SELECT allowed FROM user_permissions
         WHERE tenant_id = ?1 AND user_id = ?2 AND permission = ?3",
    )?;
    let rows = stmt
        .query_map(params![tenant_id, user_id, permission.to_string()], |row| {
            Ok(row.get::<_, i64>(0)? != 0)
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn role_permission_allowed(
    conn: &Connection,
    role: crate::types::Role,
    permission: Permission,
) -> Result<bool> {
    let mut stmt = conn.prepare(
        "SELECT allowed FROM role_permissions WHERE role = ?1 AND permission = ?2",
    )?;
    match stmt.query_row(params![role.to_string(), permission.to_string()], |row| {
        row.get::<_, i64>(0)
    }) {
        Ok(v) => Ok(v != 0),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_eyes_rejects_self_approval() {
        let check = PermissionResolver::check_four_eyes("u1", "u1");
        assert_eq!(
            check,
            PermissionCheck::Denied { reason: "approver cannot be the requester".to_string() }
        );
    }

    #[test]
    fn four_eyes_allows_distinct_approver() {
        assert_eq!(PermissionResolver::check_four_eyes("u1", "u2"), PermissionCheck::Allowed);
    }
}
