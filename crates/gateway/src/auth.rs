//! Tenant-context resolution and RBAC enforcement (spec §4.1, §6).
//!
//! Three header shapes reach this middleware: platform-operator requests
//! carry only `Authorization`; tenant-scoped requests additionally carry
//! `X-TENANT-ID` and `X-TENANT-API-KEY`. No JWT/session-token crate sits in
//! this stack, so the bearer token itself is treated as an opaque user id,
//! looked up directly via `tenancy::identity::get_user` — see DESIGN.md.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use platform_core::error::PlatformError;
use tenancy::{Permission, TenantContext};

use crate::app::AppState;
use crate::error::ApiError;

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn bearer_user_id(headers: &HeaderMap) -> Result<&str, PlatformError> {
    header_str(headers, "authorization")
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
        .ok_or(PlatformError::AuthenticationRequired)
}

/// Resolves `TenantContext` from `Authorization` + `X-TENANT-ID` +
/// `X-TENANT-API-KEY` and inserts it as a request extension. Platform
/// operator requests (no tenant headers, operator user id) resolve via the
/// bypass already implemented in `TenantResolver::resolve`.
pub async fn resolve_tenant_context(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let headers = request.headers().clone();
    let user_id = bearer_user_id(&headers).map_err(ApiError)?;

    let api_key = header_str(&headers, "x-tenant-api-key").unwrap_or_default();
    let context = state.tenants.resolve(api_key, user_id).map_err(|e| ApiError(e.into()))?;

    if let Some(expected) = header_str(&headers, "x-tenant-id") {
        if expected != context.tenant_id.as_str() {
            return Err(ApiError(PlatformError::TenantAccessDenied {
                reason: "X-TENANT-ID does not match the resolved tenant".to_string(),
            }));
        }
    }

    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

/// Resolves a platform-operator caller directly from `Authorization`,
/// bypassing `resolve_tenant_context` entirely — platform routes (tenant
/// creation, cross-tenant listing) have no tenant to scope an api key
/// against in the first place.
pub fn require_platform_operator(headers: &HeaderMap, state: &AppState) -> Result<String, ApiError> {
    let user_id = bearer_user_id(headers).map_err(ApiError)?;
    let conn = state.db.lock().unwrap();
    let user = tenancy::identity::get_user(&conn, user_id)
        .map_err(|e| ApiError(e.into()))?
        .ok_or(PlatformError::AuthenticationRequired)?;
    if user.is_platform_operator {
        Ok(user.id)
    } else {
        Err(ApiError(PlatformError::InsufficientPermissions { permission: "platform_operator".to_string() }))
    }
}

/// Enforces that the request's resolved `TenantContext` carries `permission`.
/// Platform operators bypass every check (already encoded in
/// `PermissionResolver::check`, re-applied here as a fast path).
pub fn require_permission(context: &TenantContext, state: &AppState, permission: Permission) -> Result<(), ApiError> {
    if context.is_platform_operator {
        return Ok(());
    }
    let conn = state.db.lock().unwrap();
    let check = tenancy::permissions::PermissionResolver::check(&conn, context.tenant_id.as_str(), &context.user_id, permission)
        .map_err(|e| ApiError(e.into()))?;
    match check {
        tenancy::permissions::PermissionCheck::Allowed => Ok(()),
        tenancy::permissions::PermissionCheck::Denied { .. } => {
            Err(ApiError(PlatformError::InsufficientPermissions { permission: permission.to_string() }))
        }
    }
}
