//! Platform-operator routes — tenant creation and cross-tenant listing.
//! No tenant to scope an api key against exists yet here, so these bypass
//! `resolve_tenant_context` and authenticate the caller directly via
//! `auth::require_platform_operator` (spec §4.1, §9 "atomic bundled tenant
//! initialization").

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tenancy::Role;

use crate::app::AppState;
use crate::auth::require_platform_operator;
use crate::error::{ApiError, ApiResult};
use platform_core::types::SubscriptionTier;

#[derive(Deserialize)]
pub struct CreateTenantRequest {
    pub name: String,
    #[serde(default = "default_tier")]
    pub subscription_tier: SubscriptionTier,
    pub owner_email: String,
    pub owner_display_name: String,
}

fn default_tier() -> SubscriptionTier {
    SubscriptionTier::Starter
}

#[derive(Serialize)]
pub struct CreateTenantResponse {
    pub tenant: tenancy::Tenant,
    /// Returned once, in plaintext — only `api_key_hash` is ever persisted.
    pub api_key: String,
}

fn generate_api_key() -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(48).map(char::from).collect()
}

/// POST /v1/platform/tenants
pub async fn create_tenant(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateTenantRequest>,
) -> ApiResult<Json<CreateTenantResponse>> {
    require_platform_operator(&headers, &state)?;

    let api_key = generate_api_key();
    let api_key_hash = tenancy::TenantResolver::hash_api_key(&api_key);

    let mut conn = state.db.lock().unwrap();
    let tenant = tenancy::identity::create_tenant(&mut conn, &req.name, &api_key_hash, req.subscription_tier)
        .map_err(|e| ApiError(e.into()))?;

    let owner = tenancy::identity::create_user(&conn, &req.owner_email, &req.owner_display_name).map_err(|e| ApiError(e.into()))?;
    tenancy::identity::add_tenant_user(&conn, &tenant.id, &owner.id, Role::Owner).map_err(|e| ApiError(e.into()))?;

    Ok(Json(CreateTenantResponse { tenant, api_key }))
}
