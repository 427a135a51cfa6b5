//! Tenant settings read/update — quiet hours, timezone, webhook secret,
//! integration credentials, onboarding status (spec §6, §4.1).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Extension;
use axum::Json;
use platform_core::error::PlatformError;
use serde::{Deserialize, Serialize};
use tenancy::{IntegrationCredentialView, IntegrationProvider, OnboardingStatus, OnboardingStep, Permission, TenantContext, TenantSettings};

use crate::app::AppState;
use crate::auth::require_permission;
use crate::error::ApiResult;

/// GET /v1/tenant/settings
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<TenantContext>,
) -> ApiResult<Json<TenantSettings>> {
    require_permission(&context, &state, Permission::ManageTenantSettings)?;
    let conn = state.db.lock().unwrap();
    let settings = tenancy::identity::get_tenant_settings(&conn, context.tenant_id.as_str())?;
    Ok(Json(settings))
}

#[derive(Deserialize)]
pub struct UpdateSettingsRequest {
    pub quiet_hours_start_minute: Option<u16>,
    pub quiet_hours_end_minute: Option<u16>,
    pub harmonizer_window_secs: Option<u64>,
    pub consent_required: Option<bool>,
    pub timezone: Option<String>,
    pub fallback_message: Option<String>,
    pub handoff_message: Option<String>,
    pub webhook_secret: Option<String>,
}

/// PATCH /v1/tenant/settings
///
/// Read-modify-write: unset fields in the request keep their current stored
/// value rather than being cleared (mirrors `upsert_tenant_settings`'s contract).
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<TenantContext>,
    Json(req): Json<UpdateSettingsRequest>,
) -> ApiResult<Json<TenantSettings>> {
    require_permission(&context, &state, Permission::ManageTenantSettings)?;

    let conn = state.db.lock().unwrap();
    let mut settings = tenancy::identity::get_tenant_settings(&conn, context.tenant_id.as_str())?;
    if req.quiet_hours_start_minute.is_some() {
        settings.quiet_hours_start_minute = req.quiet_hours_start_minute;
    }
    if req.quiet_hours_end_minute.is_some() {
        settings.quiet_hours_end_minute = req.quiet_hours_end_minute;
    }
    if req.harmonizer_window_secs.is_some() {
        settings.harmonizer_window_secs = req.harmonizer_window_secs;
    }
    if let Some(consent_required) = req.consent_required {
        settings.consent_required = consent_required;
    }
    if let Some(timezone) = req.timezone {
        settings.timezone = timezone;
    }
    if req.fallback_message.is_some() {
        settings.fallback_message = req.fallback_message;
    }
    if req.handoff_message.is_some() {
        settings.handoff_message = req.handoff_message;
    }
    if req.webhook_secret.is_some() {
        settings.webhook_secret = req.webhook_secret;
    }

    tenancy::identity::upsert_tenant_settings(&conn, &settings)?;
    Ok(Json(settings))
}

#[derive(Deserialize)]
pub struct PutIntegrationRequest {
    pub credential: String,
}

/// PUT /v1/settings/integrations/{provider}
///
/// Stores the credential encrypted (`tenancy::crypto`) and returns only its
/// masked view — the plaintext in the request body is never echoed back.
pub async fn put_integration(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<TenantContext>,
    Path(provider): Path<String>,
    Json(req): Json<PutIntegrationRequest>,
) -> ApiResult<Json<IntegrationCredentialView>> {
    require_permission(&context, &state, Permission::ManageIntegrations)?;

    let provider: IntegrationProvider = provider
        .parse()
        .map_err(|_| PlatformError::ValidationFailed(format!("unknown integration provider: {provider}")))?;
    if req.credential.trim().is_empty() {
        return Err(PlatformError::ValidationFailed("credential must not be empty".to_string()).into());
    }

    let conn = state.db.lock().unwrap();
    let view = tenancy::integrations::upsert_integration_credential(
        &conn,
        &state.config.security.credential_encryption_key,
        context.tenant_id.as_str(),
        provider,
        &req.credential,
    )?;
    Ok(Json(view))
}

#[derive(Serialize)]
pub struct OnboardingResponse {
    pub steps: Vec<OnboardingStatus>,
    pub complete: bool,
}

/// GET /v1/settings/onboarding
///
/// Every step's completion is derived from live state (catalog rows,
/// configured integrations, team size) rather than tracked as a separate
/// flag that could drift from what actually happened.
pub async fn get_onboarding(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<TenantContext>,
) -> ApiResult<Json<OnboardingResponse>> {
    require_permission(&context, &state, Permission::ManageTenantSettings)?;
    let tenant_id = context.tenant_id.as_str();

    let whatsapp_connected = {
        let conn = state.db.lock().unwrap();
        let has_phone_id = tenancy::identity::get_tenant(&conn, tenant_id)?
            .and_then(|t| t.whatsapp_phone_id)
            .is_some();
        has_phone_id || tenancy::integrations::has_integration(&conn, tenant_id, IntegrationProvider::Whatsapp)?
    };
    let catalog_imported = state.grounding.count_items(tenant_id)? > 0;
    let payments_connected = {
        let conn = state.db.lock().unwrap();
        tenancy::integrations::has_integration(&conn, tenant_id, IntegrationProvider::Stripe)?
    };
    let team_invited = {
        let conn = state.db.lock().unwrap();
        tenancy::identity::count_tenant_users(&conn, tenant_id)? > 1
    };

    let completed = |step: OnboardingStep| match step {
        OnboardingStep::ConnectWhatsapp => whatsapp_connected,
        OnboardingStep::ImportCatalog => catalog_imported,
        OnboardingStep::ConnectPayments => payments_connected,
        OnboardingStep::InviteTeam => team_invited,
    };

    let steps: Vec<OnboardingStatus> = OnboardingStep::ALL
        .into_iter()
        .map(|step| OnboardingStatus { step, completed: completed(step) })
        .collect();
    let complete = steps.iter().all(|s| s.completed);

    Ok(Json(OnboardingResponse { steps, complete }))
}
