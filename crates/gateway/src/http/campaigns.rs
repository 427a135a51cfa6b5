//! Campaign creation, execution and reporting (spec §4.10, §6).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Extension;
use axum::Json;
use serde::Deserialize;
use tenancy::{Permission, TenantContext};

use crate::app::AppState;
use crate::auth::require_permission;
use crate::error::ApiResult;
use campaigns::{Campaign, CampaignReport, CampaignVariant, ExecutionSummary, TargetingCriteria, DEFAULT_CONFIDENCE_LEVEL};

#[derive(Deserialize)]
pub struct CreateCampaignRequest {
    pub name: String,
    #[serde(default)]
    pub criteria: TargetingCriteria,
    pub variants: Vec<CampaignVariant>,
    #[serde(default)]
    pub is_ab_test: bool,
}

/// POST /v1/campaigns
pub async fn create_campaign(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<TenantContext>,
    Json(req): Json<CreateCampaignRequest>,
) -> ApiResult<Json<Campaign>> {
    require_permission(&context, &state, Permission::ManageCampaigns)?;

    let (tier, _quiet_hours) = state
        .tenant_lookup()
        .resolve(context.tenant_id.as_str())
        .unwrap_or((platform_core::types::SubscriptionTier::Starter, None));

    let campaign = state.campaigns.create_campaign(
        context.tenant_id.as_str(),
        &req.name,
        req.criteria,
        req.variants,
        req.is_ab_test,
        tier,
    )?;
    Ok(Json(campaign))
}

/// POST /v1/campaigns/{id}/execute
pub async fn execute_campaign(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<TenantContext>,
    Path(campaign_id): Path<String>,
) -> ApiResult<Json<ExecutionSummary>> {
    require_permission(&context, &state, Permission::ManageCampaigns)?;

    let (tier, quiet_hours) = state
        .tenant_lookup()
        .resolve(context.tenant_id.as_str())
        .unwrap_or((platform_core::types::SubscriptionTier::Starter, None));

    let summary = state
        .campaigns
        .execute(&campaign_id, tier, quiet_hours, current_minute_of_day())
        .await?;
    Ok(Json(summary))
}

#[derive(Deserialize)]
pub struct ReportQuery {
    pub confidence_level: Option<f64>,
}

/// GET /v1/campaigns/{id}/report
pub async fn report(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<TenantContext>,
    Path(campaign_id): Path<String>,
    axum::extract::Query(query): axum::extract::Query<ReportQuery>,
) -> ApiResult<Json<CampaignReport>> {
    require_permission(&context, &state, Permission::ViewBilling)?;

    let confidence_level = query.confidence_level.unwrap_or(DEFAULT_CONFIDENCE_LEVEL);
    let report = state.campaigns.report(&campaign_id, confidence_level)?;
    Ok(Json(report))
}

fn current_minute_of_day() -> u16 {
    use chrono::Timelike;
    let now = chrono::Utc::now();
    (now.hour() * 60 + now.minute()) as u16
}
