//! Message template listing and upsert (spec §6). `{{name}}` token validation
//! happens at render time inside `MessagingDispatcher`/`CampaignEngine`, not here.

use std::sync::Arc;

use axum::extract::State;
use axum::Extension;
use axum::Json;
use serde::Deserialize;
use tenancy::{Permission, TenantContext};

use crate::app::AppState;
use crate::auth::require_permission;
use crate::error::ApiResult;
use messaging::MessageTemplate;

/// GET /v1/templates
pub async fn list_templates(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<TenantContext>,
) -> ApiResult<Json<Vec<MessageTemplate>>> {
    require_permission(&context, &state, Permission::ManageCatalog)?;
    let conn = state.db.lock().unwrap();
    let templates = messaging::db::list_templates(&conn, context.tenant_id.as_str())?;
    Ok(Json(templates))
}

#[derive(Deserialize)]
pub struct UpsertTemplateRequest {
    pub name: String,
    pub content: String,
}

/// POST /v1/templates
pub async fn upsert_template(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<TenantContext>,
    Json(req): Json<UpsertTemplateRequest>,
) -> ApiResult<Json<MessageTemplate>> {
    require_permission(&context, &state, Permission::ManageCatalog)?;
    let conn = state.db.lock().unwrap();
    let template = messaging::db::upsert_template(&conn, context.tenant_id.as_str(), &req.name, &req.content)?;
    Ok(Json(template))
}
