//! Manual-send, scheduling, listing and handoff routes — tenant-scoped (spec §6).

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Extension;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tenancy::{Permission, TenantContext};

use crate::app::AppState;
use crate::auth::require_permission;
use crate::error::{ApiError, ApiResult};
use crate::pagination::{Page, PageQuery};
use messaging::{Conversation, DispatchOutcome, DispatchRequest};
use platform_core::types::MessageType;

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub conversation_id: String,
    pub customer_id: String,
    pub content: String,
}

#[derive(Serialize)]
pub struct SendMessageResponse {
    pub status: String,
    pub reason: Option<String>,
}

/// POST /v1/messages/send
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<TenantContext>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<Json<SendMessageResponse>> {
    require_permission(&context, &state, Permission::SendManualMessages)?;

    let customer = {
        let conn = state.db.lock().unwrap();
        messaging::db::get_customer(&conn, context.tenant_id.as_str(), &req.customer_id)?
            .ok_or_else(|| ApiError(platform_core::error::PlatformError::NotFound(req.customer_id.clone())))?
    };

    let (tier, quiet_hours) = state.tenant_lookup().resolve(context.tenant_id.as_str()).unwrap_or((platform_core::types::SubscriptionTier::Starter, None));

    let dispatch_req = DispatchRequest {
        tenant_id: context.tenant_id.as_str(),
        conversation_id: &req.conversation_id,
        customer: &customer,
        message_type: MessageType::ManualOutbound,
        content: req.content,
        minute_of_day: current_minute_of_day(),
    };

    let outcome = state.dispatcher.dispatch(dispatch_req, tier, quiet_hours).await?;
    Ok(Json(match outcome {
        DispatchOutcome::Sent(_) => SendMessageResponse { status: "sent".to_string(), reason: None },
        DispatchOutcome::Deferred { reason, .. } => SendMessageResponse { status: "deferred".to_string(), reason: Some(reason) },
    }))
}

/// POST /v1/messages/conversations/{id}/handoff
pub async fn handoff(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<TenantContext>,
    Path(conversation_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    require_permission(&context, &state, Permission::ViewConversations)?;

    let conn = state.db.lock().unwrap();
    messaging::db::set_conversation_status(&conn, context.tenant_id.as_str(), &conversation_id, messaging::ConversationStatus::Handoff)?;
    Ok(Json(serde_json::json!({"ok": true})))
}

#[derive(Deserialize)]
pub struct ScheduleMessageRequest {
    pub conversation_id: String,
    pub customer_id: String,
    pub kind: ScheduleKind,
    pub appointment_time: Option<DateTime<Utc>>,
    pub at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    AppointmentReminder,
    ReEngagement,
}

/// POST /v1/messages/schedule
pub async fn schedule_message(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<TenantContext>,
    Json(req): Json<ScheduleMessageRequest>,
) -> ApiResult<Json<Vec<scheduler::ScheduledMessage>>> {
    require_permission(&context, &state, Permission::SendManualMessages)?;

    let conn = state.db.lock().unwrap();
    let scheduled = match req.kind {
        ScheduleKind::AppointmentReminder => {
            let appointment_time = req.appointment_time.ok_or_else(|| {
                ApiError(platform_core::error::PlatformError::ValidationFailed("appointment_time is required".to_string()))
            })?;
            scheduler::schedule_appointment_reminders(
                &conn,
                context.tenant_id.as_str(),
                &req.conversation_id,
                &req.customer_id,
                appointment_time,
            )?
        }
        ScheduleKind::ReEngagement => {
            let at = req
                .at
                .ok_or_else(|| ApiError(platform_core::error::PlatformError::ValidationFailed("at is required".to_string())))?;
            vec![scheduler::schedule_re_engagement(&conn, context.tenant_id.as_str(), &req.conversation_id, &req.customer_id, at)?]
        }
    };
    Ok(Json(scheduled))
}

#[derive(Serialize)]
pub struct RateLimitStatus {
    pub current_count: u32,
    pub daily_limit: u32,
    pub remaining: u32,
    pub percentage_used: f64,
    pub warning_threshold_reached: bool,
}

/// GET /v1/messages/rate-limit-status
pub async fn rate_limit_status(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<TenantContext>,
) -> ApiResult<Json<RateLimitStatus>> {
    require_permission(&context, &state, Permission::ViewConversations)?;

    let (tier, _) = state
        .tenant_lookup()
        .resolve(context.tenant_id.as_str())
        .unwrap_or((platform_core::types::SubscriptionTier::Starter, None));
    let daily_limit = tier.daily_message_quota();
    let current_count = {
        let conn = state.db.lock().unwrap();
        messaging::db::count_outbound_last_24h(&conn, context.tenant_id.as_str())?
    };
    let percentage_used = if daily_limit == 0 { 0.0 } else { (current_count as f64 / daily_limit as f64) * 100.0 };

    Ok(Json(RateLimitStatus {
        current_count,
        daily_limit,
        remaining: daily_limit.saturating_sub(current_count),
        percentage_used,
        warning_threshold_reached: percentage_used >= 80.0,
    }))
}

/// GET /v1/messages/conversations
pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<TenantContext>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Page<Conversation>>> {
    require_permission(&context, &state, Permission::ViewConversations)?;

    let conn = state.db.lock().unwrap();
    let (limit, offset) = query.limit_offset();
    let results = messaging::db::list_conversations(&conn, context.tenant_id.as_str(), limit, offset)?;
    let count = messaging::db::count_conversations(&conn, context.tenant_id.as_str())?;
    Ok(Json(Page::new(results, count, &query)))
}

fn current_minute_of_day() -> u16 {
    use chrono::Timelike;
    let now = chrono::Utc::now();
    (now.hour() * 60 + now.minute()) as u16
}
