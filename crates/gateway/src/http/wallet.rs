//! Wallet withdrawal routes — four-eyes approval (spec §4.1, §6, P4).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Extension;
use axum::Json;
use serde::Deserialize;
use tenancy::{Permission, TenantContext};

use crate::app::AppState;
use crate::auth::require_permission;
use crate::error::ApiResult;
use wallet::Withdrawal;

#[derive(Deserialize)]
pub struct InitiateWithdrawalRequest {
    pub amount_cents: i64,
    pub currency: String,
}

/// POST /v1/wallet/withdraw
pub async fn initiate_withdrawal(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<TenantContext>,
    Json(req): Json<InitiateWithdrawalRequest>,
) -> ApiResult<Json<Withdrawal>> {
    require_permission(&context, &state, Permission::ApproveWithdrawals)?;
    let withdrawal = state.wallet.initiate(context.tenant_id.as_str(), &context.user_id, req.amount_cents, &req.currency)?;
    Ok(Json(withdrawal))
}

/// POST /v1/wallet/withdrawals/{id}/approve
pub async fn approve_withdrawal(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<TenantContext>,
    Path(withdrawal_id): Path<String>,
) -> ApiResult<Json<Withdrawal>> {
    require_permission(&context, &state, Permission::ApproveWithdrawals)?;
    let withdrawal = state.wallet.approve(&withdrawal_id, &context.user_id)?;
    Ok(Json(withdrawal))
}
