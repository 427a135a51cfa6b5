//! Inbound webhook ingress — WhatsApp messages and payment-provider
//! callbacks. Each is signed per-tenant against `TenantSettings.webhook_secret`
//! (spec §4.2, §6); invalid signatures return 401 and never reach the
//! harmonizer or the checkout state machine.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{info, warn};

use crate::app::AppState;

type HmacSha256 = Hmac<Sha256>;

fn verify_signature(headers: &HeaderMap, body: &[u8], secret: &str) -> Result<(), String> {
    let sig_header = headers
        .get("x-hub-signature-256")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| "missing X-Hub-Signature-256 header".to_string())?;
    let sig_hex = sig_header.strip_prefix("sha256=").ok_or_else(|| "malformed signature header".to_string())?;
    let expected = hex::decode(sig_hex).map_err(|_| "signature is not valid hex".to_string())?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| "invalid HMAC key length".to_string())?;
    mac.update(body);
    mac.verify_slice(&expected).map_err(|_| "signature mismatch".to_string())
}

fn unauthorized(reason: &str) -> (StatusCode, Json<Value>) {
    warn!(reason, "webhook authentication failed");
    (StatusCode::UNAUTHORIZED, Json(json!({"error": {"code": "INVALID_TOKEN", "message": reason}})))
}

#[derive(Deserialize)]
pub struct WhatsAppInboundPayload {
    pub provider_message_id: String,
    pub from_e164: String,
    pub text: String,
    pub received_at: String,
}

/// POST /webhooks/whatsapp/{tenant_id}
pub async fn whatsapp_inbound(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let secret = {
        let conn = state.db.lock().unwrap();
        tenancy::identity::get_tenant_settings(&conn, &tenant_id).map_err(|_| unauthorized("unknown tenant"))?.webhook_secret
    };
    let secret = secret.ok_or_else(|| unauthorized("no webhook secret configured for tenant"))?;
    verify_signature(&headers, &body, &secret).map_err(|e| unauthorized(&e))?;

    let payload: WhatsAppInboundPayload = serde_json::from_slice(&body)
        .map_err(|e| (StatusCode::BAD_REQUEST, Json(json!({"error": {"code": "VALIDATION_FAILED", "message": e.to_string()}}))))?;

    let conversation_id = {
        let conn = state.db.lock().unwrap();
        let customer = match messaging::db::get_customer_by_phone(&conn, &tenant_id, &payload.from_e164).map_err(|e| {
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": {"code": "DATABASE_ERROR", "message": e.to_string()}})))
        })? {
            Some(c) => c,
            None => messaging::db::create_customer(&conn, &tenant_id, &payload.from_e164, None)
                .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": {"code": "DATABASE_ERROR", "message": e.to_string()}}))))?,
        };
        let conversation = match messaging::db::get_active_conversation(&conn, &tenant_id, &customer.id).map_err(|e| {
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": {"code": "DATABASE_ERROR", "message": e.to_string()}})))
        })? {
            Some(c) => c,
            None => messaging::db::create_conversation(&conn, &tenant_id, &customer.id)
                .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": {"code": "DATABASE_ERROR", "message": e.to_string()}}))))?,
        };
        conversation.id
    };

    let accepted = state
        .harmonizer
        .accept(&conversation_id, &payload.provider_message_id, &payload.text, &payload.received_at)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": {"code": "INTERNAL_ERROR", "message": e.to_string()}}))))?;

    if !accepted {
        info!(provider_message_id = %payload.provider_message_id, "duplicate webhook delivery, dropped");
        return Ok(Json(json!({"ok": true, "duplicate": true})));
    }

    // The harmonizer's debounce window flushes asynchronously; a dedicated
    // worker (spawned in `AppState::new`) drains the resulting bursts and
    // drives the orchestrator, so this handler's job ends at acceptance.
    Ok(Json(json!({"ok": true})))
}

#[derive(Deserialize)]
pub struct PaymentCallbackPayload {
    pub order_id: String,
    pub status: String,
    pub provider_reference: Option<String>,
}

/// POST /webhooks/payments/{tenant_id}
pub async fn payment_callback(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let secret = {
        let conn = state.db.lock().unwrap();
        tenancy::identity::get_tenant_settings(&conn, &tenant_id).map_err(|_| unauthorized("unknown tenant"))?.webhook_secret
    };
    let secret = secret.ok_or_else(|| unauthorized("no webhook secret configured for tenant"))?;
    verify_signature(&headers, &body, &secret).map_err(|e| unauthorized(&e))?;

    let payload: PaymentCallbackPayload = serde_json::from_slice(&body)
        .map_err(|e| (StatusCode::BAD_REQUEST, Json(json!({"error": {"code": "VALIDATION_FAILED", "message": e.to_string()}}))))?;

    info!(order_id = %payload.order_id, status = %payload.status, "payment callback received");

    let internal_error = |e: String| (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": {"code": "DATABASE_ERROR", "message": e}})));

    let (order, payment_request, session) = {
        let conn = state.db.lock().unwrap();
        let order = checkout::db::get_order(&conn, &payload.order_id)
            .map_err(|e| internal_error(e.to_string()))?
            .ok_or_else(|| (StatusCode::NOT_FOUND, Json(json!({"error": {"code": "NOT_FOUND", "message": "unknown order"}}))))?;
        if order.tenant_id != tenant_id {
            return Err(unauthorized("order does not belong to this tenant"));
        }
        let payment_request = checkout::db::get_payment_request_by_order_id(&conn, &order.id)
            .map_err(|e| internal_error(e.to_string()))?
            .ok_or_else(|| (StatusCode::NOT_FOUND, Json(json!({"error": {"code": "NOT_FOUND", "message": "no payment request for order"}}))))?;
        let session = checkout::db::get_session(&conn, &order.checkout_session_id)
            .map_err(|e| internal_error(e.to_string()))?
            .ok_or_else(|| (StatusCode::NOT_FOUND, Json(json!({"error": {"code": "NOT_FOUND", "message": "unknown checkout session"}}))))?;
        (order, payment_request, session)
    };

    let result = match payload.status.as_str() {
        "succeeded" | "paid" => state.checkout.mark_paid(&session, &order, &payment_request),
        _ => state.checkout.mark_failed(&session, &order, &payment_request),
    };
    result.map_err(|e| internal_error(e.to_string()))?;

    Ok(Json(json!({"ok": true})))
}
