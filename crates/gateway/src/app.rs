use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use platform_core::config::PlatformConfig;
use platform_core::types::{QuietHours, SubscriptionTier};
use rusqlite::Connection;
use tenancy::TenantResolver;

use campaigns::CampaignEngine;
use checkout::CheckoutMachine;
use grounding::GroundingValidator;
use llm::{AnthropicProvider, HealthTracker, OpenAiProvider, ProviderRouter, ProviderSlot};
use messaging::{MessagingDispatcher, WhatsAppCloudApiProvider};
use orchestrator::Orchestrator;
use reference_ctx::ReferenceContextManager;
use scheduler::TenantLookup;
use wallet::WalletManager;

use crate::payment::HttpPaymentProvider;

/// Resolves a tenant's dispatch-relevant facts (tier, quiet hours) for the
/// scheduler worker without coupling `scheduler` to a concrete storage
/// layer (mirrors `scheduler::engine::TenantLookup`'s own doc comment).
pub struct DbTenantLookup {
    db: Arc<std::sync::Mutex<Connection>>,
}

impl TenantLookup for DbTenantLookup {
    fn resolve(&self, tenant_id: &str) -> Option<(SubscriptionTier, Option<QuietHours>)> {
        let conn = self.db.lock().unwrap();
        let tenant = tenancy::identity::get_tenant(&conn, tenant_id).ok().flatten()?;
        let settings = tenancy::identity::get_tenant_settings(&conn, tenant_id).ok()?;
        let quiet_hours = match (settings.quiet_hours_start_minute, settings.quiet_hours_end_minute) {
            (Some(start), Some(end)) => Some(QuietHours { start_minute: start, end_minute: end }),
            _ => None,
        };
        Some((tenant.subscription_tier, quiet_hours))
    }
}

/// Central shared state — passed as `Arc<AppState>` to every Axum handler.
pub struct AppState {
    pub config: PlatformConfig,
    pub db: Arc<std::sync::Mutex<Connection>>,
    pub tenants: Arc<TenantResolver>,
    pub harmonizer: Arc<harmonizer::BurstHarmonizer>,
    pub reference_ctx: Arc<ReferenceContextManager>,
    pub grounding: Arc<GroundingValidator>,
    pub dispatcher: Arc<MessagingDispatcher>,
    pub checkout: Arc<CheckoutMachine>,
    pub campaigns: Arc<CampaignEngine>,
    pub wallet: Arc<WalletManager>,
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    /// Wires every domain crate's manager against one shared writer
    /// connection, following `persistence::bootstrap`'s schema-init order.
    /// `GroundingValidator` is the one exception — it owns its own
    /// connection to the same database file (see DESIGN.md).
    pub fn new(config: PlatformConfig, db: Arc<std::sync::Mutex<Connection>>) -> anyhow::Result<Self> {
        let tenants = Arc::new(TenantResolver::new(db.clone()));

        let harmonizer_window = config.harmonizer.clamped_window_secs();
        let (harmonizer, flushed_rx) = harmonizer::BurstHarmonizer::new(db.clone(), harmonizer_window);
        let harmonizer = Arc::new(harmonizer);

        let reference_ctx = Arc::new(ReferenceContextManager::new(db.clone()));

        let grounding_conn = Connection::open(&config.database.path)?;
        let grounding = Arc::new(GroundingValidator::new(grounding_conn));

        let telephony: Arc<dyn messaging::TelephonyCapability> =
            Arc::new(WhatsAppCloudApiProvider::new(String::new(), String::new()));
        let dispatcher = Arc::new(MessagingDispatcher::new(db.clone(), telephony));

        let checkout = Arc::new(CheckoutMachine::new(db.clone())?);
        let campaigns = Arc::new(CampaignEngine::new(db.clone(), dispatcher.clone())?);
        let wallet = Arc::new(WalletManager::new(db.clone())?);

        let health = HealthTracker::new();
        let mut slots = Vec::new();
        if let Some(key) = &config.llm.anthropic_api_key {
            slots.push(ProviderSlot::new(Box::new(AnthropicProvider::new(key.clone(), None)), 2));
        }
        if let Some(key) = &config.llm.openai_api_key {
            slots.push(ProviderSlot::new(Box::new(OpenAiProvider::new(key.clone(), None)), 2));
        }
        if slots.is_empty() {
            slots.push(ProviderSlot::new(Box::new(AnthropicProvider::new(String::new(), None)), 0));
        }
        let router = Arc::new(ProviderRouter::new(slots, health));

        let payment: Arc<dyn checkout::PaymentCapability> = Arc::new(HttpPaymentProvider::new(None));

        let orchestrator = Arc::new(Orchestrator::new(
            db.clone(),
            reference_ctx.clone(),
            grounding.clone(),
            router,
            dispatcher.clone(),
            checkout.clone(),
            payment,
        )?);

        spawn_harmonizer_flush_worker(db.clone(), orchestrator.clone(), flushed_rx);

        Ok(Self { config, db, tenants, harmonizer, reference_ctx, grounding, dispatcher, checkout, campaigns, wallet, orchestrator })
    }

    pub fn tenant_lookup(&self) -> Arc<dyn TenantLookup> {
        Arc::new(DbTenantLookup { db: self.db.clone() })
    }
}

/// Drains flushed bursts and drives each one through the orchestrator as a
/// single customer turn (spec §4.2). Runs for the lifetime of the process;
/// the sender half dies with the last `BurstHarmonizer` clone, which ends
/// the loop on shutdown.
fn spawn_harmonizer_flush_worker(
    db: Arc<std::sync::Mutex<Connection>>,
    orchestrator: Arc<Orchestrator>,
    mut flushed_rx: tokio::sync::mpsc::Receiver<harmonizer::HarmonizedBurst>,
) {
    tokio::spawn(async move {
        while let Some(burst) = flushed_rx.recv().await {
            let conversation = {
                let conn = db.lock().unwrap();
                match messaging::db::get_conversation_by_id(&conn, &burst.conversation_id) {
                    Ok(Some(c)) => c,
                    Ok(None) => {
                        tracing::warn!(conversation_id = %burst.conversation_id, "flushed burst for unknown conversation, dropped");
                        continue;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to load conversation for flushed burst");
                        continue;
                    }
                }
            };
            let customer = {
                let conn = db.lock().unwrap();
                match messaging::db::get_customer(&conn, &conversation.tenant_id, &conversation.customer_id) {
                    Ok(Some(c)) => c,
                    Ok(None) => {
                        tracing::warn!(customer_id = %conversation.customer_id, "flushed burst for unknown customer, dropped");
                        continue;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to load customer for flushed burst");
                        continue;
                    }
                }
            };
            let (tier, quiet_hours) = {
                let conn = db.lock().unwrap();
                let tenant = tenancy::identity::get_tenant(&conn, &conversation.tenant_id).ok().flatten();
                let settings = tenancy::identity::get_tenant_settings(&conn, &conversation.tenant_id).ok();
                let tier = tenant.map(|t| t.subscription_tier).unwrap_or(SubscriptionTier::Starter);
                let quiet_hours = settings.and_then(|s| match (s.quiet_hours_start_minute, s.quiet_hours_end_minute) {
                    (Some(start), Some(end)) => Some(QuietHours { start_minute: start, end_minute: end }),
                    _ => None,
                });
                (tier, quiet_hours)
            };

            let persona = llm::TenantPersona {
                business_name: conversation.tenant_id.clone(),
                tone_notes: None,
                allowed_capabilities: Vec::new(),
                disallowed_capabilities: Vec::new(),
            };
            let combined_text = burst.combined_text();
            let turn = orchestrator::TurnRequest {
                tenant_id: &conversation.tenant_id,
                conversation_id: &conversation.id,
                customer: &customer,
                persona: &persona,
                utterance: &combined_text,
                tier,
                quiet_hours,
                minute_of_day: current_minute_of_day(),
            };
            if let Err(e) = orchestrator.process_turn(turn).await {
                tracing::error!(conversation_id = %conversation.id, error = %e, "orchestrator turn failed for flushed burst");
            }
        }
    });
}

fn current_minute_of_day() -> u16 {
    use chrono::Timelike;
    let now = chrono::Utc::now();
    (now.hour() * 60 + now.minute()) as u16
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let scoped = Router::new()
        .route("/v1/messages/send", post(crate::http::messaging::send_message))
        .route("/v1/messages/schedule", post(crate::http::messaging::schedule_message))
        .route("/v1/messages/rate-limit-status", get(crate::http::messaging::rate_limit_status))
        .route("/v1/messages/conversations", get(crate::http::messaging::list_conversations))
        .route("/v1/messages/conversations/{id}/handoff", post(crate::http::messaging::handoff))
        .route("/v1/campaigns", post(crate::http::campaigns::create_campaign))
        .route("/v1/campaigns/{id}/execute", post(crate::http::campaigns::execute_campaign))
        .route("/v1/campaigns/{id}/report", get(crate::http::campaigns::report))
        .route("/v1/wallet/withdraw", post(crate::http::wallet::initiate_withdrawal))
        .route("/v1/wallet/withdrawals/{id}/approve", post(crate::http::wallet::approve_withdrawal))
        .route("/v1/templates", get(crate::http::templates::list_templates).post(crate::http::templates::upsert_template))
        .route("/v1/tenant/settings", get(crate::http::tenant::get_settings).patch(crate::http::tenant::update_settings))
        .route("/v1/settings/integrations/{provider}", put(crate::http::tenant::put_integration))
        .route("/v1/settings/onboarding", get(crate::http::tenant::get_onboarding))
        .route_layer(middleware::from_fn_with_state(state.clone(), crate::auth::resolve_tenant_context));

    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/webhooks/whatsapp/{tenant_id}", post(crate::http::webhooks::whatsapp_inbound))
        .route("/webhooks/payments/{tenant_id}", post(crate::http::webhooks::payment_callback))
        .route("/v1/platform/tenants", post(crate::http::platform::create_tenant))
        .merge(scoped)
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(middleware::from_fn(crate::request_id::propagate_request_id))
}
