//! One turn's pipeline for a harmonized input (spec §4.7).
//!
//! Mirrors the shape of a single-turn chat pipeline: load context, build a
//! prompt, call the model, persist the turns — but branches before the LLM
//! call into the checkout state machine when the turn is a checkout
//! transition, and runs every drafted reply through the grounding stage
//! before it is ever dispatched.

use std::sync::Arc;

use dashmap::DashMap;
use rusqlite::Connection;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

use checkout::{CheckoutMachine, CheckoutState, PaymentCapability};
use grounding::GroundingValidator;
use llm::{ChatRequest, LlmProvider, Message as LlmMessage, PromptBuilder, ProviderRouter, Role as LlmRole, SessionInfo, TenantPersona};
use messaging::{Customer, DispatchOutcome, DispatchRequest, MessagingDispatcher};
use platform_core::types::{MessageType, QuietHours, SubscriptionTier};
use reference_ctx::{MentionedItem, ReferenceContextManager, Resolution};

use crate::db;
use crate::error::Result;
use crate::grounding_stage;
use crate::intent;
use crate::types::{ContextPack, HandlerDecision, TurnOutcome, CONFIDENCE_THRESHOLD, LOW_CONFIDENCE_STREAK_CAP};

const RECENT_MESSAGE_WINDOW: u32 = 20;
const CATALOG_MATCH_LIMIT: usize = 5;
const PRIOR_SESSION_TAIL: u32 = 5;
const DEFAULT_MODEL: &str = "default";

/// Everything one turn needs beyond the harmonized text itself.
pub struct TurnRequest<'a> {
    pub tenant_id: &'a str,
    pub conversation_id: &'a str,
    pub customer: &'a Customer,
    pub persona: &'a TenantPersona,
    pub utterance: &'a str,
    pub tier: SubscriptionTier,
    pub quiet_hours: Option<QuietHours>,
    pub minute_of_day: u16,
}

pub struct Orchestrator {
    conn: Arc<std::sync::Mutex<Connection>>,
    reference_ctx: Arc<ReferenceContextManager>,
    grounding: Arc<GroundingValidator>,
    router: Arc<ProviderRouter>,
    dispatcher: Arc<MessagingDispatcher>,
    checkout: Arc<CheckoutMachine>,
    payment: Arc<dyn PaymentCapability>,
    locks: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl Orchestrator {
    pub fn new(
        conn: Arc<std::sync::Mutex<Connection>>,
        reference_ctx: Arc<ReferenceContextManager>,
        grounding: Arc<GroundingValidator>,
        router: Arc<ProviderRouter>,
        dispatcher: Arc<MessagingDispatcher>,
        checkout: Arc<CheckoutMachine>,
        payment: Arc<dyn PaymentCapability>,
    ) -> Result<Self> {
        {
            let c = conn.lock().unwrap();
            db::init_db(&c)?;
        }
        Ok(Self { conn, reference_ctx, grounding, router, dispatcher, checkout, payment, locks: DashMap::new() })
    }

    async fn conversation_lock(&self, conversation_id: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    /// Runs the full 10-step turn. At most one turn per conversation is ever
    /// in flight — concurrent calls for the same conversation serialize on
    /// the per-conversation lock (spec §4.7 concurrency note).
    pub async fn process_turn(&self, req: TurnRequest<'_>) -> Result<TurnOutcome> {
        let _guard = self.conversation_lock(req.conversation_id).await;

        // Step 1+2: load conversation state, apply the language lock.
        let state = {
            let conn = self.conn.lock().unwrap();
            db::get_state(&conn, req.conversation_id)?
        };
        let (locked_language, mut low_confidence_streak) = match &state {
            Some(s) => (s.locked_language.clone(), s.low_confidence_streak),
            None => (None, 0),
        };
        let language = locked_language.clone().unwrap_or_else(|| detect_language(req.utterance));

        // Step 3: context pack.
        let context_pack = self.build_context_pack(req.tenant_id, req.conversation_id, req.utterance)?;

        // Record the inbound turn immediately so history stays accurate even
        // if a later step errors out.
        {
            let conn = self.conn.lock().unwrap();
            messaging::db::record_message(
                &conn,
                req.tenant_id,
                req.conversation_id,
                messaging::Direction::Inbound,
                MessageType::CustomerInbound,
                req.utterance,
                None,
                messaging::MessageStatus::Delivered,
            )?;
        }

        // Step 4: reference resolution.
        let resolution = self.reference_ctx.resolve(req.conversation_id, req.utterance);

        // Step 5: intent inference.
        let decision = intent::infer(req.utterance, &resolution);
        info!(conversation_id = req.conversation_id, ?decision, "turn: handler decision");

        // Step 6+7+8: checkout transition, or LLM draft + grounding + confidence.
        let outcome = if is_checkout_decision(&decision) {
            self.drive_checkout(req.tenant_id, req.conversation_id, req.customer, &decision, &context_pack).await?
        } else {
            let (reply, confidence) = self
                .draft_and_ground(req.tenant_id, req.conversation_id, req.utterance, req.persona, &language, &context_pack, &resolution)
                .await?;

            if confidence < CONFIDENCE_THRESHOLD {
                low_confidence_streak += 1;
            } else {
                low_confidence_streak = 0;
            }

            if confidence < CONFIDENCE_THRESHOLD || low_confidence_streak > LOW_CONFIDENCE_STREAK_CAP {
                self.mark_handoff(req.tenant_id, req.conversation_id)?;
                TurnOutcome::HandedOff {
                    courtesy_message: "I want to make sure you get this right — connecting you with a team member now."
                        .to_string(),
                }
            } else {
                TurnOutcome::Replied { content: reply }
            }
        };

        // Persist the (possibly updated) language lock / confidence streak.
        {
            let conn = self.conn.lock().unwrap();
            db::upsert_state(&conn, req.tenant_id, req.conversation_id, Some(&language), low_confidence_streak)?;
        }

        // Step 9: dispatch + register mentions.
        self.dispatch_outcome(
            req.tenant_id,
            req.conversation_id,
            req.customer,
            req.tier,
            req.quiet_hours,
            req.minute_of_day,
            &outcome,
            &context_pack,
        )
        .await?;

        // Step 10: audit entry. A failure here never aborts the turn.
        {
            let conn = self.conn.lock().unwrap();
            let details = serde_json::json!({ "decision": format!("{:?}", decision) }).to_string();
            if let Err(e) = outbox::db::write_audit_log(&conn, req.tenant_id, None, "turn_processed", "conversation", req.conversation_id, &details) {
                warn!(error = %e, "failed to write turn audit log");
            }
        }

        Ok(outcome)
    }

    fn build_context_pack(&self, tenant_id: &str, conversation_id: &str, utterance: &str) -> Result<ContextPack> {
        let conn = self.conn.lock().unwrap();
        let recent_messages = messaging::db::get_recent_messages(&conn, tenant_id, conversation_id, RECENT_MESSAGE_WINDOW)?;
        let prior_session_summary = Self::summarize_prior_sessions(&conn, tenant_id, conversation_id)?;
        drop(conn);

        // Fuzzy/keyword catalog retrieval. A vector-index lookup would sit
        // here too; its failure must never be fatal, so it is not wired to
        // anything that can return `Err` out of this turn (spec §4.7 step 3).
        let catalog_matches = self.grounding.search(tenant_id, utterance, CATALOG_MATCH_LIMIT).unwrap_or_default();

        Ok(ContextPack { recent_messages, prior_session_summary, catalog_matches })
    }

    /// Extractive carried-forward summary of everything before the current
    /// session (spec §4.7 step 3). No summarization-model call sits in this
    /// stack, so this condenses the tail of the prior session — the highest
    /// signal slice of it — into a short note instead of hitting the LLM a
    /// second time per turn just to compress history.
    fn summarize_prior_sessions(conn: &Connection, tenant_id: &str, conversation_id: &str) -> Result<Option<String>> {
        let Some(conversation) = messaging::db::get_conversation(conn, tenant_id, conversation_id)? else {
            return Ok(None);
        };
        let prior_count = messaging::db::count_messages_before(conn, tenant_id, conversation_id, &conversation.current_session_start)?;
        if prior_count == 0 {
            return Ok(None);
        }

        let tail = messaging::db::get_messages_before(conn, tenant_id, conversation_id, &conversation.current_session_start, PRIOR_SESSION_TAIL)?;
        let lines: Vec<String> = tail
            .iter()
            .map(|m| {
                let who = if m.direction == messaging::Direction::Inbound { "customer" } else { "business" };
                let snippet: String = m.content.chars().take(120).collect();
                format!("- {who}: {snippet}")
            })
            .collect();

        Ok(Some(format!(
            "{prior_count} message(s) from earlier sessions not shown. Most recent before this session:\n{}",
            lines.join("\n")
        )))
    }

    async fn drive_checkout(
        &self,
        tenant_id: &str,
        conversation_id: &str,
        customer: &Customer,
        decision: &HandlerDecision,
        context: &ContextPack,
    ) -> Result<TurnOutcome> {
        let session = {
            let conn = self.conn.lock().unwrap();
            checkout::db::get_active_session_for_conversation(&conn, conversation_id)?
        };

        match decision {
            HandlerDecision::SelectProduct { item_ref } => {
                let Some(item) = self.resolve_catalog_item(tenant_id, item_ref, context)? else {
                    return Ok(TurnOutcome::Replied {
                        content: "I couldn't find that item — could you tell me the product name?".to_string(),
                    });
                };
                let session = match session {
                    Some(s) => s,
                    None => self.checkout.start(tenant_id, conversation_id, &customer.id)?,
                };
                let session = self.checkout.select_product(&session, &item)?;
                Ok(TurnOutcome::CheckoutAdvanced {
                    state: session.state,
                    reply: Some(format!("Got it, {} — how many would you like?", item.name)),
                })
            }
            HandlerDecision::ConfirmQuantity { quantity } => {
                let Some(session) = session else {
                    return Ok(TurnOutcome::Replied { content: "Which product would you like first?".to_string() });
                };
                if session.state != CheckoutState::ProductSelected {
                    return Ok(TurnOutcome::Replied { content: "Let's pick a product before the quantity.".to_string() });
                }
                let sku = session.product_sku.clone().unwrap_or_default();
                let available = self.grounding.find_by_name(tenant_id, &sku).ok().flatten();
                let available_stock = match &available {
                    Some(item) if item.in_stock => u32::MAX,
                    _ => 0,
                };
                let session = self.checkout.confirm_quantity(&session, *quantity, available_stock)?;
                Ok(TurnOutcome::CheckoutAdvanced {
                    state: session.state,
                    reply: Some("Great — how would you like to pay (card, cash, or bank transfer)?".to_string()),
                })
            }
            HandlerDecision::SelectPaymentMethod { method } => {
                let Some(session) = session else {
                    return Ok(TurnOutcome::Replied { content: "Let's pick a product first.".to_string() });
                };
                if session.state != CheckoutState::QuantityConfirmed {
                    return Ok(TurnOutcome::Replied { content: "I need a product and quantity before payment.".to_string() });
                }
                let sku = session.product_sku.clone().unwrap_or_default();
                let Some(item) = self.grounding.find_by_name(tenant_id, &sku).ok().flatten() else {
                    return Ok(TurnOutcome::Replied { content: "That item is no longer available.".to_string() });
                };
                let (session, order) = self.checkout.select_payment_method(&session, method, item.price_cents, &item.currency)?;

                // Payment initiation runs in this same turn: no further
                // customer input is needed before the provider callback.
                match self.checkout.initiate_payment(&session, &order, self.payment.as_ref()).await {
                    Ok((session, _payment_request)) => Ok(TurnOutcome::CheckoutAdvanced {
                        state: session.state,
                        reply: Some("Payment initiated — you'll get a confirmation shortly.".to_string()),
                    }),
                    Err(checkout::CheckoutError::PaymentFailed(_)) => Ok(TurnOutcome::CheckoutAdvanced {
                        state: CheckoutState::Failed,
                        reply: Some("That payment attempt failed. Want to try a different method?".to_string()),
                    }),
                    Err(e) => Err(e.into()),
                }
            }
            _ => unreachable!("is_checkout_decision gates this branch"),
        }
    }

    fn resolve_catalog_item(
        &self,
        tenant_id: &str,
        item_ref: &str,
        context: &ContextPack,
    ) -> Result<Option<grounding::CatalogItem>> {
        if let Some(item) = context.catalog_matches.iter().find(|i| i.id.to_string() == item_ref || i.sku == item_ref) {
            return Ok(Some(item.clone()));
        }
        Ok(self.grounding.find_by_name(tenant_id, item_ref)?)
    }

    async fn draft_and_ground(
        &self,
        tenant_id: &str,
        conversation_id: &str,
        utterance: &str,
        persona: &TenantPersona,
        language: &str,
        context: &ContextPack,
        resolution: &Resolution,
    ) -> Result<(String, f64)> {
        let catalog_context = if context.catalog_matches.is_empty() {
            None
        } else {
            Some(
                context
                    .catalog_matches
                    .iter()
                    .map(|i| format!("- {} ({}): {} {} [{}]", i.name, i.sku, i.price_cents, i.currency, if i.in_stock { "in stock" } else { "out of stock" }))
                    .collect::<Vec<_>>()
                    .join("\n"),
            )
        };
        let reference_context = match resolution {
            Resolution::Ordinal(id) | Resolution::Demonstrative(id) | Resolution::Descriptive(id) => {
                Some(format!("The customer's message likely refers to previously mentioned item: {id}."))
            }
            Resolution::NoMatch => None,
        };
        let session_info = SessionInfo {
            conversation_id: conversation_id.to_string(),
            turn_count: context.recent_messages.len() as u32,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        let system_prompt = PromptBuilder::build_prompt(
            persona,
            catalog_context.as_deref(),
            reference_context.as_deref(),
            context.prior_session_summary.as_deref(),
            Some(&session_info),
        );

        let mut messages: Vec<LlmMessage> = context
            .recent_messages
            .iter()
            .map(|m| LlmMessage {
                role: if m.direction == messaging::Direction::Inbound { LlmRole::User } else { LlmRole::Assistant },
                content: m.content.clone(),
            })
            .collect();
        messages.push(LlmMessage { role: LlmRole::User, content: format!("[{language}] {utterance}") });

        let request = ChatRequest {
            model: DEFAULT_MODEL.to_string(),
            system: system_prompt.to_plain_text(),
            system_prompt: Some(system_prompt),
            messages,
            max_tokens: 1024,
            stream: false,
            thinking: None,
            tools: Vec::new(),
            raw_messages: None,
        };

        let response = match self.router.send(&request).await {
            Ok(r) => r,
            Err(e) => {
                warn!(conversation_id, error = %e, "all LLM providers failed for this turn");
                return Ok((String::new(), 0.0));
            }
        };

        let outcome = grounding_stage::validate_and_rewrite(&self.grounding, tenant_id, utterance, &context.catalog_matches, &response.content);
        {
            let conn = self.conn.lock().unwrap();
            for (transformation, detail) in &outcome.log {
                db::record_validation(&conn, tenant_id, conversation_id, transformation, detail)?;
            }
        }

        let penalties = outcome.log.iter().filter(|(k, _)| k == "claim_contradicted" || k == "claim_unverifiable").count();
        let confidence = (1.0 - 0.3 * penalties as f64).max(0.0);
        Ok((outcome.text, confidence))
    }

    fn mark_handoff(&self, tenant_id: &str, conversation_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        messaging::db::set_conversation_status(&conn, tenant_id, conversation_id, messaging::ConversationStatus::Handoff)?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn dispatch_outcome(
        &self,
        tenant_id: &str,
        conversation_id: &str,
        customer: &Customer,
        tier: SubscriptionTier,
        quiet_hours: Option<QuietHours>,
        minute_of_day: u16,
        outcome: &TurnOutcome,
        context: &ContextPack,
    ) -> Result<()> {
        let content = match outcome {
            TurnOutcome::Replied { content } if !content.is_empty() => content.clone(),
            TurnOutcome::CheckoutAdvanced { reply: Some(reply), .. } => reply.clone(),
            TurnOutcome::HandedOff { courtesy_message } => courtesy_message.clone(),
            _ => return Ok(()),
        };

        let dispatch_req = DispatchRequest { tenant_id, conversation_id, customer, message_type: MessageType::AutomatedTransactional, content, minute_of_day };
        match self.dispatcher.dispatch(dispatch_req, tier, quiet_hours).await {
            Ok(DispatchOutcome::Sent(_)) => {}
            Ok(DispatchOutcome::Deferred { reason, .. }) => {
                info!(conversation_id, reason, "turn reply deferred");
            }
            Err(e) => warn!(conversation_id, error = %e, "turn reply dispatch failed"),
        }

        if !context.catalog_matches.is_empty() {
            let mentions: Vec<MentionedItem> = context
                .catalog_matches
                .iter()
                .enumerate()
                .map(|(i, item)| MentionedItem { item_id: item.sku.clone(), label: item.name.clone(), position: i as u32 + 1 })
                .collect();
            self.reference_ctx.set_mentions(conversation_id, mentions)?;
        }
        Ok(())
    }
}

fn is_checkout_decision(decision: &HandlerDecision) -> bool {
    matches!(
        decision,
        HandlerDecision::SelectProduct { .. } | HandlerDecision::ConfirmQuantity { .. } | HandlerDecision::SelectPaymentMethod { .. }
    )
}

/// English/Spanish keyword heuristic. No language-id crate is in the
/// dependency stack for this narrow a need; falls back to English.
fn detect_language(utterance: &str) -> String {
    const SPANISH_MARKERS: &[&str] = &["hola", "gracias", "cuanto", "cuánto", "precio", "quiero"];
    let lower = utterance.to_lowercase();
    if SPANISH_MARKERS.iter().any(|m| lower.contains(m)) {
        "es".to_string()
    } else {
        "en".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use messaging::{Direction, MessageStatus};

    fn conversation_with_messages() -> (Connection, String, String) {
        let conn = Connection::open_in_memory().unwrap();
        messaging::db::init_db(&conn).unwrap();
        let customer = messaging::db::create_customer(&conn, "t1", "+15551234567", None).unwrap();
        let conversation = messaging::db::create_conversation(&conn, "t1", &customer.id).unwrap();
        (conn, "t1".to_string(), conversation.id)
    }

    #[test]
    fn no_prior_messages_yields_no_summary() {
        let (conn, tenant_id, conversation_id) = conversation_with_messages();
        let summary = Orchestrator::summarize_prior_sessions(&conn, &tenant_id, &conversation_id).unwrap();
        assert!(summary.is_none());
    }

    #[test]
    fn prior_session_messages_are_summarized() {
        let (conn, tenant_id, conversation_id) = conversation_with_messages();
        messaging::db::record_message(
            &conn, &tenant_id, &conversation_id, Direction::Inbound, MessageType::CustomerInbound,
            "Do you still have the blue jacket?", None, MessageStatus::Queued,
        )
        .unwrap();
        messaging::db::record_message(
            &conn, &tenant_id, &conversation_id, Direction::Outbound, MessageType::ManualOutbound,
            "Yes, in stock for $49.99.", None, MessageStatus::Sent,
        )
        .unwrap();

        // Simulate a new session starting well after those messages.
        conn.execute(
            "UPDATE conversations SET current_session_start = '2030-01-01T00:00:00Z' WHERE id = ?1",
            rusqlite::params![conversation_id],
        )
        .unwrap();

        let summary = Orchestrator::summarize_prior_sessions(&conn, &tenant_id, &conversation_id).unwrap().unwrap();
        assert!(summary.contains("2 message(s) from earlier sessions"));
        assert!(summary.contains("blue jacket"));
    }
}

