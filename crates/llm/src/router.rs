use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::health::HealthTracker;
use crate::provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError};
use crate::stream::StreamEvent;

/// Below this many characters of combined message content, the router may
/// substitute a slot's cheaper `model_override` instead of its default model.
const COMPLEXITY_THRESHOLD_CHARS: usize = 400;

/// Capped exponential backoff between retries against the same provider:
/// 1s, 2s, 4s, then held at 4s.
const BASE_BACKOFF_MS: u64 = 1_000;
const MAX_BACKOFF_MS: u64 = 4_000;

/// Configuration for a single provider slot inside the ProviderRouter.
pub struct ProviderSlot {
    /// The LLM provider to try.
    pub provider: Box<dyn LlmProvider>,
    /// Maximum number of attempts before moving to the next provider.
    pub max_retries: u32,
    /// Model name to substitute into the request when this slot is tried
    /// under low estimated complexity (e.g. a cheaper/faster variant).
    pub small_model: Option<String>,
}

impl ProviderSlot {
    pub fn new(provider: Box<dyn LlmProvider>, max_retries: u32) -> Self {
        Self { provider, max_retries, small_model: None }
    }

    pub fn with_small_model(mut self, model: impl Into<String>) -> Self {
        self.small_model = Some(model.into());
        self
    }
}

/// Rough classification of how much context a turn carries, used to decide
/// whether a slot's cheaper model is good enough for this request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Complexity {
    Simple,
    Complex,
}

/// Estimate complexity from the size of the conversation being sent.
/// This is a size heuristic, not a semantic one: large context windows are
/// routed to the stronger model, short ones may use the cheaper model.
pub fn estimate_complexity(req: &ChatRequest) -> Complexity {
    let chars: usize = req.messages.iter().map(|m| m.content.len()).sum::<usize>()
        + req.system.len();
    if chars < COMPLEXITY_THRESHOLD_CHARS {
        Complexity::Simple
    } else {
        Complexity::Complex
    }
}

/// Routes requests across multiple LLM providers with circuit-breaker aware
/// failover.
///
/// Providers are tried in priority order (index 0 first). A slot whose
/// provider has an open circuit (per `HealthTracker`) is skipped outright.
/// Within a slot, transient failures are retried with capped exponential
/// backoff up to `max_retries` times; a non-retryable failure (rate limit)
/// moves on to the next slot immediately. Every outcome is reported back to
/// the `HealthTracker` so the breaker state stays current.
pub struct ProviderRouter {
    slots: Vec<ProviderSlot>,
    health: Arc<HealthTracker>,
}

impl ProviderRouter {
    /// Create a new router with the given priority-ordered provider slots.
    /// At least one slot is required.
    pub fn new(slots: Vec<ProviderSlot>, health: Arc<HealthTracker>) -> Self {
        assert!(!slots.is_empty(), "ProviderRouter requires at least one provider slot");
        Self { slots, health }
    }

    fn request_for_slot<'a>(&self, slot: &ProviderSlot, req: &'a ChatRequest) -> std::borrow::Cow<'a, ChatRequest> {
        if let Some(model) = &slot.small_model {
            if estimate_complexity(req) == Complexity::Simple {
                let mut cloned = req.clone();
                cloned.model = model.clone();
                return std::borrow::Cow::Owned(cloned);
            }
        }
        std::borrow::Cow::Borrowed(req)
    }

    fn backoff_for(attempt: u32) -> Duration {
        let ms = BASE_BACKOFF_MS.saturating_mul(1u64 << attempt.min(2)).min(MAX_BACKOFF_MS);
        Duration::from_millis(ms)
    }
}

#[async_trait]
impl LlmProvider for ProviderRouter {
    fn name(&self) -> &str {
        "router"
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let mut last_err: Option<ProviderError> = None;

        for slot in &self.slots {
            let provider_name = slot.provider.name();

            if self.health.should_skip(provider_name) {
                info!(provider = %provider_name, "circuit open, skipping provider");
                continue;
            }

            let effective_req = self.request_for_slot(slot, req);

            for attempt in 0..=slot.max_retries {
                let start = std::time::Instant::now();
                match slot.provider.send(&effective_req).await {
                    Ok(resp) => {
                        self.health.record_success(provider_name, start.elapsed().as_millis() as u64);
                        if attempt > 0 {
                            info!(provider = %provider_name, attempt, "request succeeded after retry");
                        }
                        return Ok(resp);
                    }
                    Err(e) => {
                        warn!(provider = %provider_name, attempt, err = %e, "provider send failed");
                        self.health.record_error(provider_name, &e);

                        let retryable = !matches!(e, ProviderError::RateLimited { .. });
                        last_err = Some(e);

                        if !retryable || attempt >= slot.max_retries {
                            break;
                        }
                        tokio::time::sleep(Self::backoff_for(attempt)).await;
                    }
                }
            }

            info!(provider = %provider_name, "provider exhausted, trying next provider");
        }

        Err(last_err.unwrap_or_else(|| ProviderError::Unavailable("all providers failed".to_string())))
    }

    async fn send_stream(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        let mut last_err: Option<ProviderError> = None;

        for slot in &self.slots {
            let provider_name = slot.provider.name();

            if self.health.should_skip(provider_name) {
                info!(provider = %provider_name, "circuit open, skipping provider");
                continue;
            }

            let effective_req = self.request_for_slot(slot, req);

            for attempt in 0..=slot.max_retries {
                let start = std::time::Instant::now();
                match slot.provider.send_stream(&effective_req, tx.clone()).await {
                    Ok(()) => {
                        self.health.record_success(provider_name, start.elapsed().as_millis() as u64);
                        if attempt > 0 {
                            info!(provider = %provider_name, attempt, "stream request succeeded after retry");
                        }
                        return Ok(());
                    }
                    Err(e) => {
                        warn!(provider = %provider_name, attempt, err = %e, "provider send_stream failed");
                        self.health.record_error(provider_name, &e);

                        let retryable = !matches!(e, ProviderError::RateLimited { .. });
                        last_err = Some(e);

                        if !retryable || attempt >= slot.max_retries {
                            break;
                        }
                        tokio::time::sleep(Self::backoff_for(attempt)).await;
                    }
                }
            }

            info!(provider = %provider_name, "stream provider exhausted, trying next provider");
        }

        Err(last_err.unwrap_or_else(|| ProviderError::Unavailable("all providers failed".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ChatRequest, ChatResponse, Message, Role};
    use async_trait::async_trait;

    struct AlwaysFail;

    #[async_trait]
    impl LlmProvider for AlwaysFail {
        fn name(&self) -> &str {
            "always-fail"
        }
        async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Err(ProviderError::Unavailable("intentional failure".to_string()))
        }
    }

    struct AlwaysOk;

    #[async_trait]
    impl LlmProvider for AlwaysOk {
        fn name(&self) -> &str {
            "always-ok"
        }
        async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                content: "ok".to_string(),
                model: req.model.clone(),
                tokens_in: 1,
                tokens_out: 1,
                stop_reason: "stop".to_string(),
                tool_calls: Vec::new(),
            })
        }
    }

    fn dummy_request() -> ChatRequest {
        ChatRequest {
            model: "test-model".to_string(),
            system: "You are a test.".to_string(),
            system_prompt: None,
            messages: vec![Message { role: Role::User, content: "hello".to_string() }],
            max_tokens: 64,
            stream: false,
            thinking: None,
            tools: Vec::new(),
            raw_messages: None,
        }
    }

    #[tokio::test]
    async fn router_falls_back_to_second_provider() {
        let router = ProviderRouter::new(
            vec![ProviderSlot::new(Box::new(AlwaysFail), 0), ProviderSlot::new(Box::new(AlwaysOk), 0)],
            HealthTracker::new(),
        );

        let result = router.send(&dummy_request()).await;
        assert!(result.is_ok());
        assert_eq!(result.unwrap().content, "ok");
    }

    #[tokio::test]
    async fn router_errors_when_all_fail() {
        let router = ProviderRouter::new(
            vec![ProviderSlot::new(Box::new(AlwaysFail), 0), ProviderSlot::new(Box::new(AlwaysFail), 0)],
            HealthTracker::new(),
        );

        let result = router.send(&dummy_request()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn open_circuit_skips_straight_to_next_slot() {
        let health = HealthTracker::new();
        for _ in 0..10 {
            health.record_error("always-fail", &ProviderError::Unavailable("down".into()));
        }
        let router = ProviderRouter::new(
            vec![ProviderSlot::new(Box::new(AlwaysFail), 2), ProviderSlot::new(Box::new(AlwaysOk), 0)],
            health,
        );

        let result = router.send(&dummy_request()).await;
        assert!(result.is_ok());
    }

    #[test]
    fn complexity_estimate_reflects_context_size() {
        let short = dummy_request();
        assert_eq!(estimate_complexity(&short), Complexity::Simple);

        let mut long = dummy_request();
        long.messages[0].content = "x".repeat(1000);
        assert_eq!(estimate_complexity(&long), Complexity::Complex);
    }
}
