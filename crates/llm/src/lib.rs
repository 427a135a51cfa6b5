pub mod anthropic;
pub mod anthropic_stream;
pub mod health;
pub mod openai;
pub mod prompt;
pub mod provider;
pub mod router;
pub mod stream;
pub mod thinking;

pub use anthropic::AnthropicProvider;
pub use health::{HealthTracker, ProviderHealthEntry, ProviderStatus};
pub use openai::OpenAiProvider;
pub use prompt::{PromptBuilder, SessionInfo, SystemPrompt, TenantPersona};
pub use provider::{ChatRequest, ChatResponse, LlmProvider, Message, ProviderError, Role};
pub use router::{estimate_complexity, Complexity, ProviderRouter, ProviderSlot};
pub use stream::StreamEvent;
pub use thinking::ThinkingLevel;
