use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("reference context error: {0}")]
    ReferenceCtx(#[from] reference_ctx::ReferenceCtxError),

    #[error("grounding error: {0}")]
    Grounding(#[from] grounding::GroundingError),

    #[error("checkout error: {0}")]
    Checkout(#[from] checkout::CheckoutError),

    #[error("messaging error: {0}")]
    Messaging(#[from] messaging::MessagingError),

    #[error("harmonizer error: {0}")]
    Harmonizer(#[from] harmonizer::HarmonizerError),

    #[error("outbox error: {0}")]
    Outbox(#[from] outbox::OutboxError),

    #[error("LLM provider error: {0}")]
    Provider(#[from] llm::ProviderError),

    #[error("all LLM providers failed, conversation handed off")]
    HandedOff,
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

impl From<OrchestratorError> for platform_core::error::PlatformError {
    fn from(e: OrchestratorError) -> Self {
        use platform_core::error::PlatformError;
        match e {
            OrchestratorError::Database(err) => PlatformError::Database(err.to_string()),
            OrchestratorError::Serialization(err) => PlatformError::Serialization(err),
            OrchestratorError::ConversationNotFound(id) => PlatformError::NotFound(id),
            OrchestratorError::ReferenceCtx(err) => PlatformError::Internal(err.to_string()),
            OrchestratorError::Grounding(err) => err.into(),
            OrchestratorError::Checkout(err) => err.into(),
            OrchestratorError::Messaging(err) => err.into(),
            OrchestratorError::Harmonizer(err) => PlatformError::Internal(err.to_string()),
            OrchestratorError::Outbox(err) => PlatformError::Internal(err.to_string()),
            OrchestratorError::Provider(_) => PlatformError::ProviderUnavailable,
            OrchestratorError::HandedOff => PlatformError::ProviderUnavailable,
        }
    }
}
