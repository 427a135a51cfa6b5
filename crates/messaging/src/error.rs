use thiserror::Error;

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("customer has not consented to this message type")]
    ConsentRequired,

    #[error("tenant daily message quota exceeded")]
    RateLimitExceeded,

    #[error("telephony send failed: {0}")]
    SendFailed(String),

    #[error("template not found: {0}")]
    TemplateNotFound(String),

    #[error("not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, MessagingError>;

impl From<MessagingError> for platform_core::error::PlatformError {
    fn from(e: MessagingError) -> Self {
        use platform_core::error::PlatformError;
        match e {
            MessagingError::Database(err) => PlatformError::Database(err.to_string()),
            MessagingError::ConsentRequired => PlatformError::ConsentRequired,
            MessagingError::RateLimitExceeded => PlatformError::RateLimitExceeded,
            MessagingError::SendFailed(msg) => PlatformError::Internal(msg),
            MessagingError::TemplateNotFound(id) => PlatformError::NotFound(id),
            MessagingError::NotFound(id) => PlatformError::NotFound(id),
        }
    }
}
