use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutboxError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, OutboxError>;

impl From<OutboxError> for platform_core::error::PlatformError {
    fn from(e: OutboxError) -> Self {
        use platform_core::error::PlatformError;
        match e {
            OutboxError::Database(err) => PlatformError::Database(err.to_string()),
            OutboxError::Serialization(err) => PlatformError::Serialization(err),
        }
    }
}
