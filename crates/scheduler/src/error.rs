use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("scheduled message not found: {id}")]
    NotFound { id: String },

    #[error("messaging error: {0}")]
    Messaging(#[from] messaging::MessagingError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

impl From<SchedulerError> for platform_core::error::PlatformError {
    fn from(e: SchedulerError) -> Self {
        use platform_core::error::PlatformError;
        match e {
            SchedulerError::Database(err) => PlatformError::Database(err.to_string()),
            SchedulerError::NotFound { id } => PlatformError::NotFound(id),
            SchedulerError::Messaging(err) => err.into(),
        }
    }
}
