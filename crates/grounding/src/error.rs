use thiserror::Error;

#[derive(Debug, Error)]
pub enum GroundingError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("catalog item not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, GroundingError>;

impl From<GroundingError> for platform_core::error::PlatformError {
    fn from(e: GroundingError) -> Self {
        use platform_core::error::PlatformError;
        match e {
            GroundingError::Database(err) => PlatformError::Database(err.to_string()),
            GroundingError::NotFound(id) => PlatformError::NotFound(id),
        }
    }
}
