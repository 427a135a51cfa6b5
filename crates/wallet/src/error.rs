use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("withdrawal not found: {0}")]
    NotFound(String),

    #[error("four-eyes violation: approver cannot be the requester")]
    FourEyesViolation,

    #[error("withdrawal {0} is not pending")]
    NotPending(String),
}

pub type Result<T> = std::result::Result<T, WalletError>;

impl From<WalletError> for platform_core::error::PlatformError {
    fn from(e: WalletError) -> Self {
        use platform_core::error::PlatformError;
        match e {
            WalletError::Database(err) => PlatformError::Database(err.to_string()),
            WalletError::NotFound(id) => PlatformError::NotFound(id),
            WalletError::FourEyesViolation => PlatformError::FourEyesViolation,
            WalletError::NotPending(id) => PlatformError::Conflict(format!("withdrawal {id} is not pending")),
        }
    }
}
