use thiserror::Error;

#[derive(Debug, Error)]
pub enum TenancyError {
    #[error("tenant not found: {0}")]
    TenantNotFound(String),

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("user already exists: {0}")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("invalid role: {0}")]
    InvalidRole(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("four-eyes violation: approver cannot be the requester")]
    FourEyesViolation,

    #[error("credential encryption failed: {0}")]
    CredentialEncryption(String),
}

pub type Result<T> = std::result::Result<T, TenancyError>;

impl From<TenancyError> for platform_core::error::PlatformError {
    fn from(e: TenancyError) -> Self {
        use platform_core::error::PlatformError;
        match e {
            TenancyError::TenantNotFound(id) => PlatformError::NotFound(format!("tenant {id}")),
            TenancyError::UserNotFound(id) => PlatformError::NotFound(format!("user {id}")),
            TenancyError::AlreadyExists(msg) => PlatformError::Conflict(msg),
            TenancyError::DatabaseError(e) => PlatformError::Database(e.to_string()),
            TenancyError::InvalidRole(r) => PlatformError::ValidationFailed(format!("invalid role: {r}")),
            TenancyError::PermissionDenied(reason) => {
                PlatformError::InsufficientPermissions { permission: reason }
            }
            TenancyError::FourEyesViolation => PlatformError::FourEyesViolation,
            TenancyError::CredentialEncryption(msg) => PlatformError::CredentialValidationFailed(msg),
        }
    }
}
