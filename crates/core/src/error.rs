use thiserror::Error;

/// Stable, process-wide error taxonomy. `code()` returns the string each
/// variant is reported to clients as (spec §7) — callers outside the crate
/// boundary should match on `code()`, not on the `Debug`/`Display` text.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("authentication required")]
    AuthenticationRequired,

    #[error("invalid or expired token")]
    InvalidToken,

    #[error("tenant context required")]
    TenantContextRequired,

    #[error("tenant access denied: {reason}")]
    TenantAccessDenied { reason: String },

    #[error("insufficient permissions: {permission}")]
    InsufficientPermissions { permission: String },

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("customer consent required")]
    ConsentRequired,

    #[error("rate limit exceeded")]
    RateLimitExceeded,

    #[error("four-eyes violation: approver cannot be the requester")]
    FourEyesViolation,

    #[error("no LLM provider available")]
    ProviderUnavailable,

    #[error("credential validation failed: {0}")]
    CredentialValidationFailed(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PlatformError {
    /// Stable string code returned in HTTP error bodies (spec §7).
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthenticationRequired => "AUTHENTICATION_REQUIRED",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::TenantContextRequired => "TENANT_CONTEXT_REQUIRED",
            Self::TenantAccessDenied { .. } => "TENANT_ACCESS_DENIED",
            Self::InsufficientPermissions { .. } => "INSUFFICIENT_PERMISSIONS",
            Self::ValidationFailed(_) => "VALIDATION_FAILED",
            Self::ConsentRequired => "CONSENT_REQUIRED",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::FourEyesViolation => "FOUR_EYES_VIOLATION",
            Self::ProviderUnavailable => "PROVIDER_UNAVAILABLE",
            Self::CredentialValidationFailed(_) => "CREDENTIAL_VALIDATION_FAILED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status the gateway maps this error to.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::AuthenticationRequired | Self::InvalidToken => 401,
            Self::TenantContextRequired
            | Self::TenantAccessDenied { .. }
            | Self::InsufficientPermissions { .. }
            | Self::FourEyesViolation => 403,
            Self::ValidationFailed(_) | Self::ConsentRequired => 422,
            Self::RateLimitExceeded => 429,
            Self::ProviderUnavailable => 503,
            Self::CredentialValidationFailed(_) => 400,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::Database(_) | Self::Serialization(_) | Self::Io(_) | Self::Internal(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, PlatformError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable_strings() {
        assert_eq!(PlatformError::RateLimitExceeded.code(), "RATE_LIMIT_EXCEEDED");
        assert_eq!(PlatformError::FourEyesViolation.code(), "FOUR_EYES_VIOLATION");
        assert_eq!(
            PlatformError::TenantAccessDenied { reason: "x".into() }.code(),
            "TENANT_ACCESS_DENIED"
        );
    }

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(PlatformError::AuthenticationRequired.status_code(), 401);
        assert_eq!(PlatformError::RateLimitExceeded.status_code(), 429);
        assert_eq!(PlatformError::NotFound("x".into()).status_code(), 404);
    }
}
