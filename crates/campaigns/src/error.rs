use thiserror::Error;

#[derive(Debug, Error)]
pub enum CampaignError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("campaign not found: {0}")]
    NotFound(String),

    #[error("tenant tier allows at most {max} variants, campaign requested {requested}")]
    TooManyVariants { requested: u32, max: u32 },

    #[error("campaign {0} is not in draft status")]
    NotDraft(String),

    #[error("messaging error: {0}")]
    Messaging(#[from] messaging::MessagingError),
}

pub type Result<T> = std::result::Result<T, CampaignError>;

impl From<CampaignError> for platform_core::error::PlatformError {
    fn from(e: CampaignError) -> Self {
        use platform_core::error::PlatformError;
        match e {
            CampaignError::Database(err) => PlatformError::Database(err.to_string()),
            CampaignError::Serialization(err) => PlatformError::Serialization(err),
            CampaignError::NotFound(id) => PlatformError::NotFound(id),
            CampaignError::TooManyVariants { requested, max } => PlatformError::ValidationFailed(format!(
                "requested {requested} variants exceeds tier maximum of {max}"
            )),
            CampaignError::NotDraft(id) => PlatformError::Conflict(format!("campaign {id} is not in draft status")),
            CampaignError::Messaging(err) => err.into(),
        }
    }
}
