use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarmonizerError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("duplicate provider message id: {0}")]
    Duplicate(String),
}

pub type Result<T> = std::result::Result<T, HarmonizerError>;
