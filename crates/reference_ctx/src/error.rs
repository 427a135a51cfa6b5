use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReferenceCtxError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("no referent found for expression: {0}")]
    Unresolved(String),
}

pub type Result<T> = std::result::Result<T, ReferenceCtxError>;
