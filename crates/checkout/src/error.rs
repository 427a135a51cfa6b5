use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("invalid transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },

    #[error("product {0} is not in stock")]
    OutOfStock(String),

    #[error("quantity {requested} exceeds available stock {available}")]
    QuantityExceedsStock { requested: u32, available: u32 },

    #[error("outbound message budget exceeded for this checkout")]
    MessageBudgetExceeded,

    #[error("payment initiation failed: {0}")]
    PaymentFailed(String),

    #[error("checkout session not found: {0}")]
    NotFound(String),

    #[error("outbox error: {0}")]
    Outbox(#[from] outbox::OutboxError),
}

pub type Result<T> = std::result::Result<T, CheckoutError>;

impl From<CheckoutError> for platform_core::error::PlatformError {
    fn from(e: CheckoutError) -> Self {
        use platform_core::error::PlatformError;
        match e {
            CheckoutError::Database(err) => PlatformError::Database(err.to_string()),
            CheckoutError::InvalidTransition { from, event } => {
                PlatformError::Conflict(format!("cannot apply {event} from state {from}"))
            }
            CheckoutError::OutOfStock(sku) => PlatformError::ValidationFailed(format!("{sku} out of stock")),
            CheckoutError::QuantityExceedsStock { requested, available } => PlatformError::ValidationFailed(
                format!("requested {requested} exceeds available stock {available}"),
            ),
            CheckoutError::MessageBudgetExceeded => {
                PlatformError::Internal("checkout outbound message budget exceeded".to_string())
            }
            CheckoutError::PaymentFailed(msg) => PlatformError::Internal(msg),
            CheckoutError::NotFound(id) => PlatformError::NotFound(id),
            CheckoutError::Outbox(err) => err.into(),
        }
    }
}
