pub mod db;
pub mod error;
pub mod manager;
pub mod rate_limit;
pub mod telephony;
pub mod types;

pub use error::{MessagingError, Result};
pub use manager::{DispatchRequest, MessagingDispatcher};
pub use rate_limit::{QuotaDecision, RateLimiter};
pub use telephony::{TelephonyCapability, WhatsAppCloudApiProvider};
pub use types::{
    Conversation, ConversationStatus, Customer, Direction, DispatchOutcome, Message,
    MessageStatus, MessageTemplate,
};
