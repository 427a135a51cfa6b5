pub mod db;
pub mod error;
pub mod manager;
pub mod types;

pub use error::{CheckoutError, Result};
pub use manager::{CheckoutMachine, PaymentCapability, MESSAGE_BUDGET};
pub use types::{CheckoutSession, CheckoutState, Order, OrderStatus, PaymentRequest, PaymentStatus};
