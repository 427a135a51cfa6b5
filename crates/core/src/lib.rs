pub mod config;
pub mod error;
pub mod types;

pub use config::PlatformConfig;
pub use error::{PlatformError, Result};
