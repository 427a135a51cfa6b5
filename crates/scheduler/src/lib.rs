pub mod db;
pub mod engine;
pub mod error;
pub mod types;

pub use engine::{
    cancel_for_conversation, schedule_appointment_reminders, schedule_re_engagement,
    SchedulerEngine, TenantLookup,
};
pub use error::{Result, SchedulerError};
pub use types::{ScheduledMessage, ScheduledMessageStatus};
