pub mod db;
pub mod engine;
pub mod error;
pub mod stats;
pub mod types;

pub use engine::{CampaignEngine, DEFAULT_CONFIDENCE_LEVEL};
pub use error::{CampaignError, Result};
pub use types::{
    Campaign, CampaignReport, CampaignStatus, CampaignVariant, ExecutionSummary, SignificanceResult,
    TargetingCriteria, VariantReport, VariantStats,
};
