use serde::{Deserialize, Serialize};

/// Audience predicate (spec §4.10 step 1). A customer qualifies when every
/// populated field matches; `None` fields are not filtered on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetingCriteria {
    pub tags: Vec<String>,
    pub purchased_since: Option<String>,
    pub active_since: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignVariant {
    pub key: String,
    pub template_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Sending,
    Completed,
    Canceled,
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Draft => "draft",
            Self::Scheduled => "scheduled",
            Self::Sending => "sending",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "scheduled" => Ok(Self::Scheduled),
            "sending" => Ok(Self::Sending),
            "completed" => Ok(Self::Completed),
            "canceled" => Ok(Self::Canceled),
            other => Err(format!("unknown campaign status: {other}")),
        }
    }
}

/// Tenant-scoped campaign. `criteria`/`variants` round-trip through JSON
/// columns; `is_ab_test` gates whether the audience is partitioned across
/// `variants` or sent uniformly using the first one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub criteria: TargetingCriteria,
    pub variants: Vec<CampaignVariant>,
    pub is_ab_test: bool,
    pub status: CampaignStatus,
    pub created_at: String,
    pub updated_at: String,
}

/// Per-variant engagement counters accumulated during and after execution
/// (spec §4.10 steps 3-4).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct VariantStats {
    pub targeted: u64,
    pub delivered: u64,
    pub failed: u64,
    pub skipped_no_consent: u64,
    pub read: u64,
    pub response: u64,
    pub conversion: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantReport {
    pub key: String,
    pub template_name: String,
    pub stats: VariantStats,
}

/// Outcome of the two-proportion significance test over exactly two variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignificanceResult {
    pub z_score: f64,
    pub confidence_level: f64,
    pub significant: bool,
    pub winner: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignReport {
    pub campaign_id: String,
    pub variants: Vec<VariantReport>,
    pub significance: Option<SignificanceResult>,
}

/// Accumulated outcome of a single `execute()` call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub targeted: u64,
    pub delivered: u64,
    pub failed: u64,
    pub skipped_no_consent: u64,
}
