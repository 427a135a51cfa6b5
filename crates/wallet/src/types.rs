use serde::{Deserialize, Serialize};

/// A withdrawal's lifecycle. `Approved` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Rejected,
}

impl std::fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for WithdrawalStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown withdrawal status: {other}")),
        }
    }
}

/// A tenant's request to move funds out of the platform, subject to
/// four-eyes approval (spec §4.1, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: String,
    pub tenant_id: String,
    pub requested_by: String,
    pub approved_by: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub status: WithdrawalStatus,
    pub created_at: String,
    pub updated_at: String,
}
