use serde::{Deserialize, Serialize};

use platform_core::types::{SubscriptionTier, TenantId, TenantStatus};

/// A platform tenant (one WhatsApp-selling business).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub status: TenantStatus,
    pub subscription_tier: SubscriptionTier,
    /// Hashed API key used by the gateway's tenant-resolution middleware.
    pub api_key_hash: String,
    pub whatsapp_phone_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

/// Per-tenant overridable behavior — quiet hours, harmonizer window,
/// consent policy. Falls back to `PlatformConfig` defaults when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantSettings {
    pub tenant_id: String,
    pub quiet_hours_start_minute: Option<u16>,
    pub quiet_hours_end_minute: Option<u16>,
    pub harmonizer_window_secs: Option<u64>,
    pub consent_required: bool,
    pub timezone: String,
    pub fallback_message: Option<String>,
    pub handoff_message: Option<String>,
    /// Shared secret the WhatsApp and payment-provider webhooks are
    /// HMAC-signed against. `None` means the tenant has not configured
    /// webhook delivery yet.
    pub webhook_secret: Option<String>,
}

impl Default for TenantSettings {
    fn default() -> Self {
        Self {
            tenant_id: String::new(),
            quiet_hours_start_minute: None,
            quiet_hours_end_minute: None,
            harmonizer_window_secs: None,
            consent_required: true,
            timezone: "UTC".to_string(),
            webhook_secret: None,
            fallback_message: None,
            handoff_message: None,
        }
    }
}

/// A third-party integration a tenant can connect (spec §3's "telephony,
/// e-commerce, LLM providers, payment providers" categories).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationProvider {
    Whatsapp,
    Shopify,
    Stripe,
    Anthropic,
    OpenAi,
}

impl std::fmt::Display for IntegrationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Whatsapp => "whatsapp",
            Self::Shopify => "shopify",
            Self::Stripe => "stripe",
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for IntegrationProvider {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "whatsapp" => Ok(Self::Whatsapp),
            "shopify" => Ok(Self::Shopify),
            "stripe" => Ok(Self::Stripe),
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            other => Err(format!("unknown integration provider: {other}")),
        }
    }
}

/// Masked view of a stored integration credential. API responses never
/// return the decrypted value — only whether one is configured and the
/// last four characters, enough for a tenant to recognize which key is live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationCredentialView {
    pub provider: IntegrationProvider,
    pub configured: bool,
    pub last_four: Option<String>,
    pub updated_at: Option<String>,
}

/// A step in the guided tenant setup flow (spec §3's "onboarding-step map").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStep {
    ConnectWhatsapp,
    ImportCatalog,
    ConnectPayments,
    InviteTeam,
}

impl std::fmt::Display for OnboardingStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ConnectWhatsapp => "connect_whatsapp",
            Self::ImportCatalog => "import_catalog",
            Self::ConnectPayments => "connect_payments",
            Self::InviteTeam => "invite_team",
        };
        write!(f, "{s}")
    }
}

impl OnboardingStep {
    pub const ALL: [OnboardingStep; 4] =
        [Self::ConnectWhatsapp, Self::ImportCatalog, Self::ConnectPayments, Self::InviteTeam];
}

/// One entry of `GET /v1/settings/onboarding` (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardingStatus {
    pub step: OnboardingStep,
    pub completed: bool,
}

/// A platform operator or tenant staff account. Platform operators have
/// `tenant_id = None` and bypass tenant scoping entirely (§4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub is_platform_operator: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Built-in roles. `RolePermission` rows seed each role's default grants;
/// `UserPermission` rows let an individual membership override them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Manager,
    Agent,
    Viewer,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Owner => "owner",
            Self::Manager => "manager",
            Self::Agent => "agent",
            Self::Viewer => "viewer",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Self::Owner),
            "manager" => Ok(Self::Manager),
            "agent" => Ok(Self::Agent),
            "viewer" => Ok(Self::Viewer),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// A single capability a membership can be granted or denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ManageTenantSettings,
    ManageUsers,
    ManageCampaigns,
    SendManualMessages,
    ViewConversations,
    ManageCatalog,
    ApproveWithdrawals,
    ViewBilling,
    ManageIntegrations,
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ManageTenantSettings => "manage_tenant_settings",
            Self::ManageUsers => "manage_users",
            Self::ManageCampaigns => "manage_campaigns",
            Self::SendManualMessages => "send_manual_messages",
            Self::ViewConversations => "view_conversations",
            Self::ManageCatalog => "manage_catalog",
            Self::ApproveWithdrawals => "approve_withdrawals",
            Self::ViewBilling => "view_billing",
            Self::ManageIntegrations => "manage_integrations",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Permission {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manage_tenant_settings" => Ok(Self::ManageTenantSettings),
            "manage_users" => Ok(Self::ManageUsers),
            "manage_campaigns" => Ok(Self::ManageCampaigns),
            "send_manual_messages" => Ok(Self::SendManualMessages),
            "view_conversations" => Ok(Self::ViewConversations),
            "manage_catalog" => Ok(Self::ManageCatalog),
            "approve_withdrawals" => Ok(Self::ApproveWithdrawals),
            "view_billing" => Ok(Self::ViewBilling),
            "manage_integrations" => Ok(Self::ManageIntegrations),
            other => Err(format!("unknown permission: {other}")),
        }
    }
}

/// Default grant for a (role, permission) pair. Seeded once at tenant
/// creation (spec §9 "atomic bundled tenant initialization").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePermission {
    pub role: Role,
    pub permission: Permission,
    pub allowed: bool,
}

/// Per-user override of a role's default grant. A `UserPermission` row
/// always wins over the role default — and an explicit `allowed: false`
/// always wins over an explicit `allowed: true` at the same precedence
/// level (deny-overrides-allow).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPermission {
    pub tenant_id: String,
    pub user_id: String,
    pub permission: Permission,
    pub allowed: bool,
}

/// A tenant membership: one user acting in one tenant with one role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantUser {
    pub tenant_id: String,
    pub user_id: String,
    pub role: Role,
    pub created_at: String,
}

/// Resolved request-scoped context produced by §4.1's five-step resolution.
/// `is_platform_operator` grants bypass over every RBAC and tenant-scoping
/// check downstream.
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub tenant_id: TenantId,
    pub user_id: String,
    pub role: Role,
    pub is_platform_operator: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn role_roundtrips() {
        for r in [Role::Owner, Role::Manager, Role::Agent, Role::Viewer] {
            assert_eq!(Role::from_str(&r.to_string()).unwrap(), r);
        }
    }

    #[test]
    fn permission_roundtrips() {
        for p in [
            Permission::ManageTenantSettings,
            Permission::ApproveWithdrawals,
            Permission::ViewBilling,
        ] {
            assert_eq!(Permission::from_str(&p.to_string()).unwrap(), p);
        }
    }
}
