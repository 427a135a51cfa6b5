use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_HARMONIZER_WINDOW_SECS: u64 = 3;
pub const MIN_HARMONIZER_WINDOW_SECS: u64 = 1;
pub const MAX_HARMONIZER_WINDOW_SECS: u64 = 10;

/// Top-level config (platform.toml + PLATFORM_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub rate_limits: RateLimitsConfig,
    #[serde(default)]
    pub harmonizer: HarmonizerConfig,
    #[serde(default)]
    pub quiet_hours: QuietHoursConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            llm: LlmConfig::default(),
            rate_limits: RateLimitsConfig::default(),
            harmonizer: HarmonizerConfig::default(),
            quiet_hours: QuietHoursConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: default_port(), bind: default_bind() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

/// Platform-level LLM defaults. Per-tenant credential overrides live in
/// `TenantSettings`, resolved at call time by `llm::router`; this struct only
/// carries process-wide fallbacks and the handoff/fallback courtesy templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_model")]
    pub default_model: String,
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,
    #[serde(default = "default_handoff_message")]
    pub handoff_message: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            anthropic_api_key: None,
            openai_api_key: None,
            fallback_message: default_fallback_message(),
            handoff_message: default_handoff_message(),
        }
    }
}

/// Default daily quotas applied when a tenant's subscription tier lookup is
/// unavailable. Normal operation reads quotas off `SubscriptionTier`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitsConfig {
    #[serde(default = "default_quota")]
    pub default_daily_quota: u32,
    #[serde(default = "default_burst_per_minute")]
    pub burst_per_minute: u32,
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            default_daily_quota: default_quota(),
            burst_per_minute: default_burst_per_minute(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarmonizerConfig {
    #[serde(default = "default_harmonizer_window")]
    pub window_secs: u64,
}

impl Default for HarmonizerConfig {
    fn default() -> Self {
        Self { window_secs: default_harmonizer_window() }
    }
}

impl HarmonizerConfig {
    /// Clamps to the supported 1-10s range (spec §4.2).
    pub fn clamped_window_secs(&self) -> u64 {
        self.window_secs
            .clamp(MIN_HARMONIZER_WINDOW_SECS, MAX_HARMONIZER_WINDOW_SECS)
    }
}

/// Fallback quiet-hours window used for tenants that have not configured one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuietHoursConfig {
    #[serde(default = "default_quiet_start")]
    pub start_minute: u16,
    #[serde(default = "default_quiet_end")]
    pub end_minute: u16,
}

impl Default for QuietHoursConfig {
    fn default() -> Self {
        Self { start_minute: default_quiet_start(), end_minute: default_quiet_end() }
    }
}

/// Key material for encrypting integration credentials at rest
/// (`TenantSettings`'s "opaque encrypted blobs", spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// 32-byte AES-256-GCM key, hex-encoded. The default is a fixed
    /// development key; any shared deployment must override it via
    /// `PLATFORM_SECURITY_CREDENTIAL_ENCRYPTION_KEY`.
    #[serde(default = "default_credential_encryption_key")]
    pub credential_encryption_key: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self { credential_encryption_key: default_credential_encryption_key() }
    }
}

fn default_credential_encryption_key() -> String {
    "0".repeat(64)
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_model() -> String {
    "claude-sonnet-4-6".to_string()
}
fn default_fallback_message() -> String {
    "Thanks for your message — a member of our team will follow up shortly.".to_string()
}
fn default_handoff_message() -> String {
    "I'm connecting you with a member of our team who can help further.".to_string()
}
fn default_quota() -> u32 {
    250
}
fn default_burst_per_minute() -> u32 {
    20
}
fn default_quiet_start() -> u16 {
    21 * 60
}
fn default_quiet_end() -> u16 {
    8 * 60
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.platform/platform.db", home)
}
fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.platform/platform.toml", home)
}

impl PlatformConfig {
    /// Load config from a TOML file with PLATFORM_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.platform/platform.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path.map(String::from).unwrap_or_else(default_config_path);

        let config: PlatformConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("PLATFORM_").split("_"))
            .extract()
            .map_err(|e| crate::error::PlatformError::Internal(e.to_string()))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn harmonizer_window_clamps_to_supported_range() {
        let cfg = HarmonizerConfig { window_secs: 30 };
        assert_eq!(cfg.clamped_window_secs(), MAX_HARMONIZER_WINDOW_SECS);
        let cfg = HarmonizerConfig { window_secs: 0 };
        assert_eq!(cfg.clamped_window_secs(), MIN_HARMONIZER_WINDOW_SECS);
    }

    #[test]
    fn default_config_has_default_harmonizer_window() {
        let cfg = PlatformConfig::default();
        assert_eq!(cfg.harmonizer.window_secs, DEFAULT_HARMONIZER_WINDOW_SECS);
    }
}
