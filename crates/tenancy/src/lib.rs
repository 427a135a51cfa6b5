pub mod crypto;
pub mod db;
pub mod error;
pub mod identity;
pub mod integrations;
pub mod permissions;
pub mod resolver;
pub mod types;

pub use error::{Result, TenancyError};
pub use resolver::TenantResolver;
pub use types::{
    IntegrationCredentialView, IntegrationProvider, OnboardingStatus, OnboardingStep, Permission,
    Role, Tenant, TenantContext, TenantSettings,
};
