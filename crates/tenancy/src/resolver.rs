use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{Result, TenancyError};
use crate::identity::{get_tenant_by_api_key_hash, get_tenant_user};
use crate::types::{Tenant, TenantContext};
use platform_core::types::TenantStatus;

/// Maximum number of api-key-hash → tenant-id pairs kept in the in-process
/// cache. Simple eviction: when full, drop the oldest half.
const CACHE_MAX: usize = 256;

/// Resolves the five-step tenant-context chain from inbound request headers:
/// hash the api key, look up the owning tenant, verify it is active, resolve
/// the caller's membership and role, and assemble a `TenantContext`.
///
/// Hot path: every authenticated request calls `resolve()`. The api-key hash
/// → tenant mapping is cached in memory to avoid a DB round-trip for repeat
/// callers, the same shape `skynet-users::UserResolver` uses for identity
/// lookups.
pub struct TenantResolver {
    db: Arc<Mutex<rusqlite::Connection>>,
    cache: Mutex<HashMap<String, Tenant>>,
    cache_order: Mutex<Vec<String>>,
}

impl TenantResolver {
    pub fn new(db: Arc<Mutex<rusqlite::Connection>>) -> Self {
        Self { db, cache: Mutex::new(HashMap::new()), cache_order: Mutex::new(Vec::new()) }
    }

    pub fn hash_api_key(api_key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(api_key.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Resolve an api key + acting user id into a `TenantContext`.
    ///
    /// Returns `TenantAccessDenied` if the tenant is suspended/canceled, and
    /// `PermissionDenied` if the user has no membership in that tenant and
    /// is not a platform operator.
    pub fn resolve(&self, api_key: &str, user_id: &str) -> Result<TenantContext> {
        let key_hash = Self::hash_api_key(api_key);

        let tenant = if let Some(t) = self.cache_lookup(&key_hash) {
            debug!(tenant_id = %t.id, "tenant cache hit");
            t
        } else {
            let conn = self.db.lock().unwrap();
            let tenant = get_tenant_by_api_key_hash(&conn, &key_hash)?
                .ok_or_else(|| TenancyError::TenantNotFound(key_hash.clone()))?;
            self.cache_insert(key_hash.clone(), tenant.clone());
            tenant
        };

        if !matches!(tenant.status, TenantStatus::Active | TenantStatus::Trial) {
            return Err(TenancyError::PermissionDenied(format!(
                "tenant {} is {}",
                tenant.id, tenant.status
            )));
        }

        let conn = self.db.lock().unwrap();
        if let Some(user) = crate::identity::get_user(&conn, user_id)? {
            if user.is_platform_operator {
                return Ok(TenantContext {
                    tenant_id: tenant.id.into(),
                    user_id: user_id.to_string(),
                    role: crate::types::Role::Owner,
                    is_platform_operator: true,
                });
            }
        }

        let membership = get_tenant_user(&conn, &tenant.id, user_id)?
            .ok_or_else(|| TenancyError::PermissionDenied("no tenant membership".to_string()))?;

        Ok(TenantContext {
            tenant_id: tenant.id.into(),
            user_id: user_id.to_string(),
            role: membership.role,
            is_platform_operator: false,
        })
    }

    /// Drop a cached tenant, e.g. after its api key is rotated.
    pub fn invalidate(&self, api_key: &str) {
        let key_hash = Self::hash_api_key(api_key);
        let mut cache = self.cache.lock().unwrap();
        let mut order = self.cache_order.lock().unwrap();
        cache.remove(&key_hash);
        order.retain(|k| k != &key_hash);
    }

    fn cache_lookup(&self, key_hash: &str) -> Option<Tenant> {
        self.cache.lock().unwrap().get(key_hash).cloned()
    }

    fn cache_insert(&self, key_hash: String, tenant: Tenant) {
        let mut cache = self.cache.lock().unwrap();
        let mut order = self.cache_order.lock().unwrap();

        if cache.contains_key(&key_hash) {
            cache.insert(key_hash, tenant);
            return;
        }

        if cache.len() >= CACHE_MAX {
            let evict_count = CACHE_MAX / 2;
            let to_remove: Vec<_> = order.drain(..evict_count).collect();
            for k in to_remove {
                cache.remove(&k);
            }
        }

        order.push(key_hash.clone());
        cache.insert(key_hash, tenant);
    }
}
