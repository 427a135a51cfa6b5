//! Per-tenant third-party integration credentials (spec §3, §6
//! `PUT /v1/settings/integrations/{provider}`). Credentials are sealed with
//! `crate::crypto` before they ever reach SQLite; callers at the API
//! boundary only ever see `IntegrationCredentialView`, never the plaintext.

use chrono::Utc;
use rusqlite::{params, Connection};

use crate::crypto::{decrypt_credential, encrypt_credential, EncryptedCredential};
use crate::error::Result;
use crate::types::{IntegrationCredentialView, IntegrationProvider};

fn last_four(plaintext: &str) -> String {
    let chars: Vec<char> = plaintext.chars().collect();
    let start = chars.len().saturating_sub(4);
    chars[start..].iter().collect()
}

/// Encrypts and upserts one tenant's credential for `provider`. Returns the
/// masked view, never the plaintext that was just stored.
pub fn upsert_integration_credential(
    conn: &Connection,
    encryption_key_hex: &str,
    tenant_id: &str,
    provider: IntegrationProvider,
    plaintext_credential: &str,
) -> Result<IntegrationCredentialView> {
    let enc = encrypt_credential(encryption_key_hex, plaintext_credential)?;
    let now = Utc::now().to_rfc3339();
    let last_four = last_four(plaintext_credential);

    conn.execute(
        "INSERT INTO tenant_integrations
            (tenant_id, provider, ciphertext, nonce, last_four, created_at, updated_at)
         VALUES (?1,?2,?3,?4,?5,?6,?6)
         ON CONFLICT(tenant_id, provider) DO UPDATE SET
            ciphertext = excluded.ciphertext,
            nonce = excluded.nonce,
            last_four = excluded.last_four,
            updated_at = excluded.updated_at",
        params![tenant_id, provider.to_string(), enc.ciphertext_b64, enc.nonce_b64, last_four, now],
    )?;

    Ok(IntegrationCredentialView {
        provider,
        configured: true,
        last_four: Some(last_four),
        updated_at: Some(now),
    })
}

/// Decrypts a tenant's stored credential for `provider`, for internal
/// callers that actually need to call the provider (e.g. a telephony or
/// payment adapter resolving per-tenant keys at send time).
pub fn get_integration_credential(
    conn: &Connection,
    encryption_key_hex: &str,
    tenant_id: &str,
    provider: IntegrationProvider,
) -> Result<Option<String>> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT ciphertext, nonce FROM tenant_integrations WHERE tenant_id = ?1 AND provider = ?2",
            params![tenant_id, provider.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .ok();

    match row {
        Some((ciphertext_b64, nonce_b64)) => {
            let plaintext = decrypt_credential(encryption_key_hex, &EncryptedCredential { ciphertext_b64, nonce_b64 })?;
            Ok(Some(plaintext))
        }
        None => Ok(None),
    }
}

/// Masked view of every integration a tenant has configured. Unconfigured
/// providers are simply absent rather than listed with `configured: false`
/// — callers that need the full provider set (e.g. onboarding status) pair
/// this with the known provider list themselves.
pub fn list_integration_credentials(conn: &Connection, tenant_id: &str) -> Result<Vec<IntegrationCredentialView>> {
    let mut stmt = conn.prepare(
        "SELECT provider, last_four, updated_at FROM tenant_integrations WHERE tenant_id = ?1 ORDER BY provider",
    )?;
    let rows = stmt
        .query_map(params![tenant_id], |row| {
            let provider: String = row.get(0)?;
            let last_four: String = row.get(1)?;
            let updated_at: String = row.get(2)?;
            Ok((provider, last_four, updated_at))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows
        .into_iter()
        .filter_map(|(provider, last_four, updated_at)| {
            provider.parse().ok().map(|provider| IntegrationCredentialView {
                provider,
                configured: true,
                last_four: Some(last_four),
                updated_at: Some(updated_at),
            })
        })
        .collect())
}

pub fn has_integration(conn: &Connection, tenant_id: &str, provider: IntegrationProvider) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM tenant_integrations WHERE tenant_id = ?1 AND provider = ?2",
        params![tenant_id, provider.to_string()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        conn.execute(
            "INSERT INTO tenants (id, name, status, subscription_tier, api_key_hash, created_at, updated_at)
             VALUES ('t1','Acme','trial','starter','hash','now','now')",
            [],
        )
        .unwrap();
        conn
    }

    const KEY: &str = "11111111111111111111111111111111111111111111111111111111111111";

    #[test]
    fn upsert_masks_the_stored_credential() {
        let conn = conn();
        let view = upsert_integration_credential(&conn, KEY, "t1", IntegrationProvider::Stripe, "sk_live_abcdef1234").unwrap();
        assert!(view.configured);
        assert_eq!(view.last_four.as_deref(), Some("1234"));
    }

    #[test]
    fn get_integration_credential_round_trips_the_plaintext() {
        let conn = conn();
        upsert_integration_credential(&conn, KEY, "t1", IntegrationProvider::Stripe, "sk_live_abcdef1234").unwrap();
        let plaintext = get_integration_credential(&conn, KEY, "t1", IntegrationProvider::Stripe).unwrap();
        assert_eq!(plaintext.as_deref(), Some("sk_live_abcdef1234"));
    }

    #[test]
    fn has_integration_reflects_upserts() {
        let conn = conn();
        assert!(!has_integration(&conn, "t1", IntegrationProvider::Stripe).unwrap());
        upsert_integration_credential(&conn, KEY, "t1", IntegrationProvider::Stripe, "sk_live_abcdef1234").unwrap();
        assert!(has_integration(&conn, "t1", IntegrationProvider::Stripe).unwrap());
    }
}
