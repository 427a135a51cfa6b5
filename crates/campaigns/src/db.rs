use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::error::{CampaignError, Result};
use crate::types::{Campaign, CampaignStatus, CampaignVariant, TargetingCriteria, VariantStats};
use messaging::Customer;

pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS campaigns (
            id          TEXT NOT NULL PRIMARY KEY,
            tenant_id   TEXT NOT NULL,
            name        TEXT NOT NULL,
            criteria    TEXT NOT NULL,
            variants    TEXT NOT NULL,
            is_ab_test  INTEGER NOT NULL,
            status      TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_campaigns_tenant ON campaigns(tenant_id);

        CREATE TABLE IF NOT EXISTS campaign_variant_stats (
            campaign_id TEXT NOT NULL,
            variant_key TEXT NOT NULL,
            targeted    INTEGER NOT NULL DEFAULT 0,
            delivered   INTEGER NOT NULL DEFAULT 0,
            failed      INTEGER NOT NULL DEFAULT 0,
            skipped_no_consent INTEGER NOT NULL DEFAULT 0,
            read        INTEGER NOT NULL DEFAULT 0,
            response    INTEGER NOT NULL DEFAULT 0,
            conversion  INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (campaign_id, variant_key)
        );

        CREATE TABLE IF NOT EXISTS campaign_assignments (
            campaign_id TEXT NOT NULL,
            customer_id TEXT NOT NULL,
            variant_key TEXT NOT NULL,
            assigned_at TEXT NOT NULL,
            PRIMARY KEY (campaign_id, customer_id)
        );

        CREATE TABLE IF NOT EXISTS customer_tags (
            tenant_id   TEXT NOT NULL,
            customer_id TEXT NOT NULL,
            tag         TEXT NOT NULL,
            PRIMARY KEY (customer_id, tag)
        );
        CREATE INDEX IF NOT EXISTS idx_customer_tags_tag ON customer_tags(tenant_id, tag);",
    )
}

pub fn add_customer_tag(conn: &Connection, tenant_id: &str, customer_id: &str, tag: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO customer_tags (tenant_id, customer_id, tag) VALUES (?1, ?2, ?3)",
        params![tenant_id, customer_id, tag],
    )?;
    Ok(())
}

pub fn create_campaign(
    conn: &Connection,
    tenant_id: &str,
    name: &str,
    criteria: &TargetingCriteria,
    variants: &[CampaignVariant],
    is_ab_test: bool,
) -> Result<Campaign> {
    let id = Uuid::now_v7().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    let criteria_json = serde_json::to_string(criteria)?;
    let variants_json = serde_json::to_string(variants)?;
    conn.execute(
        "INSERT INTO campaigns (id, tenant_id, name, criteria, variants, is_ab_test, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'draft', ?7, ?7)",
        params![id, tenant_id, name, criteria_json, variants_json, is_ab_test, now],
    )?;
    for v in variants {
        conn.execute(
            "INSERT INTO campaign_variant_stats (campaign_id, variant_key) VALUES (?1, ?2)",
            params![id, v.key],
        )?;
    }
    get_campaign(conn, &id)?.ok_or_else(|| CampaignError::NotFound(id))
}

pub fn get_campaign(conn: &Connection, id: &str) -> Result<Option<Campaign>> {
    conn.query_row(
        "SELECT id, tenant_id, name, criteria, variants, is_ab_test, status, created_at, updated_at
         FROM campaigns WHERE id = ?1",
        params![id],
        row_to_campaign,
    )
    .optional()
    .map_err(CampaignError::Database)?
    .transpose()
}

pub fn set_status(conn: &Connection, id: &str, status: CampaignStatus) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    let n = conn.execute(
        "UPDATE campaigns SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.to_string(), now, id],
    )?;
    if n == 0 {
        return Err(CampaignError::NotFound(id.to_string()));
    }
    Ok(())
}

fn row_to_campaign(row: &Row) -> rusqlite::Result<Result<Campaign>> {
    let criteria_json: String = row.get(3)?;
    let variants_json: String = row.get(4)?;
    let status_str: String = row.get(6)?;
    Ok((|| {
        Ok(Campaign {
            id: row.get(0)?,
            tenant_id: row.get(1)?,
            name: row.get(2)?,
            criteria: serde_json::from_str(&criteria_json)?,
            variants: serde_json::from_str(&variants_json)?,
            is_ab_test: row.get(5)?,
            status: status_str.parse().unwrap_or(CampaignStatus::Draft),
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    })())
}

/// Customers with `consent_promotional = true` matching every populated
/// criterion (spec §4.10 step 1). Tag/activity/purchase filters are applied
/// as set intersections in SQL rather than in-memory to scale to large
/// audiences.
pub fn compute_audience(conn: &Connection, tenant_id: &str, criteria: &TargetingCriteria) -> Result<Vec<Customer>> {
    let mut sql = String::from(
        "SELECT DISTINCT c.id, c.tenant_id, c.phone_e164, c.display_name, c.language, c.timezone,
            c.consent_transactional, c.consent_reminder, c.consent_promotional, c.created_at, c.updated_at
         FROM customers c WHERE c.tenant_id = ?1 AND c.consent_promotional = 1",
    );
    let mut idx = 2;
    let mut param_values: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(tenant_id.to_string())];

    for tag in &criteria.tags {
        sql.push_str(&format!(
            " AND EXISTS (SELECT 1 FROM customer_tags t WHERE t.customer_id = c.id AND t.tag = ?{idx})"
        ));
        param_values.push(Box::new(tag.clone()));
        idx += 1;
    }
    if let Some(since) = &criteria.purchased_since {
        sql.push_str(&format!(
            " AND EXISTS (SELECT 1 FROM orders o WHERE o.customer_id = c.id AND o.status = 'paid' AND o.created_at >= ?{idx})"
        ));
        param_values.push(Box::new(since.clone()));
        idx += 1;
    }
    if let Some(since) = &criteria.active_since {
        sql.push_str(&format!(
            " AND EXISTS (SELECT 1 FROM messages m JOIN conversations conv ON conv.id = m.conversation_id
                WHERE conv.customer_id = c.id AND m.created_at >= ?{idx})"
        ));
        param_values.push(Box::new(since.clone()));
        #[allow(unused_assignments)]
        {
            idx += 1;
        }
    }

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = param_values.iter().map(|b| b.as_ref()).collect();
    let rows = stmt.query_map(param_refs.as_slice(), |row| {
        Ok(Customer {
            id: row.get(0)?,
            tenant_id: row.get(1)?,
            phone_e164: row.get(2)?,
            display_name: row.get(3)?,
            language: row.get(4)?,
            timezone: row.get(5)?,
            consent_transactional: row.get(6)?,
            consent_reminder: row.get(7)?,
            consent_promotional: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    })?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

pub fn assign_variant(conn: &Connection, campaign_id: &str, customer_id: &str, variant_key: &str) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT OR REPLACE INTO campaign_assignments (campaign_id, customer_id, variant_key, assigned_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![campaign_id, customer_id, variant_key, now],
    )?;
    Ok(())
}

pub fn bump_stat(conn: &Connection, campaign_id: &str, variant_key: &str, column: &str) -> Result<()> {
    debug_assert!(matches!(
        column,
        "targeted" | "delivered" | "failed" | "skipped_no_consent" | "read" | "response" | "conversion"
    ));
    conn.execute(
        &format!(
            "UPDATE campaign_variant_stats SET {column} = {column} + 1 WHERE campaign_id = ?1 AND variant_key = ?2"
        ),
        params![campaign_id, variant_key],
    )?;
    Ok(())
}

pub fn variant_stats(conn: &Connection, campaign_id: &str, variant_key: &str) -> Result<VariantStats> {
    conn.query_row(
        "SELECT targeted, delivered, failed, skipped_no_consent, read, response, conversion
         FROM campaign_variant_stats WHERE campaign_id = ?1 AND variant_key = ?2",
        params![campaign_id, variant_key],
        |row| {
            Ok(VariantStats {
                targeted: row.get(0)?,
                delivered: row.get(1)?,
                failed: row.get(2)?,
                skipped_no_consent: row.get(3)?,
                read: row.get(4)?,
                response: row.get(5)?,
                conversion: row.get(6)?,
            })
        },
    )
    .map_err(CampaignError::Database)
}
