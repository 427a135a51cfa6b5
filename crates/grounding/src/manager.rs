use std::sync::Mutex;

use rusqlite::Connection;
use tracing::warn;

use crate::error::{GroundingError, Result};
use crate::types::{CatalogItem, Claim, GroundingVerdict};

/// Owns the tenant-scoped product catalog and validates AI-agent claims
/// against it before a message reaches a customer (spec §4.6).
///
/// Retrieval prefers the FTS5 index (fuzzy, ranked); if the FTS5 query
/// itself errors — a corrupt index, a reserved-token query string — search
/// degrades to a plain `LIKE` scan rather than failing the whole turn, the
/// graceful-degradation behavior called out in the design notes.
pub struct GroundingValidator {
    db: Mutex<Connection>,
}

impl GroundingValidator {
    pub fn new(conn: Connection) -> Self {
        Self { db: Mutex::new(conn) }
    }

    pub fn upsert_item(
        &self,
        tenant_id: &str,
        sku: &str,
        name: &str,
        description: &str,
        price_cents: i64,
        currency: &str,
        in_stock: bool,
    ) -> Result<CatalogItem> {
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();

        let existing_id: Option<i64> = db
            .query_row(
                "SELECT id FROM catalog_items WHERE tenant_id = ?1 AND sku = ?2",
                rusqlite::params![tenant_id, sku],
                |row| row.get(0),
            )
            .ok();

        let id = if let Some(id) = existing_id {
            db.execute(
                "UPDATE catalog_items SET name=?2, description=?3, price_cents=?4,
                    currency=?5, in_stock=?6, updated_at=?7
                 WHERE id=?1",
                rusqlite::params![id, name, description, price_cents, currency, in_stock as i32, now],
            )?;
            crate::db::sync_fts_delete(&db, id, name, description).ok();
            crate::db::sync_fts_insert(&db, id, name, description)?;
            id
        } else {
            db.execute(
                "INSERT INTO catalog_items
                    (tenant_id, sku, name, description, price_cents, currency, in_stock, created_at, updated_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?8)",
                rusqlite::params![tenant_id, sku, name, description, price_cents, currency, in_stock as i32, now],
            )?;
            let id = db.last_insert_rowid();
            crate::db::sync_fts_insert(&db, id, name, description)?;
            id
        };

        Ok(CatalogItem {
            id,
            tenant_id: tenant_id.to_string(),
            sku: sku.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            price_cents,
            currency: currency.to_string(),
            in_stock,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Ranked fuzzy search via FTS5, falling back to a LIKE scan if the FTS5
    /// query fails to parse (e.g. the customer's text contains FTS5 special
    /// syntax like `"` or `-`).
    pub fn search(&self, tenant_id: &str, query: &str, limit: usize) -> Result<Vec<CatalogItem>> {
        let db = self.db.lock().unwrap();
        match search_fts(&db, tenant_id, query, limit) {
            Ok(items) if !items.is_empty() => Ok(items),
            Ok(_) => search_like(&db, tenant_id, query, limit),
            Err(e) => {
                warn!(error = %e, "fts5 search failed, falling back to LIKE scan");
                search_like(&db, tenant_id, query, limit)
            }
        }
    }

    pub fn find_by_name(&self, tenant_id: &str, name: &str) -> Result<Option<CatalogItem>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT id, tenant_id, sku, name, description, price_cents, currency, in_stock,
                    created_at, updated_at
             FROM catalog_items WHERE tenant_id = ?1 AND lower(name) = lower(?2)",
            rusqlite::params![tenant_id, name],
            row_to_item,
        ) {
            Ok(item) => Ok(Some(item)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(GroundingError::Database(e)),
        }
    }

    /// Number of catalog items a tenant has imported, used by onboarding
    /// status to tell whether the catalog step is done.
    pub fn count_items(&self, tenant_id: &str) -> Result<i64> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT COUNT(*) FROM catalog_items WHERE tenant_id = ?1",
            rusqlite::params![tenant_id],
            |row| row.get(0),
        )
        .map_err(GroundingError::Database)
    }

    /// Validates a single claim the agent is about to send against the
    /// catalog. Unmatched subjects are reported as `NoMatchingItem` rather
    /// than passed, so the orchestrator always has to make an explicit
    /// decision about ungrounded claims instead of defaulting to "fine".
    pub fn validate_claim(&self, tenant_id: &str, claim: &Claim) -> Result<GroundingVerdict> {
        let item_name = match claim {
            Claim::Price { item_name, .. } => item_name,
            Claim::Availability { item_name, .. } => item_name,
        };

        let Some(item) = self.find_by_name(tenant_id, item_name)? else {
            let matches = self.search(tenant_id, item_name, 1)?;
            let Some(item) = matches.into_iter().next() else {
                return Ok(GroundingVerdict::NoMatchingItem);
            };
            return Ok(judge(claim, &item));
        };

        Ok(judge(claim, &item))
    }
}

fn judge(claim: &Claim, item: &CatalogItem) -> GroundingVerdict {
    match claim {
        Claim::Price { claimed_cents, .. } => {
            if *claimed_cents == item.price_cents {
                GroundingVerdict::Grounded
            } else {
                GroundingVerdict::Contradicted {
                    catalog_value: format!("{} {}", item.price_cents, item.currency),
                }
            }
        }
        Claim::Availability { claimed_in_stock, .. } => {
            if *claimed_in_stock == item.in_stock {
                GroundingVerdict::Grounded
            } else {
                GroundingVerdict::Contradicted { catalog_value: item.in_stock.to_string() }
            }
        }
    }
}

fn search_fts(
    conn: &Connection,
    tenant_id: &str,
    query: &str,
    limit: usize,
) -> Result<Vec<CatalogItem>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.tenant_id, c.sku, c.name, c.description, c.price_cents, c.currency,
                c.in_stock, c.created_at, c.updated_at
         FROM catalog_items c
         JOIN catalog_items_fts f ON c.id = f.rowid
         WHERE c.tenant_id = ?1 AND catalog_items_fts MATCH ?2
         ORDER BY rank
         LIMIT ?3",
    )?;
    let rows = stmt.query_map(rusqlite::params![tenant_id, query, limit as i64], row_to_item)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

fn search_like(conn: &Connection, tenant_id: &str, query: &str, limit: usize) -> Result<Vec<CatalogItem>> {
    let pattern = format!("%{}%", query.replace('%', ""));
    let mut stmt = conn.prepare(
        "SELECT id, tenant_id, sku, name, description, price_cents, currency, in_stock,
                created_at, updated_at
         FROM catalog_items
         WHERE tenant_id = ?1 AND (name LIKE ?2 OR description LIKE ?2)
         LIMIT ?3",
    )?;
    let rows = stmt.query_map(rusqlite::params![tenant_id, pattern, limit as i64], row_to_item)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<CatalogItem> {
    Ok(CatalogItem {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        sku: row.get(2)?,
        name: row.get(3)?,
        description: row.get(4)?,
        price_cents: row.get(5)?,
        currency: row.get(6)?,
        in_stock: row.get::<_, i64>(7)? != 0,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> GroundingValidator {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        GroundingValidator::new(conn)
    }

    #[test]
    fn price_claim_matches_catalog() {
        let v = validator();
        v.upsert_item("t1", "sku-1", "Blue Jacket", "warm jacket", 4999, "USD", true).unwrap();
        let verdict = v
            .validate_claim(
                "t1",
                &Claim::Price { item_name: "Blue Jacket".to_string(), claimed_cents: 4999 },
            )
            .unwrap();
        assert_eq!(verdict, GroundingVerdict::Grounded);
    }

    #[test]
    fn price_claim_contradicts_catalog() {
        let v = validator();
        v.upsert_item("t1", "sku-1", "Blue Jacket", "warm jacket", 4999, "USD", true).unwrap();
        let verdict = v
            .validate_claim(
                "t1",
                &Claim::Price { item_name: "Blue Jacket".to_string(), claimed_cents: 1000 },
            )
            .unwrap();
        assert!(matches!(verdict, GroundingVerdict::Contradicted { .. }));
    }

    #[test]
    fn unmatched_item_reports_no_match() {
        let v = validator();
        let verdict = v
            .validate_claim(
                "t1",
                &Claim::Price { item_name: "Nonexistent Gadget".to_string(), claimed_cents: 100 },
            )
            .unwrap();
        assert_eq!(verdict, GroundingVerdict::NoMatchingItem);
    }

    #[test]
    fn fuzzy_search_finds_partial_name() {
        let v = validator();
        v.upsert_item("t1", "sku-1", "Blue Jacket", "warm jacket for winter", 4999, "USD", true).unwrap();
        let results = v.search("t1", "jacket", 5).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].sku, "sku-1");
    }
}
