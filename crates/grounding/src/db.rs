use rusqlite::{Connection, Result};

/// Initialise catalog tables. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_catalog_table(conn)?;
    create_fts_index(conn)?;
    Ok(())
}

fn create_catalog_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS catalog_items (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            tenant_id   TEXT NOT NULL,
            sku         TEXT NOT NULL,
            name        TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            price_cents INTEGER NOT NULL,
            currency    TEXT NOT NULL DEFAULT 'USD',
            in_stock    INTEGER NOT NULL DEFAULT 1,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL,
            UNIQUE(tenant_id, sku)
        );
        CREATE INDEX IF NOT EXISTS idx_catalog_tenant ON catalog_items(tenant_id);",
    )
}

/// FTS5 index over name/description for fuzzy catalog retrieval.
/// content='' keeps this an external-content table synced manually on write,
/// the same shape `skynet-memory`'s `user_memory_fts` uses.
fn create_fts_index(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE VIRTUAL TABLE IF NOT EXISTS catalog_items_fts
            USING fts5(name, description, content='catalog_items', content_rowid='id');",
    )
}

pub fn sync_fts_insert(conn: &Connection, id: i64, name: &str, description: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO catalog_items_fts(rowid, name, description) VALUES (?1, ?2, ?3)",
        rusqlite::params![id, name, description],
    )?;
    Ok(())
}

pub fn sync_fts_delete(conn: &Connection, id: i64, name: &str, description: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO catalog_items_fts(catalog_items_fts, rowid, name, description)
         VALUES ('delete', ?1, ?2, ?3)",
        rusqlite::params![id, name, description],
    )?;
    Ok(())
}
