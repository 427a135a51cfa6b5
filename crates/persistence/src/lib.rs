use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::info;

/// Opens (or creates) the platform's SQLite database and runs every owning
/// crate's `init_db` against it, in dependency order, inside one process.
/// Mirrors `skynet-memory::db::init_db` / `skynet-scheduler::db::init_db`
/// being called once at startup, generalized across every table-owning crate
/// in this workspace rather than just one.
///
/// A single writer connection behind a mutex is used rather than a pool: the
/// checkout state machine and the four-eyes approval flow both need
/// `BEGIN IMMEDIATE`-style transactional guarantees that are simplest to
/// reason about against one connection.
pub fn bootstrap(db_path: &str) -> rusqlite::Result<Arc<Mutex<Connection>>> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

    tenancy::db::init_db(&conn)?;
    info!("tenancy schema ready");
    harmonizer::db::init_db(&conn)?;
    info!("harmonizer schema ready");
    reference_ctx::db::init_db(&conn)?;
    info!("reference_ctx schema ready");
    grounding::db::init_db(&conn)?;
    info!("grounding schema ready");
    messaging::db::init_db(&conn)?;
    info!("messaging schema ready");
    checkout::db::init_db(&conn)?;
    info!("checkout schema ready");
    scheduler::db::init_db(&conn)?;
    info!("scheduler schema ready");
    campaigns::db::init_db(&conn)?;
    info!("campaigns schema ready");
    outbox::db::init_db(&conn)?;
    info!("outbox schema ready");

    Ok(Arc::new(Mutex::new(conn)))
}

/// In-memory variant used by integration tests across crates.
pub fn bootstrap_in_memory() -> rusqlite::Result<Arc<Mutex<Connection>>> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;

    tenancy::db::init_db(&conn)?;
    harmonizer::db::init_db(&conn)?;
    reference_ctx::db::init_db(&conn)?;
    grounding::db::init_db(&conn)?;
    messaging::db::init_db(&conn)?;
    checkout::db::init_db(&conn)?;
    scheduler::db::init_db(&conn)?;
    campaigns::db::init_db(&conn)?;
    outbox::db::init_db(&conn)?;

    Ok(Arc::new(Mutex::new(conn)))
}
