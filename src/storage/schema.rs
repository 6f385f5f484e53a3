//! Database schema definitions
//!
//! This module contains the SQL schema of the run-state database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track harvest runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- Crawl frontier queue; seq orders pending URLs first-in first-out
CREATE TABLE IF NOT EXISTS frontier (
    url TEXT NOT NULL UNIQUE,
    status TEXT NOT NULL,
    seq INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_frontier_status_seq ON frontier(status, seq);

-- Fetched entities, keyed like the in-memory entity store
CREATE TABLE IF NOT EXISTS entities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    key TEXT NOT NULL UNIQUE,
    code TEXT,
    url TEXT,
    json TEXT NOT NULL
);

-- Ids issued to entities
CREATE TABLE IF NOT EXISTS assignments (
    entity_key TEXT PRIMARY KEY,
    class TEXT NOT NULL,
    id INTEGER NOT NULL,
    code TEXT NOT NULL,
    has_subclassification INTEGER NOT NULL DEFAULT 0,
    UNIQUE(class, id)
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
