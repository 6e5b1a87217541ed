//! Database schema definitions
//!
//! This module contains the SQL schema for the URL ledger.

/// SQL schema for the ledger database
pub const SCHEMA_SQL: &str = r#"
-- One row per distinct normalized URL
CREATE TABLE IF NOT EXISTS urls (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    normalized_url TEXT NOT NULL UNIQUE,
    raw_url TEXT NOT NULL,
    status TEXT NOT NULL,
    content_hash TEXT,
    process_count INTEGER NOT NULL DEFAULT 1,
    error_message TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_urls_status ON urls(status);
CREATE INDEX IF NOT EXISTS idx_urls_hash ON urls(content_hash);
CREATE INDEX IF NOT EXISTS idx_urls_created ON urls(created_at);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
