//! SQLite ledger implementation
//!
//! This module provides a SQLite-based implementation of the Ledger trait.
//! Registration uses a single conflict-handling statement, so concurrent
//! registrations of the same normalized URL can never produce two rows.

use crate::ledger::schema::initialize_schema;
use crate::ledger::traits::{Ledger, LedgerError, LedgerResult, RegisterOutcome};
use crate::ledger::{UrlFilter, UrlRecord, UrlStatus};
use crate::url::canonical;
use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;

/// SQLite ledger backend
pub struct SqliteLedger {
    conn: Connection,
}

impl SqliteLedger {
    /// Creates a new SqliteLedger instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteLedger)` - Successfully opened/created database
    /// * `Err(LedgerError)` - Failed to open database
    pub fn new(path: &Path) -> LedgerResult<Self> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory ledger (for testing)
    pub fn new_in_memory() -> LedgerResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn row_to_record(row: &Row<'_>) -> rusqlite::Result<UrlRecord> {
        Ok(UrlRecord {
            id: row.get(0)?,
            normalized_url: row.get(1)?,
            raw_url: row.get(2)?,
            status: UrlStatus::from_db_string(&row.get::<_, String>(3)?)
                .unwrap_or(UrlStatus::Failed),
            content_hash: row.get(4)?,
            process_count: row.get(5)?,
            error_message: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

const RECORD_COLUMNS: &str = "id, normalized_url, raw_url, status, content_hash, process_count,
     error_message, created_at, updated_at";

impl Ledger for SqliteLedger {
    fn register(&mut self, raw_url: &str) -> LedgerResult<RegisterOutcome> {
        let normalized = canonical(raw_url);
        let now = Utc::now().to_rfc3339();

        // Insert-or-increment in one statement keeps concurrent callers
        // from ever creating two rows for one normalized URL.
        let (id, status, process_count): (i64, String, u32) = self.conn.query_row(
            "INSERT INTO urls (normalized_url, raw_url, status, process_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, 1, ?4, ?4)
             ON CONFLICT(normalized_url)
             DO UPDATE SET process_count = process_count + 1, updated_at = ?4
             RETURNING id, status, process_count",
            params![normalized, raw_url, UrlStatus::Pending.to_db_string(), now],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        Ok(RegisterOutcome {
            id,
            status: UrlStatus::from_db_string(&status).unwrap_or(UrlStatus::Pending),
            process_count,
            newly_created: process_count == 1,
        })
    }

    fn get(&self, id: i64) -> LedgerResult<UrlRecord> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM urls WHERE id = ?1", RECORD_COLUMNS))?;

        stmt.query_row(params![id], Self::row_to_record)
            .optional()?
            .ok_or(LedgerError::RecordNotFound(id))
    }

    fn get_by_url(&self, url: &str) -> LedgerResult<Option<UrlRecord>> {
        let normalized = canonical(url);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM urls WHERE normalized_url = ?1",
            RECORD_COLUMNS
        ))?;

        Ok(stmt
            .query_row(params![normalized], Self::row_to_record)
            .optional()?)
    }

    fn update_status(
        &mut self,
        id: i64,
        status: UrlStatus,
        error_message: Option<&str>,
    ) -> LedgerResult<()> {
        let current = self.get(id)?.status;
        if !UrlStatus::can_transition(current, status) {
            return Err(LedgerError::InvalidTransition {
                from: current,
                to: status,
            });
        }

        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE urls SET status = ?1, error_message = ?2, updated_at = ?3 WHERE id = ?4",
            params![status.to_db_string(), error_message, now, id],
        )?;
        Ok(())
    }

    fn update_hash(&mut self, id: i64, content_hash: &str) -> LedgerResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE urls SET content_hash = ?1, updated_at = ?2 WHERE id = ?3",
            params![content_hash, now, id],
        )?;
        if updated == 0 {
            return Err(LedgerError::RecordNotFound(id));
        }
        Ok(())
    }

    fn get_by_hash(&self, content_hash: &str) -> LedgerResult<Option<UrlRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM urls WHERE content_hash = ?1 ORDER BY id ASC LIMIT 1",
            RECORD_COLUMNS
        ))?;

        Ok(stmt
            .query_row(params![content_hash], Self::row_to_record)
            .optional()?)
    }

    fn hash_exists(&self, content_hash: &str) -> LedgerResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM urls WHERE content_hash = ?1",
            params![content_hash],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn exists(&self, url: &str) -> LedgerResult<bool> {
        let normalized = canonical(url);
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM urls WHERE normalized_url = ?1",
            params![normalized],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn list(&self, filter: &UrlFilter) -> LedgerResult<Vec<UrlRecord>> {
        let mut conditions: Vec<&str> = Vec::new();
        let mut values: Vec<String> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push("status = ?");
            values.push(status.to_db_string().to_string());
        }
        if let Some(after) = filter.created_after {
            conditions.push("created_at >= ?");
            values.push(after.to_rfc3339());
        }
        if let Some(before) = filter.created_before {
            conditions.push("created_at <= ?");
            values.push(before.to_rfc3339());
        }

        let mut sql = format!("SELECT {} FROM urls", RECORD_COLUMNS);
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY id ASC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
            if let Some(offset) = filter.offset {
                sql.push_str(&format!(" OFFSET {}", offset));
            }
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(params_from_iter(values.iter()), Self::row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    fn count_by_status(&self, status: UrlStatus) -> LedgerResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM urls WHERE status = ?1",
            params![status.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_total(&self) -> LedgerResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM urls", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
