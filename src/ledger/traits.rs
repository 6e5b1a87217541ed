//! Ledger trait and error types
//!
//! This module defines the trait interface for ledger backends and
//! associated error types.

use crate::ledger::{UrlFilter, UrlRecord, UrlStatus};
use thiserror::Error;

/// Errors that can occur during ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("URL record not found: {0}")]
    RecordNotFound(i64),

    #[error("Invalid status transition: {from:?} -> {to:?}")]
    InvalidTransition { from: UrlStatus, to: UrlStatus },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Outcome of a `register` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterOutcome {
    /// Row id of the normalized URL
    pub id: i64,

    /// Status of the row at registration time (Pending for new rows)
    pub status: UrlStatus,

    /// Process count after this registration
    pub process_count: u32,

    /// Whether this registration created the row
    pub newly_created: bool,
}

/// Trait for ledger backend implementations
///
/// Implementations must make `register` atomic under concurrent callers:
/// two registrations of the same normalized URL must never produce two
/// rows.
pub trait Ledger {
    /// Registers a URL, inserting or incrementing atomically
    ///
    /// The URL is normalized first. If a row for the normalized form
    /// exists, its process count is incremented and the existing id is
    /// returned; otherwise a new Pending row with process count 1 is
    /// created.
    fn register(&mut self, raw_url: &str) -> LedgerResult<RegisterOutcome>;

    /// Gets a record by id
    fn get(&self, id: i64) -> LedgerResult<UrlRecord>;

    /// Gets a record by URL (normalized before lookup)
    fn get_by_url(&self, url: &str) -> LedgerResult<Option<UrlRecord>>;

    /// Updates the status of a record, enforcing legal transitions
    fn update_status(
        &mut self,
        id: i64,
        status: UrlStatus,
        error_message: Option<&str>,
    ) -> LedgerResult<()>;

    /// Records the content checksum of a fetched record
    fn update_hash(&mut self, id: i64, content_hash: &str) -> LedgerResult<()>;

    /// Finds the first record whose content produced this hash
    ///
    /// "First" is by insertion order, independent of how many other URLs
    /// later produced the same hash.
    fn get_by_hash(&self, content_hash: &str) -> LedgerResult<Option<UrlRecord>>;

    /// Whether any record carries this content hash
    fn hash_exists(&self, content_hash: &str) -> LedgerResult<bool>;

    /// Whether the URL (normalized) is already registered
    fn exists(&self, url: &str) -> LedgerResult<bool>;

    /// Lists records matching the filter
    fn list(&self, filter: &UrlFilter) -> LedgerResult<Vec<UrlRecord>>;

    /// Counts records in a given status
    fn count_by_status(&self, status: UrlStatus) -> LedgerResult<u64>;

    /// Counts all records
    fn count_total(&self) -> LedgerResult<u64>;
}
