//! URL ledger module
//!
//! The persistent, concurrency-safe record of URLs, their processing state,
//! and content checksums. This is the single source of truth for
//! deduplication:
//! - URL-level: one row per normalized URL, re-registrations increment a
//!   process count instead of inserting
//! - Content-level: checksums of fetched bytes, looked up independently of
//!   URL identity

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteLedger;
pub use traits::{Ledger, LedgerError, LedgerResult, RegisterOutcome};

use chrono::{DateTime, Utc};
use std::fmt;

/// Processing state of a ledger row
///
/// Transitions: Pending -> Processing -> Completed | Failed | Skipped.
/// Terminal states may return to Processing when a caller forces
/// re-acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UrlStatus {
    /// Registered, not yet picked up
    Pending,

    /// An acquisition is in flight
    Processing,

    /// Fetched and recorded successfully
    Completed,

    /// Acquisition failed after exhausting its options
    Failed,

    /// Deliberately not stored (duplicate content, policy)
    Skipped,
}

impl UrlStatus {
    /// Returns true once processing has reached a final verdict
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    /// Whether a transition between two statuses is legal
    ///
    /// Setting the same status twice is a no-op and always allowed;
    /// concurrent workers may both mark a row Processing.
    pub fn can_transition(from: UrlStatus, to: UrlStatus) -> bool {
        if from == to {
            return true;
        }
        match (from, to) {
            (Self::Pending, Self::Processing)
            | (Self::Pending, Self::Skipped)
            | (Self::Pending, Self::Failed) => true,
            (Self::Processing, Self::Completed)
            | (Self::Processing, Self::Failed)
            | (Self::Processing, Self::Skipped) => true,
            // Terminal rows re-enter processing on forced re-acquisition
            (Self::Completed, Self::Processing)
            | (Self::Failed, Self::Processing)
            | (Self::Skipped, Self::Processing) => true,
            _ => false,
        }
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    /// Returns all possible statuses
    pub fn all_statuses() -> Vec<Self> {
        vec![
            Self::Pending,
            Self::Processing,
            Self::Completed,
            Self::Failed,
            Self::Skipped,
        ]
    }
}

impl fmt::Display for UrlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// A row in the URL ledger
#[derive(Debug, Clone)]
pub struct UrlRecord {
    pub id: i64,
    pub normalized_url: String,
    pub raw_url: String,
    pub status: UrlStatus,
    pub content_hash: Option<String>,
    pub process_count: u32,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Filters for ledger listing
#[derive(Debug, Clone, Default)]
pub struct UrlFilter {
    pub status: Option<UrlStatus>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}
