//! Silt: a URL ingestion and deduplication core
//!
//! This crate routes URLs to pluggable retrieval capabilities, spaces
//! outbound requests per domain, retries transient failures with backoff,
//! and keeps a concurrency-safe ledger of which URLs (and which content,
//! by checksum) have already been seen.

pub mod capability;
pub mod config;
pub mod dispatch;
pub mod fetch;
pub mod issues;
pub mod ledger;
pub mod limiter;
pub mod url;

use std::time::Duration;
use thiserror::Error;

/// Main error type for ingestion operations
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("No capability can handle URL: {url}")]
    NoCapability { url: String },

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("Fetch failed for {url}: {source}")]
    Fetch { url: String, source: FetchError },

    #[error("All {attempts} fetch attempts failed for {url}: {source}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        source: FetchError,
    },

    #[error("Capability registry error: {0}")]
    Registry(#[from] capability::RegistryError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] ledger::LedgerError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid rule pattern: {0}")]
    InvalidPattern(String),

    #[error("Negative interval: {0}ms")]
    NegativeInterval(i64),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Single-attempt fetch failures, classified for the retry policy
///
/// Timeout, ServerError, Network and RateLimited are transient and consume
/// retry budget; the rest fail fast.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Resource not found (HTTP 404)")]
    NotFound,

    #[error("Access forbidden (HTTP {status})")]
    Forbidden { status: u16 },

    #[error("Rate limited by server")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Server error (HTTP {status})")]
    ServerError { status: u16 },

    #[error("Unexpected status (HTTP {status})")]
    UnexpectedStatus { status: u16 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Returns true if a retry could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_)
                | Self::ServerError { .. }
                | Self::Network(_)
                | Self::RateLimited { .. }
        )
    }

    /// Classifies a non-success HTTP status code
    ///
    /// Returns None for 2xx statuses.
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            200..=299 => None,
            404 | 410 => Some(Self::NotFound),
            401 | 403 => Some(Self::Forbidden { status }),
            429 => Some(Self::RateLimited { retry_after: None }),
            500..=599 => Some(Self::ServerError { status }),
            _ => Some(Self::UnexpectedStatus { status }),
        }
    }
}

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use capability::{Capability, CapabilityFeatures, CapabilityRegistry, CapabilitySelector};
pub use config::Config;
pub use dispatch::{AcquireOptions, AcquireOutcome, AcquireStatus, Dispatcher};
pub use issues::ErrorCollector;
pub use ledger::{SqliteLedger, UrlStatus};
pub use limiter::DomainRateLimiter;
pub use url::{canonical, domain_or_unknown, extract_domain, normalize_url};
