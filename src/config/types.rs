use crate::capability::CapabilityParams;
use serde::Deserialize;
use std::collections::HashMap;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(rename = "rate-limit", default)]
    pub rate_limit: RateLimitSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    pub output: OutputConfig,

    #[serde(default)]
    pub capability: Vec<CapabilityEntry>,

    #[serde(default)]
    pub rule: Vec<RuleEntry>,

    /// Domain to capability map consulted when no rule matches
    #[serde(rename = "fallback-domains", default)]
    pub fallback_domains: HashMap<String, String>,
}

/// Ingestion behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Maximum number of concurrent acquisitions
    #[serde(rename = "max-concurrent", default = "default_max_concurrent")]
    pub max_concurrent: u32,

    /// Default per-attempt fetch timeout (milliseconds)
    #[serde(rename = "default-timeout-ms", default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            default_timeout_ms: default_timeout_ms(),
        }
    }
}

/// Domain admission-control configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Minimum spacing between requests to one domain (milliseconds)
    #[serde(rename = "default-interval-ms", default = "default_interval_ms")]
    pub default_interval_ms: u64,

    /// Per-domain interval overrides (milliseconds)
    #[serde(default)]
    pub domains: HashMap<String, u64>,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            default_interval_ms: default_interval_ms(),
            domains: HashMap::new(),
        }
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    /// Maximum retries after the initial attempt
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay before the first retry (milliseconds)
    #[serde(rename = "retry-delay-ms", default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Multiplier applied per retry
    #[serde(rename = "backoff-factor", default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite ledger database
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// A configured retrieval capability
#[derive(Debug, Clone, Deserialize)]
pub struct CapabilityEntry {
    /// Unique capability name
    pub name: String,

    /// Whether this capability is the registry default
    #[serde(default)]
    pub default: bool,

    /// Kind-tagged backend parameters
    #[serde(flatten)]
    pub params: CapabilityParams,
}

/// A configured selection rule
#[derive(Debug, Clone, Deserialize)]
pub struct RuleEntry {
    /// Pattern text; `*` makes it a wildcard unless `match` says otherwise
    pub pattern: String,

    /// Explicit pattern kind: "literal", "wildcard", or "regex"
    #[serde(rename = "match", default)]
    pub match_kind: Option<String>,

    /// Capability the rule routes to
    pub capability: String,

    /// Higher priorities are evaluated first
    #[serde(default)]
    pub priority: i32,
}

fn default_max_concurrent() -> u32 {
    8
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_backoff_factor() -> f64 {
    2.0
}
