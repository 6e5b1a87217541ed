//! Retrying fetcher module
//!
//! Wraps a list of concrete fetchers (capabilities) with:
//! - First-capable selection in registration order
//! - Exponential backoff retries for transient failures
//! - Fail-fast for permanent failures
//! - A per-fetcher diagnostic sweep (`fetch_all`) and a boolean
//!   reachability probe (`test_connectivity`)
//!
//! Every failed attempt is recorded in the error collector under the URL
//! context, so diagnostics survive even when the caller only looks at the
//! final result.

use crate::capability::{Capability, FetchOptions, FetchResponse};
use crate::issues::ErrorCollector;
use crate::{FetchError, IngestError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Retry policy for transient fetch failures
///
/// The delay before retry `i` (zero-based) is
/// `retry_delay * backoff_factor^i`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt
    pub max_retries: u32,

    /// Base delay before the first retry
    pub retry_delay: Duration,

    /// Multiplier applied per retry
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Computes the backoff delay before retry number `retry` (zero-based)
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        self.retry_delay
            .mul_f64(self.backoff_factor.powi(retry as i32))
    }
}

/// Outcome of one fetcher's attempt in a `fetch_all` sweep
#[derive(Debug, Clone)]
pub struct FetchReport {
    pub fetcher: String,
    pub success: bool,
    pub duration: Duration,
    pub error: Option<String>,
}

/// Executes fetches with retry, backoff, and failover across fetchers
pub struct RetryingFetcher {
    fetchers: Vec<Arc<dyn Capability>>,
    policy: RetryPolicy,
    collector: Arc<ErrorCollector>,
}

impl RetryingFetcher {
    /// Creates a retrying fetcher over an ordered fetcher list
    pub fn new(
        fetchers: Vec<Arc<dyn Capability>>,
        policy: RetryPolicy,
        collector: Arc<ErrorCollector>,
    ) -> Self {
        Self {
            fetchers,
            policy,
            collector,
        }
    }

    /// Fetches a URL through the first capable fetcher, with retries
    ///
    /// # Returns
    ///
    /// * `Ok(FetchResponse)` - An attempt succeeded
    /// * `Err(IngestError::NoCapability)` - No fetcher can handle the URL
    /// * `Err(IngestError::Fetch)` - A non-retryable failure
    /// * `Err(IngestError::RetriesExhausted)` - Transient failures consumed
    ///   the whole retry budget
    pub async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<FetchResponse> {
        let fetcher = self
            .fetchers
            .iter()
            .find(|f| f.can_handle(url))
            .cloned()
            .ok_or_else(|| IngestError::NoCapability {
                url: url.to_string(),
            })?;
        self.fetch_with(fetcher, url, options).await
    }

    /// Fetches a URL through a specific fetcher, with retries
    ///
    /// Used by the dispatcher after rule-based selection has already picked
    /// the capability.
    pub async fn fetch_with(
        &self,
        fetcher: Arc<dyn Capability>,
        url: &str,
        options: &FetchOptions,
    ) -> Result<FetchResponse> {
        let mut retries = 0u32;

        loop {
            match fetcher.fetch(url, options).await {
                Ok(response) => {
                    if retries > 0 {
                        tracing::debug!(
                            "Fetch of {} succeeded after {} retries",
                            url,
                            retries
                        );
                    }
                    return Ok(response);
                }
                Err(error) => {
                    self.record_attempt(url, fetcher.name(), retries + 1, &error);

                    if !error.is_retryable() {
                        tracing::debug!("Non-retryable failure for {}: {}", url, error);
                        return Err(IngestError::Fetch {
                            url: url.to_string(),
                            source: error,
                        });
                    }

                    if retries >= self.policy.max_retries {
                        return Err(IngestError::RetriesExhausted {
                            url: url.to_string(),
                            attempts: retries + 1,
                            source: error,
                        });
                    }

                    // Honor a server-suggested delay when one was provided
                    let delay = match &error {
                        FetchError::RateLimited {
                            retry_after: Some(suggested),
                        } => *suggested,
                        _ => self.policy.delay_for_retry(retries),
                    };

                    tracing::debug!(
                        "Retrying {} in {:?} ({}/{})",
                        url,
                        delay,
                        retries + 1,
                        self.policy.max_retries
                    );
                    tokio::time::sleep(delay).await;
                    retries += 1;
                }
            }
        }
    }

    /// Runs every capable fetcher once, without retries
    ///
    /// Used for diagnostics and health checks; per-fetcher timings and
    /// failures are reported instead of raised.
    pub async fn fetch_all(&self, url: &str, options: &FetchOptions) -> Vec<FetchReport> {
        let mut reports = Vec::new();

        for fetcher in &self.fetchers {
            if !fetcher.can_handle(url) {
                continue;
            }

            let start = Instant::now();
            let result = fetcher.fetch(url, options).await;
            let duration = start.elapsed();

            reports.push(match result {
                Ok(_) => FetchReport {
                    fetcher: fetcher.name().to_string(),
                    success: true,
                    duration,
                    error: None,
                },
                Err(error) => FetchReport {
                    fetcher: fetcher.name().to_string(),
                    success: false,
                    duration,
                    error: Some(error.to_string()),
                },
            });
        }

        reports
    }

    /// Answers "is this URL reachable through any fetcher" without erroring
    pub async fn test_connectivity(&self, url: &str) -> bool {
        self.fetch_all(url, &FetchOptions::default())
            .await
            .iter()
            .any(|report| report.success)
    }

    /// Records one failed attempt in the collector
    fn record_attempt(&self, url: &str, fetcher: &str, attempt: u32, error: &FetchError) {
        let mut metadata = HashMap::new();
        metadata.insert("fetcher".to_string(), fetcher.to_string());
        metadata.insert("attempt".to_string(), attempt.to_string());
        self.collector.record_error(
            url,
            format!("Attempt {} via {} failed: {}", attempt, fetcher, error),
            Some(metadata),
        );
    }
}
