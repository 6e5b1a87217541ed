//! Dispatcher module - ingestion orchestration glue
//!
//! Composes the selector, rate limiter, retrying fetcher, error collector,
//! and ledger into a single `acquire(url)` operation:
//! 1. Register the URL in the ledger (dedup check / process count)
//! 2. Select a capability for the URL
//! 3. Wait out the domain's rate-limit slot
//! 4. Fetch with retry/backoff, recording attempts
//! 5. Checksum the content and detect content-level duplicates
//! 6. Record the final status in the ledger
//!
//! Duplicate content is a structured outcome, not an error; callers feed
//! fetched content into their own downstream pipeline.

use crate::capability::{build_capability, Capability, CapabilityRegistry, CapabilitySelector};
use crate::capability::{FetchOptions, FetchResponse, RulePattern, SelectionRule};
use crate::config::Config;
use crate::fetch::{RetryPolicy, RetryingFetcher};
use crate::issues::{ContextIssues, ErrorCollector};
use crate::ledger::{Ledger, SqliteLedger, UrlFilter, UrlRecord, UrlStatus};
use crate::limiter::{DomainRateLimiter, DomainStats, RateLimiterConfig};
use crate::url::{domain_or_unknown, normalize_url};
use crate::{IngestError, Result};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Per-acquisition options
#[derive(Debug, Clone, Default)]
pub struct AcquireOptions {
    /// Per-attempt fetch timeout; the dispatcher default applies when unset
    pub timeout: Option<Duration>,

    /// Re-fetch even when the ledger already marks the URL Completed
    pub force: bool,
}

/// How an acquisition concluded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireStatus {
    /// Fetched and recorded as new content
    Completed,

    /// The ledger already held a completed record; nothing was fetched
    AlreadyCompleted,

    /// Fetched, but the content checksum matched an earlier record
    DuplicateContent { original_id: i64 },

    /// The acquisition failed; the ledger row is marked Failed
    Failed,
}

/// Result envelope of a single acquisition
///
/// Ordinary per-URL failures land here as `Failed` outcomes rather than
/// errors, so batch callers can continue on error.
#[derive(Debug)]
pub struct AcquireOutcome {
    pub url_id: i64,
    pub url: String,
    pub status: AcquireStatus,
    pub content: Option<FetchResponse>,
    pub content_hash: Option<String>,
    pub error: Option<String>,
}

/// A URL that failed inside a batch
#[derive(Debug, Clone)]
pub struct FailedAcquire {
    pub url: String,
    pub error: String,
}

/// Continue-on-error batch result
#[derive(Debug, Default)]
pub struct BatchReport {
    pub successful: Vec<AcquireOutcome>,
    pub failed: Vec<FailedAcquire>,
}

/// Orchestrates URL acquisition across all core components
///
/// Every collaborator is an explicit instance passed in at construction;
/// there is no shared global state.
pub struct Dispatcher {
    selector: CapabilitySelector,
    limiter: DomainRateLimiter,
    fetcher: RetryingFetcher,
    collector: Arc<ErrorCollector>,
    ledger: Mutex<SqliteLedger>,
    default_timeout: Duration,
    max_concurrent: u32,
}

impl Dispatcher {
    /// Creates a dispatcher from explicit, already-built components
    pub fn new(
        selector: CapabilitySelector,
        limiter: DomainRateLimiter,
        fetcher: RetryingFetcher,
        collector: Arc<ErrorCollector>,
        ledger: SqliteLedger,
        default_timeout: Duration,
        max_concurrent: u32,
    ) -> Self {
        Self {
            selector,
            limiter,
            fetcher,
            collector,
            ledger: Mutex::new(ledger),
            default_timeout,
            max_concurrent,
        }
    }

    /// Builds the full component stack from configuration
    ///
    /// A configuration problem here is fatal: no acquisition work starts.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut registry = CapabilityRegistry::new();
        for entry in &config.capability {
            let capability = build_capability(&entry.name, &entry.params)?;
            registry.register(capability)?;
            if entry.default {
                registry.set_default(&entry.name)?;
            }
        }
        let registry = Arc::new(registry);

        let mut selector = CapabilitySelector::new(Arc::clone(&registry));
        for rule in &config.rule {
            let pattern = RulePattern::parse(&rule.pattern, rule.match_kind.as_deref())
                .map_err(IngestError::Config)?;
            selector.add_rule(SelectionRule::new(pattern, &rule.capability, rule.priority));
        }
        for (domain, capability) in &config.fallback_domains {
            selector.set_domain_fallback(domain, capability);
        }

        let limiter = DomainRateLimiter::new(RateLimiterConfig {
            enabled: config.rate_limit.enabled,
            default_interval: Duration::from_millis(config.rate_limit.default_interval_ms),
            overrides: config
                .rate_limit
                .domains
                .iter()
                .map(|(domain, ms)| (domain.clone(), Duration::from_millis(*ms)))
                .collect(),
        });

        let collector = Arc::new(ErrorCollector::new());
        let fetcher = RetryingFetcher::new(
            registry.get_all(),
            RetryPolicy {
                max_retries: config.retry.max_retries,
                retry_delay: Duration::from_millis(config.retry.retry_delay_ms),
                backoff_factor: config.retry.backoff_factor,
            },
            Arc::clone(&collector),
        );

        let ledger = SqliteLedger::new(Path::new(&config.output.database_path))?;

        Ok(Self::new(
            selector,
            limiter,
            fetcher,
            collector,
            ledger,
            Duration::from_millis(config.ingest.default_timeout_ms),
            config.ingest.max_concurrent,
        ))
    }

    /// Acquires a single URL
    ///
    /// Ordinary per-URL failures (selection, validation, fetch) return a
    /// `Failed` outcome with the error message; `Err` is reserved for
    /// infrastructure problems such as ledger write failures.
    ///
    /// A URL whose ledger status is already Completed is not re-fetched
    /// unless `options.force` is set; re-registration still increments its
    /// process count.
    pub async fn acquire(&self, url: &str, options: &AcquireOptions) -> Result<AcquireOutcome> {
        let registration = self.ledger.lock().unwrap().register(url)?;
        let url_id = registration.id;

        if registration.status == UrlStatus::Completed && !options.force {
            tracing::debug!(
                "URL {} already completed (id {}, process count {})",
                url,
                url_id,
                registration.process_count
            );
            let existing_hash = self.ledger.lock().unwrap().get(url_id)?.content_hash;
            return Ok(AcquireOutcome {
                url_id,
                url: url.to_string(),
                status: AcquireStatus::AlreadyCompleted,
                content: None,
                content_hash: existing_hash,
                error: None,
            });
        }

        self.ledger
            .lock()
            .unwrap()
            .update_status(url_id, UrlStatus::Processing, None)?;

        // Reject malformed URLs before any network work
        if let Err(error) = normalize_url(url) {
            let message = format!("Invalid URL: {}", error);
            return self.fail(url_id, url, message);
        }

        let capability = match self.selector.select_capability(url) {
            Some(capability) => capability,
            None => {
                let message = format!("No capability can handle URL: {}", url);
                return self.fail(url_id, url, message);
            }
        };
        tracing::debug!("URL {} routed to capability {}", url, capability.name());

        // Admission control for the target domain
        let domain = domain_or_unknown(url);
        let waited = self.limiter.wait_for_domain(&domain).await;
        if !waited.is_zero() {
            self.collector.record_warning(
                url,
                format!("rate limited, waited {}ms", waited.as_millis()),
                None,
            );
        }
        self.limiter.record_request(&domain);

        let fetch_options = FetchOptions {
            timeout: Some(options.timeout.unwrap_or(self.default_timeout)),
            headers: HashMap::new(),
        };

        let response = match self.fetcher.fetch_with(capability, url, &fetch_options).await {
            Ok(response) => response,
            Err(error) => {
                let message = error.to_string();
                return self.fail(url_id, url, message);
            }
        };

        let content_hash = hash_content(&response.content);

        // Content-level dedup: a different URL already produced these bytes
        let original = self.ledger.lock().unwrap().get_by_hash(&content_hash)?;
        if let Some(original) = original.filter(|record| record.id != url_id) {
            let reason = format!(
                "Duplicate content of record {} ({})",
                original.id, original.normalized_url
            );
            tracing::info!("URL {} skipped: {}", url, reason);
            self.collector.record_warning(url, reason.clone(), None);
            {
                let mut ledger = self.ledger.lock().unwrap();
                ledger.update_hash(url_id, &content_hash)?;
                ledger.update_status(url_id, UrlStatus::Skipped, Some(&reason))?;
            }
            return Ok(AcquireOutcome {
                url_id,
                url: url.to_string(),
                status: AcquireStatus::DuplicateContent {
                    original_id: original.id,
                },
                content: None,
                content_hash: Some(content_hash),
                error: None,
            });
        }

        {
            let mut ledger = self.ledger.lock().unwrap();
            ledger.update_hash(url_id, &content_hash)?;
            ledger.update_status(url_id, UrlStatus::Completed, None)?;
        }
        tracing::info!("Acquired {} ({} bytes)", url, response.size);

        Ok(AcquireOutcome {
            url_id,
            url: url.to_string(),
            status: AcquireStatus::Completed,
            content: Some(response),
            content_hash: Some(content_hash),
            error: None,
        })
    }

    /// Acquires a batch of URLs concurrently, continuing on per-URL errors
    ///
    /// Concurrency is bounded by the configured maximum; input order is
    /// preserved within each report bucket.
    pub async fn acquire_all(
        self: &Arc<Self>,
        urls: &[String],
        options: &AcquireOptions,
    ) -> BatchReport {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent as usize));
        let mut join_set = tokio::task::JoinSet::new();

        for (index, url) in urls.iter().enumerate() {
            let dispatcher = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            let url = url.clone();
            let options = options.clone();
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let result = dispatcher.acquire(&url, &options).await;
                (index, url, result)
            });
        }

        let mut slots: Vec<Option<(String, Result<AcquireOutcome>)>> = Vec::new();
        slots.resize_with(urls.len(), || None);
        while let Some(joined) = join_set.join_next().await {
            if let Ok((index, url, result)) = joined {
                slots[index] = Some((url, result));
            }
        }

        let mut report = BatchReport::default();
        for slot in slots.into_iter().flatten() {
            match slot {
                (_, Ok(outcome)) if outcome.status != AcquireStatus::Failed => {
                    report.successful.push(outcome);
                }
                (url, Ok(outcome)) => report.failed.push(FailedAcquire {
                    url,
                    error: outcome.error.unwrap_or_else(|| "unknown failure".to_string()),
                }),
                (url, Err(error)) => report.failed.push(FailedAcquire {
                    url,
                    error: error.to_string(),
                }),
            }
        }
        report
    }

    /// Registers a URL without acquiring it, returning its ledger id
    pub fn register_url(&self, url: &str) -> Result<i64> {
        Ok(self.ledger.lock().unwrap().register(url)?.id)
    }

    /// Finds the first record whose content produced this hash
    pub fn duplicate_by_hash(&self, content_hash: &str) -> Result<Option<UrlRecord>> {
        Ok(self.ledger.lock().unwrap().get_by_hash(content_hash)?)
    }

    /// Returns the diagnostics recorded for a context (typically a URL)
    pub fn issues(&self, context: &str) -> ContextIssues {
        self.collector.issues(context)
    }

    /// Returns rate-limit statistics for a domain
    pub fn domain_stats(&self, domain: &str) -> Option<DomainStats> {
        self.limiter.stats(domain)
    }

    /// Selects the capability that would handle a URL
    pub fn select_capability(&self, url: &str) -> Option<Arc<dyn Capability>> {
        self.selector.select_capability(url)
    }

    /// Lists ledger records matching a filter
    pub fn list_urls(&self, filter: &UrlFilter) -> Result<Vec<UrlRecord>> {
        Ok(self.ledger.lock().unwrap().list(filter)?)
    }

    /// Returns per-status ledger counts plus the total
    pub fn status_counts(&self) -> Result<(Vec<(UrlStatus, u64)>, u64)> {
        let ledger = self.ledger.lock().unwrap();
        let mut counts = Vec::new();
        for status in UrlStatus::all_statuses() {
            counts.push((status, ledger.count_by_status(status)?));
        }
        let total = ledger.count_total()?;
        Ok((counts, total))
    }

    /// Shared access to the error collector
    pub fn collector(&self) -> &ErrorCollector {
        &self.collector
    }

    /// Marks a row failed and builds the failure outcome
    fn fail(&self, url_id: i64, url: &str, message: String) -> Result<AcquireOutcome> {
        self.collector.record_error(url, message.clone(), None);
        self.ledger
            .lock()
            .unwrap()
            .update_status(url_id, UrlStatus::Failed, Some(&message))?;

        Ok(AcquireOutcome {
            url_id,
            url: url.to_string(),
            status: AcquireStatus::Failed,
            content: None,
            content_hash: None,
            error: Some(message),
        })
    }
}

/// Hex-encoded SHA-256 checksum of fetched bytes
pub fn hash_content(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}
