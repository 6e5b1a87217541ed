//! Error collector module
//!
//! This module accumulates per-context diagnostics during ingestion:
//! - Severity classification of errors against fatal-pattern matchers
//! - Severity classification of warnings against benign-notice patterns
//! - Per-context buffers with summaries
//! - Merging of records from parallel workers
//! - A human-readable digest for logging

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Message fragments that mark an error as critical
///
/// Matched case-insensitively by substring. These are failures no retry or
/// configuration tweak inside a single acquisition can recover from.
const FATAL_PATTERNS: &[&str] = &[
    "dns",
    "name or service not known",
    "failed to lookup",
    "authentication failed",
    "unauthorized",
    "invalid credentials",
    "certificate",
];

/// Message fragments that mark a warning as informational
const BENIGN_PATTERNS: &[&str] = &["rate limited", "waited", "cached", "retrying"];

/// Severity of a recorded issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Fatal error (DNS failure, authentication failure)
    Critical,
    /// Ordinary error
    Error,
    /// Error the pipeline worked around
    Recoverable,
    /// Noteworthy condition
    Warning,
    /// Expected operational notice (rate-limit waits, cache hits)
    Info,
}

impl Severity {
    /// Returns true for error-class severities
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Critical | Self::Error | Self::Recoverable)
    }

    /// Returns true for warning-class severities
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::Warning | Self::Info)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Error => "error",
            Self::Recoverable => "recoverable",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single recorded error or warning
#[derive(Debug, Clone)]
pub struct IssueRecord {
    /// Context key the issue belongs to (typically a URL)
    pub context: String,

    /// Human-readable message
    pub message: String,

    /// Classified severity
    pub severity: Severity,

    /// When the issue was recorded
    pub timestamp: DateTime<Utc>,

    /// Optional structured metadata (attempt numbers, status codes, ...)
    pub metadata: Option<HashMap<String, String>>,

    /// Optional multi-line detail (cause chains)
    pub detail: Option<String>,
}

/// Summary counts for one context
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IssueSummary {
    pub error_count: usize,
    pub warning_count: usize,
    pub critical_errors: usize,
}

/// All issues accumulated for one context
#[derive(Debug, Clone, Default)]
pub struct ContextIssues {
    pub errors: Vec<IssueRecord>,
    pub warnings: Vec<IssueRecord>,
}

impl ContextIssues {
    /// Computes summary counts for this context
    pub fn summary(&self) -> IssueSummary {
        IssueSummary {
            error_count: self.errors.len(),
            warning_count: self.warnings.len(),
            critical_errors: self
                .errors
                .iter()
                .filter(|r| r.severity == Severity::Critical)
                .count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }
}

/// Collects classified errors and warnings per processing context
///
/// Mutation is synchronized per context: the outer map lock is held only
/// long enough to clone the per-context handle, so recording against one
/// context never blocks recording against another.
#[derive(Debug, Default)]
pub struct ErrorCollector {
    contexts: Mutex<HashMap<String, Arc<Mutex<ContextIssues>>>>,
}

impl ErrorCollector {
    /// Creates an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an error under the given context
    ///
    /// The severity is classified by inspecting the message against the
    /// fatal-pattern matchers: a match is `Critical`, anything else is
    /// `Error`.
    pub fn record_error(
        &self,
        context: &str,
        message: impl Into<String>,
        metadata: Option<HashMap<String, String>>,
    ) {
        let message = message.into();
        let severity = classify_error(&message);
        self.push(context, message, severity, metadata, None);
    }

    /// Records an error with an explicit multi-line detail block
    pub fn record_error_with_detail(
        &self,
        context: &str,
        message: impl Into<String>,
        detail: impl Into<String>,
        metadata: Option<HashMap<String, String>>,
    ) {
        let message = message.into();
        let severity = classify_error(&message);
        self.push(context, message, severity, metadata, Some(detail.into()));
    }

    /// Records a warning under the given context
    ///
    /// Known benign notices (e.g. "rate limited, waited 800ms") are
    /// classified `Info`; everything else is `Warning`.
    pub fn record_warning(
        &self,
        context: &str,
        message: impl Into<String>,
        metadata: Option<HashMap<String, String>>,
    ) {
        let message = message.into();
        let severity = classify_warning(&message);
        self.push(context, message, severity, metadata, None);
    }

    /// Returns a snapshot of the issues recorded for a context
    ///
    /// An unknown context yields an empty `ContextIssues`.
    pub fn issues(&self, context: &str) -> ContextIssues {
        let slot = {
            let contexts = self.contexts.lock().unwrap();
            contexts.get(context).cloned()
        };
        match slot {
            Some(slot) => slot.lock().unwrap().clone(),
            None => ContextIssues::default(),
        }
    }

    /// Returns the summary counts for a context
    pub fn summary(&self, context: &str) -> IssueSummary {
        self.issues(context).summary()
    }

    /// Returns all context keys that have recorded issues, sorted
    pub fn context_keys(&self) -> Vec<String> {
        let contexts = self.contexts.lock().unwrap();
        let mut keys: Vec<String> = contexts.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Clears one context, or every context when `context` is None
    pub fn clear(&self, context: Option<&str>) {
        let mut contexts = self.contexts.lock().unwrap();
        match context {
            Some(key) => {
                contexts.remove(key);
            }
            None => contexts.clear(),
        }
    }

    /// Folds another collector's records into this one
    ///
    /// Used to combine diagnostics from parallel workers. Records keep
    /// their original timestamps and severities.
    pub fn merge(&self, other: &ErrorCollector) {
        let snapshots: Vec<(String, ContextIssues)> = {
            let contexts = other.contexts.lock().unwrap();
            contexts
                .iter()
                .map(|(key, slot)| (key.clone(), slot.lock().unwrap().clone()))
                .collect()
        };

        for (key, issues) in snapshots {
            let slot = self.slot(&key);
            let mut mine = slot.lock().unwrap();
            mine.errors.extend(issues.errors);
            mine.warnings.extend(issues.warnings);
        }
    }

    /// Renders a human-readable digest across all contexts
    ///
    /// For logging only; callers needing programmatic access should use
    /// `issues`/`summary`.
    pub fn formatted_summary(&self) -> String {
        let keys = self.context_keys();
        if keys.is_empty() {
            return "No issues recorded".to_string();
        }

        let mut out = String::new();
        let mut total = IssueSummary::default();

        for key in &keys {
            let issues = self.issues(key);
            let summary = issues.summary();
            total.error_count += summary.error_count;
            total.warning_count += summary.warning_count;
            total.critical_errors += summary.critical_errors;

            out.push_str(&format!(
                "{} ({} errors, {} warnings)\n",
                key, summary.error_count, summary.warning_count
            ));
            for record in issues.errors.iter().chain(issues.warnings.iter()) {
                out.push_str(&format!(
                    "  [{}] {}\n",
                    record.severity, record.message
                ));
            }
        }

        out.push_str(&format!(
            "Total: {} errors ({} critical), {} warnings across {} contexts",
            total.error_count,
            total.critical_errors,
            total.warning_count,
            keys.len()
        ));
        out
    }

    /// Gets or creates the per-context buffer handle
    fn slot(&self, context: &str) -> Arc<Mutex<ContextIssues>> {
        let mut contexts = self.contexts.lock().unwrap();
        contexts
            .entry(context.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(ContextIssues::default())))
            .clone()
    }

    fn push(
        &self,
        context: &str,
        message: String,
        severity: Severity,
        metadata: Option<HashMap<String, String>>,
        detail: Option<String>,
    ) {
        let record = IssueRecord {
            context: context.to_string(),
            message,
            severity,
            timestamp: Utc::now(),
            metadata,
            detail,
        };

        let slot = self.slot(context);
        let mut issues = slot.lock().unwrap();
        if severity.is_error() {
            issues.errors.push(record);
        } else {
            issues.warnings.push(record);
        }
    }
}

/// Classifies an error message: fatal patterns are critical
fn classify_error(message: &str) -> Severity {
    let lowered = message.to_lowercase();
    if FATAL_PATTERNS.iter().any(|p| lowered.contains(p)) {
        Severity::Critical
    } else {
        Severity::Error
    }
}

/// Classifies a warning message: benign notices are informational
fn classify_warning(message: &str) -> Severity {
    let lowered = message.to_lowercase();
    if BENIGN_PATTERNS.iter().any(|p| lowered.contains(p)) {
        Severity::Info
    } else {
        Severity::Warning
    }
}
