//! Capability module: pluggable retrieval backends
//!
//! A capability is a named backend able to retrieve content for some class
//! of URLs. This module contains:
//! - The narrow `Capability` contract every backend implements
//! - Typed, per-kind parameter structs behind a tagged `CapabilityParams`
//! - The registry (bookkeeping) and selector (rule-based routing)
//! - The built-in HTTP backend and the out-of-process tool backend

mod http;
mod registry;
mod selector;
mod tool;

pub use http::HttpCapability;
pub use registry::{CapabilityRegistry, RegistryError};
pub use selector::{CapabilitySelector, GroupedUrls, RulePattern, SelectionRule};
pub use tool::ToolCapability;

use crate::{ConfigError, ConfigResult, FetchError};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Feature flags a capability reports about itself
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilityFeatures {
    pub supports_scripts: bool,
    pub supports_cookies: bool,
    pub supports_proxy: bool,
    pub supports_screenshot: bool,
    pub supports_pdf_output: bool,
    pub supports_multi_page: bool,
}

/// Per-call options passed to a capability's fetch
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Overall deadline for the attempt; the capability's own default
    /// applies when unset
    pub timeout: Option<Duration>,

    /// Extra request headers (HTTP-backed capabilities)
    pub headers: HashMap<String, String>,
}

/// The result of a successful fetch
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub content: Vec<u8>,
    pub mime_type: String,
    pub size: usize,
    pub headers: HashMap<String, String>,
    pub metadata: HashMap<String, String>,
}

impl FetchResponse {
    /// Interprets the content as UTF-8 text, lossily
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }
}

/// A pluggable retrieval backend
///
/// Implementations own their transport entirely; callers only see this
/// contract. `fetch` performs a single attempt; retries live in the
/// retrying fetcher, not in capabilities.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Unique name of this capability
    fn name(&self) -> &str;

    /// Feature flags this backend reports
    fn features(&self) -> CapabilityFeatures;

    /// Whether this backend can retrieve the given URL
    fn can_handle(&self, url: &str) -> bool;

    /// Performs a single retrieval attempt
    async fn fetch(
        &self,
        url: &str,
        options: &FetchOptions,
    ) -> std::result::Result<FetchResponse, FetchError>;
}

/// Backend-specific parameters, tagged by capability kind
///
/// Each variant is a concrete struct with its own validation; there is no
/// open-ended parameter map.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CapabilityParams {
    Http(HttpParams),
    Browser(BrowserParams),
    Document(DocumentParams),
}

impl CapabilityParams {
    /// Returns the kind tag for logging and error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Http(_) => "http",
            Self::Browser(_) => "browser",
            Self::Document(_) => "document",
        }
    }

    /// Validates variant-specific constraints
    pub fn validate(&self) -> ConfigResult<()> {
        match self {
            Self::Http(params) => params.validate(),
            Self::Browser(params) => params.validate(),
            Self::Document(params) => params.validate(),
        }
    }
}

/// Parameters for the plain HTTP backend
#[derive(Debug, Clone, Deserialize)]
pub struct HttpParams {
    /// User agent sent with every request
    #[serde(rename = "user-agent")]
    pub user_agent: Option<String>,

    /// Per-request timeout in milliseconds
    #[serde(rename = "timeout-ms", default = "default_http_timeout_ms")]
    pub timeout_ms: u64,

    /// TCP connect timeout in milliseconds
    #[serde(rename = "connect-timeout-ms", default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for HttpParams {
    fn default() -> Self {
        Self {
            user_agent: None,
            timeout_ms: default_http_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl HttpParams {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "http timeout-ms must be > 0".to_string(),
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "http connect-timeout-ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parameters for a browser-automation backend driven through an external
/// crawling tool
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserParams {
    /// Executable that speaks the JSON-over-stdio envelope
    pub command: String,

    /// Arguments passed before the request is written to stdin
    #[serde(default)]
    pub args: Vec<String>,

    /// Overall deadline for one invocation in milliseconds
    #[serde(rename = "timeout-ms", default = "default_browser_timeout_ms")]
    pub timeout_ms: u64,
}

impl BrowserParams {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.command.trim().is_empty() {
            return Err(ConfigError::Validation(
                "browser command cannot be empty".to_string(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "browser timeout-ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parameters for a document-analysis backend driven through an external
/// conversion tool
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentParams {
    /// Executable that speaks the JSON-over-stdio envelope
    pub command: String,

    /// Arguments passed before the request is written to stdin
    #[serde(default)]
    pub args: Vec<String>,

    /// Overall deadline for one invocation in milliseconds
    #[serde(rename = "timeout-ms", default = "default_document_timeout_ms")]
    pub timeout_ms: u64,

    /// URL path extensions this backend claims (lowercase, with dot)
    #[serde(default = "default_document_extensions")]
    pub extensions: Vec<String>,
}

impl DocumentParams {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.command.trim().is_empty() {
            return Err(ConfigError::Validation(
                "document command cannot be empty".to_string(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "document timeout-ms must be > 0".to_string(),
            ));
        }
        if self.extensions.is_empty() {
            return Err(ConfigError::Validation(
                "document extensions cannot be empty".to_string(),
            ));
        }
        for ext in &self.extensions {
            if !ext.starts_with('.') {
                return Err(ConfigError::Validation(format!(
                    "document extension '{}' must start with '.'",
                    ext
                )));
            }
        }
        Ok(())
    }
}

fn default_http_timeout_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_browser_timeout_ms() -> u64 {
    60_000
}

fn default_document_timeout_ms() -> u64 {
    120_000
}

fn default_document_extensions() -> Vec<String> {
    vec![
        ".pdf".to_string(),
        ".docx".to_string(),
        ".pptx".to_string(),
        ".xlsx".to_string(),
    ]
}

/// Builds a capability instance from validated parameters
///
/// # Arguments
///
/// * `name` - Unique capability name from configuration
/// * `params` - The kind-tagged parameter struct
///
/// # Returns
///
/// * `Ok(Arc<dyn Capability>)` - Ready-to-register backend
/// * `Err(ConfigError)` - Parameters failed validation or client setup
pub fn build_capability(
    name: &str,
    params: &CapabilityParams,
) -> ConfigResult<Arc<dyn Capability>> {
    params.validate()?;
    match params {
        CapabilityParams::Http(http) => Ok(Arc::new(HttpCapability::new(name, http)?)),
        CapabilityParams::Browser(browser) => Ok(Arc::new(ToolCapability::browser(name, browser))),
        CapabilityParams::Document(document) => {
            Ok(Arc::new(ToolCapability::document(name, document)))
        }
    }
}
