//! Out-of-process tool capability
//!
//! Backends that delegate retrieval to an external analysis tool (document
//! converters, browser crawlers). The contract with the tool is a single
//! JSON request object written to stdin and a JSON envelope read from
//! stdout:
//!
//! ```json
//! {"success": true, "data": {"content": "...", "mime_type": "..."},
//!  "execution_time_ms": 1200}
//! ```
//!
//! Everything about the tool (spawn, timeout, envelope parsing) is internal
//! to this capability; the rest of the system sees the ordinary capability
//! contract.

use crate::capability::{
    BrowserParams, Capability, CapabilityFeatures, DocumentParams, FetchOptions, FetchResponse,
};
use crate::FetchError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use url::Url;

/// Which URLs a tool claims
#[derive(Debug, Clone)]
enum UrlFilter {
    /// Any http(s) URL
    AnyHttp,
    /// Only URLs whose path ends with one of these extensions
    Extensions(Vec<String>),
}

/// Request written to the tool's stdin
#[derive(Debug, Serialize)]
struct ToolRequest<'a> {
    url: &'a str,
    timeout_ms: u64,
}

/// Envelope read from the tool's stdout
#[derive(Debug, Deserialize)]
struct ToolEnvelope {
    success: bool,
    #[serde(default)]
    data: Option<ToolOutput>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    execution_time_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ToolOutput {
    content: String,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    metadata: Option<HashMap<String, String>>,
}

/// Capability backed by an external tool process
pub struct ToolCapability {
    name: String,
    command: String,
    args: Vec<String>,
    default_timeout: Duration,
    features: CapabilityFeatures,
    filter: UrlFilter,
}

impl ToolCapability {
    /// Builds a browser-automation capability from its parameters
    pub fn browser(name: impl Into<String>, params: &BrowserParams) -> Self {
        Self {
            name: name.into(),
            command: params.command.clone(),
            args: params.args.clone(),
            default_timeout: Duration::from_millis(params.timeout_ms),
            features: CapabilityFeatures {
                supports_scripts: true,
                supports_cookies: true,
                supports_screenshot: true,
                supports_multi_page: true,
                ..CapabilityFeatures::default()
            },
            filter: UrlFilter::AnyHttp,
        }
    }

    /// Builds a document-analysis capability from its parameters
    pub fn document(name: impl Into<String>, params: &DocumentParams) -> Self {
        Self {
            name: name.into(),
            command: params.command.clone(),
            args: params.args.clone(),
            default_timeout: Duration::from_millis(params.timeout_ms),
            features: CapabilityFeatures {
                supports_pdf_output: true,
                ..CapabilityFeatures::default()
            },
            filter: UrlFilter::Extensions(
                params.extensions.iter().map(|e| e.to_lowercase()).collect(),
            ),
        }
    }

    /// Runs the tool once and parses its envelope
    async fn invoke(&self, url: &str, timeout: Duration) -> Result<ToolEnvelope, FetchError> {
        let request = ToolRequest {
            url,
            timeout_ms: timeout.as_millis() as u64,
        };
        let request_json = serde_json::to_vec(&request)
            .map_err(|e| FetchError::Network(format!("Failed to encode tool request: {}", e)))?;

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| FetchError::Network(format!("Failed to spawn {}: {}", self.command, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&request_json).await.map_err(|e| {
                FetchError::Network(format!("Failed to write to {}: {}", self.command, e))
            })?;
            // Closing stdin signals end of request
        }

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(FetchError::Network(format!(
                    "Failed to run {}: {}",
                    self.command, e
                )))
            }
            // Dropping the wait future kills the child (kill_on_drop)
            Err(_) => return Err(FetchError::Timeout(timeout)),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FetchError::Network(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| {
            FetchError::Network(format!("Invalid envelope from {}: {}", self.command, e))
        })
    }
}

#[async_trait]
impl Capability for ToolCapability {
    fn name(&self) -> &str {
        &self.name
    }

    fn features(&self) -> CapabilityFeatures {
        self.features
    }

    fn can_handle(&self, url: &str) -> bool {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(_) => return false,
        };
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return false;
        }

        match &self.filter {
            UrlFilter::AnyHttp => true,
            UrlFilter::Extensions(extensions) => {
                let path = parsed.path().to_lowercase();
                extensions.iter().any(|ext| path.ends_with(ext.as_str()))
            }
        }
    }

    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<FetchResponse, FetchError> {
        let timeout = options.timeout.unwrap_or(self.default_timeout);
        let envelope = self.invoke(url, timeout).await?;

        if !envelope.success {
            let message = envelope
                .error
                .unwrap_or_else(|| format!("{} reported failure without detail", self.command));
            return Err(FetchError::Network(message));
        }

        let output = envelope.data.ok_or_else(|| {
            FetchError::Network(format!("{} reported success without data", self.command))
        })?;

        let mut metadata = output.metadata.unwrap_or_default();
        metadata.insert("tool".to_string(), self.command.clone());
        if let Some(elapsed) = envelope.execution_time_ms {
            metadata.insert("execution_time_ms".to_string(), elapsed.to_string());
        }

        let content = output.content.into_bytes();
        Ok(FetchResponse {
            size: content.len(),
            content,
            mime_type: output
                .mime_type
                .unwrap_or_else(|| "text/plain".to_string()),
            headers: HashMap::new(),
            metadata,
        })
    }
}
