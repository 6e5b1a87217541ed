//! Plain HTTP retrieval capability
//!
//! A single GET per fetch attempt; retry/backoff lives in the retrying
//! fetcher, not here. Status codes and transport errors are classified into
//! the shared fetch-error taxonomy.

use crate::capability::{Capability, CapabilityFeatures, FetchOptions, FetchResponse, HttpParams};
use crate::FetchError;
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

const DEFAULT_USER_AGENT: &str = concat!("silt/", env!("CARGO_PKG_VERSION"));

/// HTTP GET backend built on reqwest
pub struct HttpCapability {
    name: String,
    client: Client,
    default_timeout: Duration,
}

impl HttpCapability {
    /// Builds the capability and its HTTP client
    ///
    /// # Arguments
    ///
    /// * `name` - Capability name from configuration
    /// * `params` - Validated HTTP parameters
    ///
    /// # Returns
    ///
    /// * `Ok(HttpCapability)` - Ready to fetch
    /// * `Err(ConfigError)` - Client construction failed
    pub fn new(name: impl Into<String>, params: &HttpParams) -> crate::ConfigResult<Self> {
        let user_agent = params
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_millis(params.timeout_ms))
            .connect_timeout(Duration::from_millis(params.connect_timeout_ms))
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| {
                crate::ConfigError::Validation(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            name: name.into(),
            client,
            default_timeout: Duration::from_millis(params.timeout_ms),
        })
    }
}

#[async_trait]
impl Capability for HttpCapability {
    fn name(&self) -> &str {
        &self.name
    }

    fn features(&self) -> CapabilityFeatures {
        CapabilityFeatures {
            supports_cookies: true,
            supports_proxy: true,
            ..CapabilityFeatures::default()
        }
    }

    fn can_handle(&self, url: &str) -> bool {
        matches!(
            Url::parse(url).map(|u| u.scheme().to_string()).as_deref(),
            Ok("http") | Ok("https")
        )
    }

    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<FetchResponse, FetchError> {
        let timeout = options.timeout.unwrap_or(self.default_timeout);

        let mut request = self.client.get(url).timeout(timeout);
        for (key, value) in &options.headers {
            request = request.header(key, value);
        }

        let response = request.send().await.map_err(|e| classify_transport(e, timeout))?;

        let status = response.status().as_u16();
        if let Some(mut error) = FetchError::from_status(status) {
            // Honor a server-suggested delay on 429
            if let FetchError::RateLimited { retry_after } = &mut error {
                *retry_after = parse_retry_after(&response);
            }
            return Err(error);
        }

        let final_url = response.url().to_string();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();

        let mime_type = headers
            .get("content-type")
            .cloned()
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let content = response
            .bytes()
            .await
            .map_err(|e| classify_transport(e, timeout))?
            .to_vec();

        let mut metadata = HashMap::new();
        metadata.insert("final_url".to_string(), final_url);
        metadata.insert("status".to_string(), status.to_string());

        Ok(FetchResponse {
            size: content.len(),
            content,
            mime_type,
            headers,
            metadata,
        })
    }
}

/// Maps reqwest transport errors into the fetch-error taxonomy
fn classify_transport(error: reqwest::Error, timeout: Duration) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout(timeout)
    } else if error.is_builder() {
        FetchError::InvalidUrl(error.to_string())
    } else if error.is_connect() {
        FetchError::Network(format!("Connection failed: {}", error))
    } else {
        FetchError::Network(error.to_string())
    }
}

/// Parses a Retry-After header given in seconds
fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}
