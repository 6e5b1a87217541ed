use url::Url;

/// Sentinel domain used when a URL's host cannot be determined
pub const UNKNOWN_DOMAIN: &str = "unknown";

/// Extracts the domain from a parsed URL
///
/// This function retrieves the host portion of a URL and converts it to
/// lowercase. If the URL has no host, it returns None.
///
/// # Arguments
///
/// * `url` - The URL to extract the domain from
///
/// # Returns
///
/// * `Some(String)` - The lowercase domain/host
/// * `None` - If the URL has no host
///
/// # Examples
///
/// ```
/// use url::Url;
/// use silt::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Extracts the domain from a raw URL string, never failing
///
/// Rate-limit bookkeeping must work for any input, so malformed URLs and
/// URLs without a host fall into the shared "unknown" bucket instead of
/// raising an error.
///
/// # Examples
///
/// ```
/// use silt::url::domain_or_unknown;
///
/// assert_eq!(domain_or_unknown("https://Example.com/a"), "example.com");
/// assert_eq!(domain_or_unknown("not a url"), "unknown");
/// ```
pub fn domain_or_unknown(url_str: &str) -> String {
    Url::parse(url_str)
        .ok()
        .and_then(|u| extract_domain(&u))
        .unwrap_or_else(|| UNKNOWN_DOMAIN.to_string())
}
