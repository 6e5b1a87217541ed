//! Capability selector
//!
//! Rule-based routing over the capability registry. Selection walks, in
//! order: priority-sorted rules, the optional domain fallback map, the
//! registry default, and finally every capability in registration order.

use crate::capability::{Capability, CapabilityRegistry};
use crate::url::domain_or_unknown;
use crate::{ConfigError, ConfigResult};
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

/// A selection rule pattern
///
/// Literal patterns match by exact equality or substring containment.
/// Wildcard patterns are escaped, `*` is translated to `.*`, and the result
/// is anchored at both ends. Regex patterns are used directly.
#[derive(Debug, Clone)]
pub enum RulePattern {
    Literal(String),
    Wildcard { raw: String, regex: Regex },
    Regex(Regex),
}

impl RulePattern {
    /// Creates a literal pattern
    pub fn literal(pattern: impl Into<String>) -> Self {
        Self::Literal(pattern.into())
    }

    /// Creates a wildcard pattern, translating `*` into `.*`
    pub fn wildcard(pattern: &str) -> ConfigResult<Self> {
        let translated = format!("^{}$", regex::escape(pattern).replace("\\*", ".*"));
        let regex = Regex::new(&translated)
            .map_err(|e| ConfigError::InvalidPattern(format!("{}: {}", pattern, e)))?;
        Ok(Self::Wildcard {
            raw: pattern.to_string(),
            regex,
        })
    }

    /// Creates a regular-expression pattern
    pub fn regex(pattern: &str) -> ConfigResult<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| ConfigError::InvalidPattern(format!("{}: {}", pattern, e)))?;
        Ok(Self::Regex(regex))
    }

    /// Parses a pattern from configuration
    ///
    /// With no explicit kind, a pattern containing `*` is treated as a
    /// wildcard and anything else as a literal.
    pub fn parse(pattern: &str, kind: Option<&str>) -> ConfigResult<Self> {
        match kind {
            Some("literal") => Ok(Self::literal(pattern)),
            Some("wildcard") => Self::wildcard(pattern),
            Some("regex") => Self::regex(pattern),
            Some(other) => Err(ConfigError::InvalidPattern(format!(
                "Unknown pattern kind '{}' (expected literal, wildcard, or regex)",
                other
            ))),
            None => {
                if pattern.contains('*') {
                    Self::wildcard(pattern)
                } else {
                    Ok(Self::literal(pattern))
                }
            }
        }
    }

    /// Whether the pattern matches a URL
    pub fn matches(&self, url: &str) -> bool {
        match self {
            Self::Literal(pattern) => url == pattern || url.contains(pattern.as_str()),
            Self::Wildcard { regex, .. } => regex.is_match(url),
            Self::Regex(regex) => regex.is_match(url),
        }
    }
}

/// Routes URLs matching a pattern to a named capability
#[derive(Debug, Clone)]
pub struct SelectionRule {
    pub pattern: RulePattern,
    pub capability: String,
    pub priority: i32,
}

impl SelectionRule {
    pub fn new(pattern: RulePattern, capability: impl Into<String>, priority: i32) -> Self {
        Self {
            pattern,
            capability: capability.into(),
            priority,
        }
    }
}

/// URLs partitioned by selected capability
#[derive(Debug, Default)]
pub struct GroupedUrls {
    /// Buckets in first-selection order; per-bucket URL order is preserved
    pub buckets: Vec<(String, Vec<String>)>,

    /// URLs no capability could handle, in input order
    pub unrouted: Vec<String>,
}

/// Rule-based router over a capability registry
pub struct CapabilitySelector {
    registry: Arc<CapabilityRegistry>,
    rules: Vec<SelectionRule>,
    fallback_domains: HashMap<String, String>,
}

impl CapabilitySelector {
    /// Creates a selector over the given registry with no rules
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self {
            registry,
            rules: Vec::new(),
            fallback_domains: HashMap::new(),
        }
    }

    /// Appends a rule and re-sorts by priority descending
    ///
    /// The sort is stable, so rules with equal priority keep insertion
    /// order.
    pub fn add_rule(&mut self, rule: SelectionRule) {
        self.rules.push(rule);
        self.rules.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    /// Removes every rule
    pub fn clear_rules(&mut self) {
        self.rules.clear();
    }

    /// Returns the rules in evaluation order
    pub fn rules(&self) -> &[SelectionRule] {
        &self.rules
    }

    /// Maps a domain directly to a capability, consulted when no rule
    /// matches
    pub fn set_domain_fallback(&mut self, domain: impl Into<String>, capability: impl Into<String>) {
        self.fallback_domains
            .insert(domain.into(), capability.into());
    }

    /// Selects the capability that should handle a URL
    ///
    /// Walks, in order:
    /// 1. Rules in priority order; the first whose pattern matches AND whose
    ///    capability reports it can handle the URL wins
    /// 2. The domain fallback map
    /// 3. The registry default, if it can handle the URL
    /// 4. All capabilities in registration order
    ///
    /// Returns None when nothing can handle the URL; callers treat that as
    /// a no-capability error.
    pub fn select_capability(&self, url: &str) -> Option<Arc<dyn Capability>> {
        // 1. Priority rules
        for rule in &self.rules {
            if !rule.pattern.matches(url) {
                continue;
            }
            if let Some(capability) = self.registry.get(&rule.capability) {
                if capability.can_handle(url) {
                    tracing::trace!(
                        "URL {} routed to {} by rule (priority {})",
                        url,
                        rule.capability,
                        rule.priority
                    );
                    return Some(capability);
                }
            }
        }

        // 2. Domain fallback map
        let domain = domain_or_unknown(url);
        if let Some(name) = self.fallback_domains.get(&domain) {
            if let Some(capability) = self.registry.get(name) {
                if capability.can_handle(url) {
                    return Some(capability);
                }
            }
        }

        // 3. Registry default
        if let Some(capability) = self.registry.get_default() {
            if capability.can_handle(url) {
                return Some(capability);
            }
        }

        // 4. Registration-order scan
        self.registry
            .get_all()
            .into_iter()
            .find(|capability| capability.can_handle(url))
    }

    /// Partitions URLs into per-capability buckets for batch execution
    ///
    /// Bucket order follows first selection; URLs that select no capability
    /// are returned separately for the caller to handle.
    pub fn group_by_capability(&self, urls: &[String]) -> GroupedUrls {
        let mut grouped = GroupedUrls::default();
        let mut index: HashMap<String, usize> = HashMap::new();

        for url in urls {
            match self.select_capability(url) {
                Some(capability) => {
                    let name = capability.name().to_string();
                    let slot = *index.entry(name.clone()).or_insert_with(|| {
                        grouped.buckets.push((name, Vec::new()));
                        grouped.buckets.len() - 1
                    });
                    grouped.buckets[slot].1.push(url.clone());
                }
                None => grouped.unrouted.push(url.clone()),
            }
        }

        grouped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{CapabilityFeatures, FetchOptions, FetchResponse};
    use crate::FetchError;
    use async_trait::async_trait;

    /// Capability stub with a configurable URL filter
    struct StubCapability {
        name: String,
        suffix: Option<String>,
    }

    impl StubCapability {
        fn any(name: &str) -> Arc<dyn Capability> {
            Arc::new(Self {
                name: name.to_string(),
                suffix: None,
            })
        }

        fn for_suffix(name: &str, suffix: &str) -> Arc<dyn Capability> {
            Arc::new(Self {
                name: name.to_string(),
                suffix: Some(suffix.to_string()),
            })
        }
    }

    #[async_trait]
    impl Capability for StubCapability {
        fn name(&self) -> &str {
            &self.name
        }

        fn features(&self) -> CapabilityFeatures {
            CapabilityFeatures::default()
        }

        fn can_handle(&self, url: &str) -> bool {
            match &self.suffix {
                Some(suffix) => url.ends_with(suffix.as_str()),
                None => true,
            }
        }

        async fn fetch(
            &self,
            _url: &str,
            _options: &FetchOptions,
        ) -> Result<FetchResponse, FetchError> {
            Err(FetchError::Network("stub".to_string()))
        }
    }

    fn registry_with(caps: Vec<Arc<dyn Capability>>) -> Arc<CapabilityRegistry> {
        let mut registry = CapabilityRegistry::new();
        for cap in caps {
            registry.register(cap).unwrap();
        }
        Arc::new(registry)
    }

    #[test]
    fn test_wildcard_pattern_translation() {
        let pattern = RulePattern::wildcard("*.pdf").unwrap();
        assert!(pattern.matches("https://a.com/doc.pdf"));
        assert!(!pattern.matches("https://a.com/doc.pdf?x=1"));
        assert!(!pattern.matches("https://a.com/page"));

        let all = RulePattern::wildcard("*").unwrap();
        assert!(all.matches("https://anything.com/at/all"));
    }

    #[test]
    fn test_literal_pattern_substring() {
        let pattern = RulePattern::literal("a.com/docs");
        assert!(pattern.matches("https://a.com/docs/intro"));
        assert!(!pattern.matches("https://a.com/blog"));
    }

    #[test]
    fn test_regex_pattern() {
        let pattern = RulePattern::regex(r"\.pdf(\?.*)?$").unwrap();
        assert!(pattern.matches("https://a.com/doc.pdf"));
        assert!(pattern.matches("https://a.com/doc.pdf?version=2"));
        assert!(!pattern.matches("https://a.com/doc.txt"));
    }

    #[test]
    fn test_parse_auto_detects_wildcard() {
        assert!(matches!(
            RulePattern::parse("*.pdf", None).unwrap(),
            RulePattern::Wildcard { .. }
        ));
        assert!(matches!(
            RulePattern::parse("a.com", None).unwrap(),
            RulePattern::Literal(_)
        ));
    }

    #[test]
    fn test_parse_rejects_unknown_kind() {
        assert!(RulePattern::parse("x", Some("glob")).is_err());
    }

    #[test]
    fn test_invalid_regex_is_config_error() {
        assert!(matches!(
            RulePattern::regex("("),
            Err(ConfigError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_priority_routing() {
        let registry = registry_with(vec![
            StubCapability::any("http"),
            StubCapability::any("docling"),
        ]);
        let mut selector = CapabilitySelector::new(registry);
        selector.add_rule(SelectionRule::new(
            RulePattern::wildcard("*.pdf").unwrap(),
            "docling",
            10,
        ));
        selector.add_rule(SelectionRule::new(
            RulePattern::wildcard("*").unwrap(),
            "http",
            0,
        ));

        assert_eq!(
            selector
                .select_capability("https://a.com/doc.pdf")
                .unwrap()
                .name(),
            "docling"
        );
        assert_eq!(
            selector
                .select_capability("https://a.com/page")
                .unwrap()
                .name(),
            "http"
        );
    }

    #[test]
    fn test_equal_priority_keeps_insertion_order() {
        let registry = registry_with(vec![
            StubCapability::any("first"),
            StubCapability::any("second"),
        ]);
        let mut selector = CapabilitySelector::new(registry);
        selector.add_rule(SelectionRule::new(RulePattern::literal("a.com"), "first", 5));
        selector.add_rule(SelectionRule::new(
            RulePattern::literal("a.com"),
            "second",
            5,
        ));

        assert_eq!(
            selector
                .select_capability("https://a.com/x")
                .unwrap()
                .name(),
            "first"
        );
    }

    #[test]
    fn test_rule_skipped_when_capability_cannot_handle() {
        let registry = registry_with(vec![
            StubCapability::for_suffix("pdf-only", ".pdf"),
            StubCapability::any("http"),
        ]);
        let mut selector = CapabilitySelector::new(registry);
        selector.add_rule(SelectionRule::new(
            RulePattern::wildcard("*").unwrap(),
            "pdf-only",
            10,
        ));

        // Rule matches but the capability declines; the scan finds http
        assert_eq!(
            selector
                .select_capability("https://a.com/page.html")
                .unwrap()
                .name(),
            "http"
        );
    }

    #[test]
    fn test_domain_fallback() {
        let registry = registry_with(vec![
            StubCapability::any("http"),
            StubCapability::any("browser"),
        ]);
        let mut selector = CapabilitySelector::new(registry);
        selector.set_domain_fallback("spa.example.com", "browser");

        assert_eq!(
            selector
                .select_capability("https://spa.example.com/app")
                .unwrap()
                .name(),
            "browser"
        );
        assert_eq!(
            selector
                .select_capability("https://other.com/page")
                .unwrap()
                .name(),
            "http"
        );
    }

    #[test]
    fn test_default_consulted_before_scan() {
        let mut registry = CapabilityRegistry::new();
        registry.register(StubCapability::any("first")).unwrap();
        registry.register(StubCapability::any("preferred")).unwrap();
        registry.set_default("preferred").unwrap();
        let selector = CapabilitySelector::new(Arc::new(registry));

        assert_eq!(
            selector
                .select_capability("https://a.com/x")
                .unwrap()
                .name(),
            "preferred"
        );
    }

    #[test]
    fn test_registration_order_scan_as_last_resort() {
        let registry = registry_with(vec![
            StubCapability::for_suffix("pdf-only", ".pdf"),
            StubCapability::for_suffix("html-only", ".html"),
        ]);
        let selector = CapabilitySelector::new(registry);

        assert_eq!(
            selector
                .select_capability("https://a.com/page.html")
                .unwrap()
                .name(),
            "html-only"
        );
    }

    #[test]
    fn test_no_capability_returns_none() {
        let registry = registry_with(vec![StubCapability::for_suffix("pdf-only", ".pdf")]);
        let selector = CapabilitySelector::new(registry);

        assert!(selector.select_capability("https://a.com/page.html").is_none());
    }

    #[test]
    fn test_group_by_capability() {
        let registry = registry_with(vec![
            StubCapability::any("http"),
            StubCapability::any("docling"),
        ]);
        let mut selector = CapabilitySelector::new(registry);
        selector.add_rule(SelectionRule::new(
            RulePattern::wildcard("*.pdf").unwrap(),
            "docling",
            10,
        ));

        let urls = vec![
            "https://a.com/one".to_string(),
            "https://a.com/doc.pdf".to_string(),
            "https://a.com/two".to_string(),
            "https://b.com/other.pdf".to_string(),
        ];
        let grouped = selector.group_by_capability(&urls);

        assert_eq!(grouped.buckets.len(), 2);
        assert_eq!(grouped.buckets[0].0, "http");
        assert_eq!(
            grouped.buckets[0].1,
            vec!["https://a.com/one", "https://a.com/two"]
        );
        assert_eq!(grouped.buckets[1].0, "docling");
        assert_eq!(
            grouped.buckets[1].1,
            vec!["https://a.com/doc.pdf", "https://b.com/other.pdf"]
        );
        assert!(grouped.unrouted.is_empty());
    }

    #[test]
    fn test_group_by_capability_collects_unrouted() {
        let registry = registry_with(vec![StubCapability::for_suffix("pdf-only", ".pdf")]);
        let selector = CapabilitySelector::new(registry);

        let urls = vec![
            "https://a.com/doc.pdf".to_string(),
            "https://a.com/page.html".to_string(),
        ];
        let grouped = selector.group_by_capability(&urls);

        assert_eq!(grouped.buckets.len(), 1);
        assert_eq!(grouped.unrouted, vec!["https://a.com/page.html"]);
    }
}
