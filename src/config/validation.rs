use crate::capability::RulePattern;
use crate::config::types::{Config, IngestConfig, RetrySettings, RuleEntry};
use crate::ConfigError;
use std::collections::HashSet;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_ingest_config(&config.ingest)?;
    validate_retry_settings(&config.retry)?;
    validate_output_config(config)?;
    validate_capabilities(config)?;
    validate_rules(config)?;
    validate_fallback_domains(config)?;
    Ok(())
}

/// Validates ingestion configuration
fn validate_ingest_config(config: &IngestConfig) -> Result<(), ConfigError> {
    if config.max_concurrent < 1 || config.max_concurrent > 100 {
        return Err(ConfigError::Validation(format!(
            "max-concurrent must be between 1 and 100, got {}",
            config.max_concurrent
        )));
    }

    if config.default_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "default-timeout-ms must be > 0".to_string(),
        ));
    }

    Ok(())
}

/// Validates retry settings
fn validate_retry_settings(settings: &RetrySettings) -> Result<(), ConfigError> {
    if settings.max_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "max-retries must be <= 10, got {}",
            settings.max_retries
        )));
    }

    if settings.retry_delay_ms == 0 {
        return Err(ConfigError::Validation(
            "retry-delay-ms must be > 0".to_string(),
        ));
    }

    if settings.backoff_factor < 1.0 {
        return Err(ConfigError::Validation(format!(
            "backoff-factor must be >= 1.0, got {}",
            settings.backoff_factor
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &Config) -> Result<(), ConfigError> {
    if config.output.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates capability entries: names, uniqueness, default, parameters
fn validate_capabilities(config: &Config) -> Result<(), ConfigError> {
    if config.capability.is_empty() {
        return Err(ConfigError::Validation(
            "At least one capability must be configured".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    let mut defaults = 0;

    for entry in &config.capability {
        if entry.name.is_empty() {
            return Err(ConfigError::Validation(
                "Capability name cannot be empty".to_string(),
            ));
        }

        if !seen.insert(entry.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Duplicate capability name '{}'",
                entry.name
            )));
        }

        if entry.default {
            defaults += 1;
        }

        entry.params.validate()?;
    }

    if defaults > 1 {
        return Err(ConfigError::Validation(
            "At most one capability may be marked default".to_string(),
        ));
    }

    Ok(())
}

/// Validates rules: patterns compile and referenced capabilities exist
fn validate_rules(config: &Config) -> Result<(), ConfigError> {
    let names: HashSet<&str> = config.capability.iter().map(|c| c.name.as_str()).collect();

    for rule in &config.rule {
        validate_rule(rule, &names)?;
    }

    Ok(())
}

fn validate_rule(rule: &RuleEntry, names: &HashSet<&str>) -> Result<(), ConfigError> {
    if rule.pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Rule pattern cannot be empty".to_string(),
        ));
    }

    // Compile once here so bad patterns fail at load time
    RulePattern::parse(&rule.pattern, rule.match_kind.as_deref())?;

    if !names.contains(rule.capability.as_str()) {
        return Err(ConfigError::Validation(format!(
            "Rule pattern '{}' references unknown capability '{}'",
            rule.pattern, rule.capability
        )));
    }

    Ok(())
}

/// Validates the fallback domain map
fn validate_fallback_domains(config: &Config) -> Result<(), ConfigError> {
    let names: HashSet<&str> = config.capability.iter().map(|c| c.name.as_str()).collect();

    for (domain, capability) in &config.fallback_domains {
        if domain.is_empty() {
            return Err(ConfigError::Validation(
                "Fallback domain cannot be empty".to_string(),
            ));
        }
        if !names.contains(capability.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Fallback for domain '{}' references unknown capability '{}'",
                domain, capability
            )));
        }
    }

    Ok(())
}
