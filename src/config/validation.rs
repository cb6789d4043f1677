//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and provider URLs
//! - Validate value ranges (timeouts > 0, sane backoff)
//! - Detect duplicate providers
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{GatewayConfig, RetryConfig, ADMIN_KEY_PLACEHOLDER};
use crate::resilience::ErrorKind;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field}: '{value}' is not a valid socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("provider {provider}: invalid base_url '{value}': {reason}")]
    InvalidUrl {
        provider: String,
        value: String,
        reason: String,
    },

    #[error("provider {0} is configured more than once")]
    DuplicateProvider(String),

    #[error("{scope}: {reason}")]
    InvalidRetryPolicy { scope: String, reason: String },

    #[error("{field} must be greater than zero")]
    NonPositive { field: String },

    #[error("admin.api_key must be changed from the placeholder when admin is enabled")]
    PlaceholderAdminKey,

    #[error("observability.log_level '{0}' is not a known level")]
    UnknownLogLevel(String),
}

/// Check everything serde cannot.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if !matches!(
        config.observability.log_level.to_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        errors.push(ValidationError::UnknownLogLevel(config.observability.log_level.clone()));
    }

    check_positive(&mut errors, "listener.max_body_bytes", config.listener.max_body_bytes as u64);
    check_positive(&mut errors, "timeouts.request_secs", config.timeouts.request_secs);
    check_positive(&mut errors, "timeouts.provider_call_secs", config.timeouts.provider_call_secs);

    check_retry(&mut errors, "retries", &config.retries);

    let mut seen = HashSet::new();
    for provider in &config.providers {
        let name = provider.kind.as_str();
        if !seen.insert(provider.kind) {
            errors.push(ValidationError::DuplicateProvider(name.to_string()));
        }

        if let Err(e) = url::Url::parse(provider.base_url()) {
            errors.push(ValidationError::InvalidUrl {
                provider: name.to_string(),
                value: provider.base_url().to_string(),
                reason: e.to_string(),
            });
        }

        if let Some(secs) = provider.timeout_secs {
            check_positive(&mut errors, &format!("providers.{}.timeout_secs", name), secs);
        }
        check_positive(
            &mut errors,
            &format!("providers.{}.max_tokens", name),
            provider.max_tokens as u64,
        );

        if let Some(retries) = &provider.retries {
            check_retry(&mut errors, &format!("providers.{}.retries", name), retries);
        }
    }

    if config.cache.enabled {
        check_positive(&mut errors, "cache.default_ttl_secs", config.cache.default_ttl_secs);
        check_positive(&mut errors, "cache.max_entries", config.cache.max_entries as u64);
        check_positive(&mut errors, "cache.sweep_interval_secs", config.cache.sweep_interval_secs);
    }

    let admin_key = &config.admin.api_key;
    if config.admin.enabled && (admin_key == ADMIN_KEY_PLACEHOLDER || admin_key.is_empty()) {
        errors.push(ValidationError::PlaceholderAdminKey);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn check_positive(errors: &mut Vec<ValidationError>, field: &str, value: u64) {
    if value == 0 {
        errors.push(ValidationError::NonPositive {
            field: field.to_string(),
        });
    }
}

fn check_retry(errors: &mut Vec<ValidationError>, scope: &str, retries: &RetryConfig) {
    let mut fail = |reason: String| {
        errors.push(ValidationError::InvalidRetryPolicy {
            scope: scope.to_string(),
            reason,
        })
    };

    if !retries.backoff_factor.is_finite() || retries.backoff_factor < 1.0 {
        fail(format!("backoff_factor must be >= 1, got {}", retries.backoff_factor));
    }
    if retries.initial_delay_ms > retries.max_delay_ms {
        fail(format!(
            "initial_delay_ms ({}) exceeds max_delay_ms ({})",
            retries.initial_delay_ms, retries.max_delay_ms
        ));
    }
    if retries.retryable_kinds.contains(&ErrorKind::ContentPolicy) {
        fail("ContentPolicy failures are never retryable".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ProviderConfig;
    use crate::providers::ProviderKind;

    #[test]
    fn test_defaults_are_valid() {
        assert_eq!(validate_config(&GatewayConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "not-an-address".to_string();
        config.retries.backoff_factor = 0.5;
        config.retries.initial_delay_ms = 60_000;
        config.retries.retryable_kinds.push(ErrorKind::ContentPolicy);
        config.cache.default_ttl_secs = 0;
        config.admin.enabled = true;

        let mut bad = ProviderConfig::new(ProviderKind::OpenAi);
        bad.base_url = Some("::not a url".to_string());
        config.providers.push(bad);
        config.providers.push(ProviderConfig::new(ProviderKind::OpenAi));

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, ValidationError::InvalidAddress { .. })));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::InvalidUrl { .. })));
        assert!(errors.contains(&ValidationError::DuplicateProvider("openai".to_string())));
        assert_eq!(
            errors
                .iter()
                .filter(|e| matches!(e, ValidationError::InvalidRetryPolicy { .. }))
                .count(),
            3
        );
        assert!(errors.contains(&ValidationError::NonPositive {
            field: "cache.default_ttl_secs".to_string()
        }));
        assert!(errors.contains(&ValidationError::PlaceholderAdminKey));
    }

    #[test]
    fn test_disabled_cache_skips_ttl_check() {
        let mut config = GatewayConfig::default();
        config.cache.enabled = false;
        config.cache.default_ttl_secs = 0;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_provider_override_checked() {
        let mut config = GatewayConfig::default();
        let mut provider = ProviderConfig::new(ProviderKind::Anthropic);
        provider.retries = Some(RetryConfig {
            backoff_factor: 0.0,
            ..RetryConfig::default()
        });
        config.providers.push(provider);

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().starts_with("providers.anthropic.retries"));
    }
}
