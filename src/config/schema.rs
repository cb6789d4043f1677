//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::providers::ProviderKind;
use crate::resilience::{ErrorKind, RetryPolicy};
use crate::vault::MASTER_KEY_ENV_VAR;

/// Placeholder admin key shipped in defaults; refused when admin is enabled.
pub const ADMIN_KEY_PLACEHOLDER: &str = "CHANGE_ME_IN_PRODUCTION";

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Default retry policy for every provider.
    pub retries: RetryConfig,

    /// Enabled providers.
    pub providers: Vec<ProviderConfig>,

    /// Response cache settings.
    pub cache: CacheConfig,

    /// Credential vault settings.
    pub vault: VaultConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,
}

impl GatewayConfig {
    pub fn provider(&self, kind: ProviderKind) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.kind == kind)
    }

    /// Effective retry policy for `kind`: its override, else the default.
    pub fn retry_policy_for(&self, kind: ProviderKind) -> RetryPolicy {
        self.provider(kind)
            .and_then(|p| p.retries.as_ref())
            .unwrap_or(&self.retries)
            .to_policy()
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum accepted request body, in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upper bound on an inbound request, retries included, in seconds.
    pub request_secs: u64,

    /// Default bound on a single provider call, in seconds.
    pub provider_call_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 300,
            provider_call_secs: 60,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,

    /// Delay before the first retry in milliseconds.
    pub initial_delay_ms: u64,

    /// Ceiling on the pre-jitter delay in milliseconds.
    pub max_delay_ms: u64,

    /// Multiplier applied per retry.
    pub backoff_factor: f64,

    /// Failure kinds worth retrying.
    pub retryable_kinds: Vec<ErrorKind>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_factor: 2.0,
            retryable_kinds: ErrorKind::transient().to_vec(),
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_factor: self.backoff_factor,
            retryable_kinds: self.retryable_kinds.iter().copied().collect(),
        }
    }
}

/// One upstream provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,

    /// API root; the provider's public endpoint when unset.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Model used when a request names none.
    #[serde(default)]
    pub default_model: Option<String>,

    /// Output token limit used when a request names none.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-call timeout; `timeouts.provider_call_secs` when unset.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Replaces the default retry policy for this provider.
    #[serde(default)]
    pub retries: Option<RetryConfig>,
}

fn default_max_tokens() -> u32 {
    1024
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            base_url: None,
            default_model: None,
            max_tokens: default_max_tokens(),
            timeout_secs: None,
            retries: None,
        }
    }

    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(self.kind.default_base_url())
    }

    pub fn model(&self) -> &str {
        self.default_model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(self.kind.default_model())
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,

    /// TTL applied to new entries, in seconds.
    pub default_ttl_secs: u64,

    /// Entry count ceiling for the in-memory store.
    pub max_entries: usize,

    /// How often expired entries are swept, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_secs: 3600,
            max_entries: 10_000,
            sweep_interval_secs: 60,
        }
    }
}

/// Credential vault configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Environment variable holding the base64 master key.
    pub master_key_env: String,

    /// Where encrypted credentials are persisted; in-memory only when unset.
    pub credentials_path: Option<String>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            master_key_env: MASTER_KEY_ENV_VAR.to_string(),
            credentials_path: Some("credentials.json".to_string()),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Mount /admin routes.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: ADMIN_KEY_PLACEHOLDER.to_string(),
        }
    }
}
