//! Reloadable request policy.

use std::collections::HashMap;
use std::time::Duration;

use crate::config::GatewayConfig;
use crate::providers::ProviderKind;
use crate::resilience::RetryPolicy;

/// The part of the configuration a reload may change.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub default_policy: RetryPolicy,
    pub provider_policies: HashMap<ProviderKind, RetryPolicy>,
    pub cache_ttl: Duration,
    pub default_call_timeout: Duration,
    pub call_timeouts: HashMap<ProviderKind, Duration>,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self::from_config(&GatewayConfig::default())
    }
}

impl GatewaySettings {
    pub fn from_config(config: &GatewayConfig) -> Self {
        let provider_policies = config
            .providers
            .iter()
            .filter(|p| p.retries.is_some())
            .map(|p| (p.kind, config.retry_policy_for(p.kind)))
            .collect();
        let call_timeouts = config
            .providers
            .iter()
            .filter_map(|p| p.timeout_secs.map(|secs| (p.kind, Duration::from_secs(secs))))
            .collect();

        Self {
            default_policy: config.retries.to_policy(),
            provider_policies,
            cache_ttl: Duration::from_secs(config.cache.default_ttl_secs),
            default_call_timeout: Duration::from_secs(config.timeouts.provider_call_secs),
            call_timeouts,
        }
    }

    pub fn policy_for(&self, kind: ProviderKind) -> &RetryPolicy {
        self.provider_policies.get(&kind).unwrap_or(&self.default_policy)
    }

    pub fn timeout_for(&self, kind: ProviderKind) -> Duration {
        self.call_timeouts
            .get(&kind)
            .copied()
            .unwrap_or(self.default_call_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProviderConfig, RetryConfig};

    #[test]
    fn test_overrides_and_fallbacks() {
        let mut config = GatewayConfig::default();
        config.timeouts.provider_call_secs = 30;
        config.cache.default_ttl_secs = 120;

        let mut gemini = ProviderConfig::new(ProviderKind::Gemini);
        gemini.timeout_secs = Some(90);
        gemini.retries = Some(RetryConfig {
            max_retries: 6,
            ..RetryConfig::default()
        });
        config.providers.push(gemini);
        config.providers.push(ProviderConfig::new(ProviderKind::OpenAi));

        let settings = GatewaySettings::from_config(&config);
        assert_eq!(settings.policy_for(ProviderKind::Gemini).max_retries, 6);
        assert_eq!(settings.policy_for(ProviderKind::OpenAi).max_retries, 3);
        assert_eq!(settings.timeout_for(ProviderKind::Gemini), Duration::from_secs(90));
        assert_eq!(settings.timeout_for(ProviderKind::OpenAi), Duration::from_secs(30));
        assert_eq!(settings.cache_ttl, Duration::from_secs(120));
    }
}
