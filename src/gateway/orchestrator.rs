//! The request pipeline.

use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use thiserror::Error;

use super::request::{GatewayRequest, GatewayResponse};
use super::settings::GatewaySettings;
use crate::cache::{CachedResponse, Fingerprint, ResponseCache};
use crate::config::GatewayConfig;
use crate::observability::metrics;
use crate::providers::{ProviderKind, ProviderRegistry};
use crate::recovery;
use crate::resilience::timeouts::with_timeout;
use crate::resilience::{ClassifiedError, ErrorKind, FailureContext, RetryCoordinator};
use crate::vault::{Credentials, VaultError};

/// Why a request did not produce content.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("provider '{0}' is not configured")]
    UnknownProvider(ProviderKind),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Credential(#[from] VaultError),

    /// Provider or recovery failure, already classified.
    #[error(transparent)]
    Classified(#[from] ClassifiedError),
}

impl GatewayError {
    /// Taxonomy view. Failures outside the provider path are `Unknown`.
    pub fn to_classified(&self) -> ClassifiedError {
        match self {
            GatewayError::Classified(e) => e.clone(),
            other => ClassifiedError::new(ErrorKind::Unknown, other.to_string(), None, None, None),
        }
    }

    pub fn outcome(&self) -> &'static str {
        match self {
            GatewayError::UnknownProvider(_) => "unknown_provider",
            GatewayError::InvalidRequest(_) => "invalid_request",
            GatewayError::Credential(_) => "credential_error",
            GatewayError::Classified(e) => e.kind().as_str(),
        }
    }
}

/// Successful result of one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub content: serde_json::Value,
    pub raw_content: String,
    pub cached: bool,
}

struct GatewayInner {
    registry: ProviderRegistry,
    credentials: Credentials,
    cache: ResponseCache,
    retry: RetryCoordinator,
    settings: ArcSwap<GatewaySettings>,
}

/// Composes registry, vault, retry, recovery and cache. Cheap to clone.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

impl Gateway {
    pub fn new(
        registry: ProviderRegistry,
        credentials: Credentials,
        cache: ResponseCache,
        retry: RetryCoordinator,
        settings: GatewaySettings,
    ) -> Self {
        Self {
            inner: Arc::new(GatewayInner {
                registry,
                credentials,
                cache,
                retry,
                settings: ArcSwap::from_pointee(settings),
            }),
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.inner.registry
    }

    pub fn credentials(&self) -> &Credentials {
        &self.inner.credentials
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.inner.cache
    }

    pub fn settings(&self) -> Arc<GatewaySettings> {
        self.inner.settings.load_full()
    }

    /// Swap in the policy parts of a reloaded config. In-flight requests keep
    /// the settings they started with.
    pub fn apply_config(&self, config: &GatewayConfig) {
        for provider in &config.providers {
            if self.inner.registry.get(provider.kind).is_none() {
                tracing::warn!(
                    provider = %provider.kind,
                    "Provider added by reload is ignored until restart"
                );
            }
        }
        self.inner.settings.store(Arc::new(GatewaySettings::from_config(config)));
        tracing::info!("Gateway settings reloaded");
    }

    /// Service one request and wrap the outcome in the response envelope.
    pub async fn handle(&self, request: GatewayRequest) -> GatewayResponse {
        match self.execute(request).await {
            Ok(generation) => GatewayResponse::success(
                generation.content,
                generation.raw_content,
                generation.cached,
            ),
            Err(e) => GatewayResponse::failure(e.to_classified()),
        }
    }

    /// Service one request.
    pub async fn execute(&self, request: GatewayRequest) -> Result<Generation, GatewayError> {
        let start = Instant::now();
        let provider = request.provider;
        let result = self.run(request).await;

        let outcome = match &result {
            Ok(generation) if generation.cached => "cache_hit",
            Ok(_) => "success",
            Err(e) => e.outcome(),
        };
        metrics::record_request(provider.as_str(), outcome, start);
        result
    }

    async fn run(&self, request: GatewayRequest) -> Result<Generation, GatewayError> {
        let GatewayRequest {
            provider,
            payload,
            expected_format,
            credential_owner_id,
        } = request;

        let (client, defaults) = match (
            self.inner.registry.get(provider),
            self.inner.registry.settings(provider),
        ) {
            (Some(client), Some(defaults)) => (client.clone(), defaults),
            _ => return Err(GatewayError::UnknownProvider(provider)),
        };

        if credential_owner_id.trim().is_empty() {
            return Err(GatewayError::InvalidRequest("credentialOwnerId is empty".to_string()));
        }
        let payload = payload.normalized(defaults);
        if payload.prompt.is_empty() {
            return Err(GatewayError::InvalidRequest("prompt is empty".to_string()));
        }

        let fingerprint = Fingerprint::compute(provider, expected_format, &payload);
        if let Some(hit) = self.inner.cache.get(&fingerprint).await {
            tracing::info!(provider = %provider, fingerprint = %fingerprint, "Served from cache");
            return Ok(Generation {
                content: hit.content,
                raw_content: hit.raw_content,
                cached: true,
            });
        }

        // One snapshot for the whole request, retries included.
        let settings = self.inner.settings.load_full();
        let policy = settings.policy_for(provider);
        let call_timeout = settings.timeout_for(provider);
        let context = FailureContext::new(provider.as_str())
            .with_request(serde_json::to_string(&payload).unwrap_or_default());

        let raw = {
            let key = self
                .inner
                .credentials
                .load(&credential_owner_id, provider)
                .await?;

            self.inner
                .retry
                .execute_with_retry(policy, &context, || {
                    with_timeout(call_timeout, client.call(&payload, &key))
                })
                .await?
        };

        let content = match expected_format.structured() {
            None => serde_json::Value::String(raw.clone()),
            Some(format) => {
                let recovered = recovery::recover(&raw, format).map_err(ClassifiedError::from)?;
                if recovered.repaired {
                    tracing::info!(
                        provider = %provider,
                        format = %format,
                        "Model output needed repair"
                    );
                }
                recovered.value
            }
        };

        let entry = CachedResponse {
            content,
            raw_content: raw,
        };
        self.inner.cache.put(&fingerprint, &entry, settings.cache_ttl).await;

        tracing::info!(
            provider = %provider,
            format = %expected_format,
            fingerprint = %fingerprint,
            "Request completed"
        );

        Ok(Generation {
            content: entry.content,
            raw_content: entry.raw_content,
            cached: false,
        })
    }
}
