//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize all subsystems in dependency order:
//!   config → vault → credential store → cache → provider registry → gateway
//! - Start background tasks (cache sweeper)
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast;

use crate::cache::{MemoryCacheStore, ResponseCache};
use crate::config::GatewayConfig;
use crate::gateway::{Gateway, GatewaySettings};
use crate::providers::ProviderRegistry;
use crate::resilience::{ErrorClassifier, ProviderFailure, RetryCoordinator};
use crate::vault::{
    CredentialStore, CredentialVault, Credentials, MasterKey, MemoryCredentialStore, StoreError,
    VaultError,
};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("master key: {0}")]
    MasterKey(#[from] VaultError),

    #[error("credential store: {0}")]
    Store(#[from] StoreError),

    #[error("provider setup: {0}")]
    Provider(#[from] ProviderFailure),

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Read the master key from the env var named in config.
pub fn master_key_from_env(config: &GatewayConfig) -> Result<MasterKey, StartupError> {
    Ok(MasterKey::from_env(&config.vault.master_key_env)?)
}

/// Everything a running gateway owns.
pub struct Components {
    pub gateway: Gateway,
    pub credential_store: Arc<dyn CredentialStore>,
    /// Present when caching is enabled; run it with the shutdown receiver.
    pub cache_store: Option<MemoryCacheStore>,
}

/// Build the gateway from a validated config.
pub fn build_gateway(
    config: &GatewayConfig,
    master_key: &MasterKey,
) -> Result<Components, StartupError> {
    let vault = Arc::new(CredentialVault::new(master_key));

    let credential_store: Arc<dyn CredentialStore> = match &config.vault.credentials_path {
        Some(path) => Arc::new(MemoryCredentialStore::load_from_file(PathBuf::from(path))?),
        None => Arc::new(MemoryCredentialStore::new(None)),
    };
    tracing::info!(count = credential_store.len(), "Credential store ready");

    let (cache, cache_store) = if config.cache.enabled {
        let store = MemoryCacheStore::new(config.cache.max_entries);
        (ResponseCache::new(Arc::new(store.clone())), Some(store))
    } else {
        tracing::info!("Response cache disabled");
        (ResponseCache::disabled(), None)
    };

    let registry = ProviderRegistry::from_config(config)?;
    if registry.kinds().is_empty() {
        tracing::warn!("No providers configured; every request will fail");
    }

    let retry = RetryCoordinator::new(Arc::new(ErrorClassifier::default()));
    let gateway = Gateway::new(
        registry,
        Credentials::new(vault, credential_store.clone()),
        cache,
        retry,
        GatewaySettings::from_config(config),
    );

    Ok(Components {
        gateway,
        credential_store,
        cache_store,
    })
}

/// Spawn the cache sweeper, if the cache is enabled.
pub fn spawn_background_tasks(
    config: &GatewayConfig,
    components: &Components,
    shutdown_rx: broadcast::Receiver<()>,
) -> Option<tokio::task::JoinHandle<()>> {
    let store = components.cache_store.clone()?;
    let interval = Duration::from_secs(config.cache.sweep_interval_secs.max(1));
    Some(tokio::spawn(store.run_sweeper(interval, shutdown_rx)))
}
