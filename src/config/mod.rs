//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, path from GATEWAY_CONFIG or argv[1])
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → startup builds the gateway from it
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → watcher.rs diffs against the running config (duplicates dropped,
//!       restart-only sections logged)
//!     → mpsc to the server
//!     → Gateway::apply_config swaps retry policies, cache TTL and call timeouts
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - The master key is never read from the file
//! - Provider set and listener address are fixed at startup; reload only touches policy

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, resolve_config_path, ConfigError, CONFIG_ENV_VAR};
pub use schema::{
    AdminConfig, CacheConfig, GatewayConfig, ListenerConfig, LogFormat, ObservabilityConfig,
    ProviderConfig, RetryConfig, TimeoutConfig, VaultConfig,
};
pub use validation::{validate_config, ValidationError};
pub use watcher::ConfigWatcher;
