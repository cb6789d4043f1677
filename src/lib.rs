//! LLM provider gateway library.
//!
//! Forwards generation requests to third-party LLM providers while keeping
//! provider keys encrypted at rest, retrying transient failures, recovering
//! structured output and caching successful answers.

pub mod admin;
pub mod cache;
pub mod config;
pub mod gateway;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod providers;
pub mod recovery;
pub mod resilience;
pub mod vault;

pub use config::schema::GatewayConfig;
pub use gateway::{Gateway, GatewayRequest, GatewayResponse};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
