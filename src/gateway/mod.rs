//! Gateway orchestration.
//!
//! # Data Flow
//! ```text
//! GatewayRequest {provider, payload, expectedFormat, credentialOwnerId}
//!     → payload normalized with the provider's defaults
//!     → cache::Fingerprint
//!     → ResponseCache::get ── hit ──▶ GatewayResponse (cached = true)
//!     → Credentials::load (decrypt, scoped to this call)
//!     → RetryCoordinator::execute_with_retry
//!         → timeouts::with_timeout(ProviderClient::call)
//!     → recovery::recover (json / yaml only)
//!     → ResponseCache::put (successes only)
//!     → GatewayResponse
//! ```
//!
//! # Design Decisions
//! - The orchestrator is the only place the five components meet
//! - Classified errors from retry and recovery are surfaced unchanged
//! - Policy settings live behind an `ArcSwap` so config reloads never block requests

pub mod orchestrator;
pub mod request;
pub mod settings;

pub use orchestrator::{Gateway, GatewayError, Generation};
pub use request::{ExpectedFormat, GatewayRequest, GatewayResponse, ResponseStatus};
pub use settings::GatewaySettings;
