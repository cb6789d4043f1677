//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Provider call:
//!     → timeouts.rs (bound the call with the provider deadline)
//!     → On failure: classifier.rs (map the failure onto the closed ErrorKind taxonomy)
//!     → retries.rs (retry allow-listed kinds with backoff.rs delays, up to max_retries)
//!     → ClassifiedError annotated with the final retry count
//! ```
//!
//! # Design Decisions
//! - Classification is an ordered rule list; first match wins, transport signals first
//! - ContentPolicy is never retried, whatever the allow-list says
//! - Sleep and jitter are injected so retry behavior is testable without a clock
//! - Waits are task suspensions; no lock is held across a retry delay

pub mod backoff;
pub mod classifier;
pub mod retries;
pub mod timeouts;

pub use classifier::{ClassifiedError, ErrorClassifier, ErrorKind, FailureContext, ProviderFailure};
pub use retries::{RetryCoordinator, RetryPolicy, Sleeper, TokioSleeper};
