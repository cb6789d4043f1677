//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber from configuration
//! - Produce bounded, redacted excerpts of provider traffic for diagnostics
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured level when set
//! - JSON format for production, pretty format for development

use std::sync::OnceLock;

use regex::Regex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};

/// Maximum number of characters kept from any request/response excerpt.
pub const EXCERPT_LIMIT: usize = 500;

/// Initialize the global tracing subscriber.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("llm_gateway={0},tower_http={0}", config.log_level))
    });

    let result = match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init(),
    };

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

fn secret_pattern() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(
            r#"(?i)(bearer\s+[A-Za-z0-9._\-]+|\b(?:sk|pk|rk)-[A-Za-z0-9_\-]{8,}|\bAIza[0-9A-Za-z_\-]{20,}|(?:x-api-key|api[_-]?key)\s*[=:]\s*"?[A-Za-z0-9._\-]{8,}|[?&]key=[A-Za-z0-9._\-]{8,})"#,
        )
        .expect("invalid secret redaction regex")
    })
}

/// Replace bearer tokens and API-key-shaped substrings with a marker.
pub fn redact(text: &str) -> String {
    secret_pattern().replace_all(text, "[REDACTED]").into_owned()
}

/// Truncate to [`EXCERPT_LIMIT`] characters on a char boundary.
pub fn truncate(text: &str) -> String {
    truncate_to(text, EXCERPT_LIMIT)
}

/// Truncate to `limit` characters, appending a marker when anything was cut.
pub fn truncate_to(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}…[truncated]", &text[..idx]),
        None => text.to_string(),
    }
}

/// Redacted and truncated excerpt suitable for logs and error bodies.
pub fn excerpt(text: &str) -> String {
    truncate(&redact(text))
}
