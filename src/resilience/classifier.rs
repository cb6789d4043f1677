//! Failure classification.
//!
//! # Responsibilities
//! - Describe upstream failures in a transport-neutral [`ProviderFailure`]
//! - Map every failure onto exactly one [`ErrorKind`] via an ordered rule list
//! - Log the classification with a redacted, truncated excerpt of the traffic
//!
//! # Rule order
//! ```text
//! connection_refused_or_reset → Network
//! transport_timeout           → Timeout
//! rate_limited                → RateLimit
//! content_policy              → ContentPolicy
//! timeout_status              → Timeout
//! malformed_envelope          → ParseError
//! invalid_response            → InvalidResponse
//! timeout_message             → Timeout
//! network_message             → Network
//! (no match)                  → Unknown
//! ```
//! Rate limiting is checked before the generic 5xx rule so a 429 wrapped in a
//! 502/503 still classifies as RateLimit.

use std::fmt;
use std::io;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observability::{logging, metrics};

/// Closed failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Network,
    Timeout,
    RateLimit,
    ContentPolicy,
    InvalidResponse,
    ParseError,
    StructuredParseError,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "Network",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::RateLimit => "RateLimit",
            ErrorKind::ContentPolicy => "ContentPolicy",
            ErrorKind::InvalidResponse => "InvalidResponse",
            ErrorKind::ParseError => "ParseError",
            ErrorKind::StructuredParseError => "StructuredParseError",
            ErrorKind::Unknown => "Unknown",
        }
    }

    /// Kinds retried by the default policy.
    pub fn transient() -> [ErrorKind; 4] {
        [
            ErrorKind::Network,
            ErrorKind::Timeout,
            ErrorKind::RateLimit,
            ErrorKind::InvalidResponse,
        ]
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure reported by a provider adapter, before classification.
#[derive(Debug, Error)]
pub enum ProviderFailure {
    /// Transport could not reach or stay connected to the provider.
    #[error("transport error: {message}")]
    Transport {
        code: Option<io::ErrorKind>,
        message: String,
    },

    /// The call did not complete within its deadline.
    #[error("request timed out: {message}")]
    Timeout { message: String },

    /// The provider answered with a non-success HTTP status.
    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The provider answered 2xx but the envelope could not be decoded.
    #[error("failed to parse provider response: {message}")]
    Decode { message: String, body: String },

    /// The envelope decoded but carried no generated content.
    #[error("provider returned an empty response")]
    EmptyResponse { body: String },

    #[error("{0}")]
    Other(String),
}

impl ProviderFailure {
    /// HTTP status, when the failure carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderFailure::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Raw upstream body, when the failure carries one.
    pub fn body(&self) -> Option<&str> {
        match self {
            ProviderFailure::Status { body, .. }
            | ProviderFailure::Decode { body, .. }
            | ProviderFailure::EmptyResponse { body } => Some(body.as_str()),
            _ => None,
        }
    }
}

/// Signals extracted once from a failure and shared by all rules.
#[derive(Debug)]
pub struct FailureSignals {
    pub io_kind: Option<io::ErrorKind>,
    pub timed_out: bool,
    pub status: Option<u16>,
    pub decode_failed: bool,
    pub empty: bool,
    /// Lowercased message and body.
    pub text: String,
}

impl FailureSignals {
    pub fn from_failure(failure: &ProviderFailure) -> Self {
        let mut text = failure.to_string();
        if let ProviderFailure::Decode { body, .. } | ProviderFailure::EmptyResponse { body } =
            failure
        {
            text.push(' ');
            text.push_str(body);
        }

        Self {
            io_kind: match failure {
                ProviderFailure::Transport { code, .. } => *code,
                _ => None,
            },
            timed_out: matches!(failure, ProviderFailure::Timeout { .. }),
            status: failure.status(),
            decode_failed: matches!(failure, ProviderFailure::Decode { .. }),
            empty: matches!(failure, ProviderFailure::EmptyResponse { .. }),
            text: text.to_lowercase(),
        }
    }

    fn mentions(&self, needles: &[&str]) -> bool {
        needles.iter().any(|n| self.text.contains(n))
    }
}

/// One entry of the ordered classification table.
#[derive(Clone, Copy)]
pub struct ClassificationRule {
    pub name: &'static str,
    pub kind: ErrorKind,
    pub matches: fn(&FailureSignals) -> bool,
}

impl fmt::Debug for ClassificationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassificationRule")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

fn connection_refused_or_reset(s: &FailureSignals) -> bool {
    matches!(
        s.io_kind,
        Some(
            io::ErrorKind::ConnectionRefused
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::NotConnected
                | io::ErrorKind::BrokenPipe
        )
    ) || s.mentions(&[
        "econnrefused",
        "econnreset",
        "econnaborted",
        "epipe",
        "connection refused",
        "connection reset",
    ])
}

fn transport_timeout(s: &FailureSignals) -> bool {
    s.timed_out || s.io_kind == Some(io::ErrorKind::TimedOut) || s.mentions(&["etimedout"])
}

fn rate_limited(s: &FailureSignals) -> bool {
    s.status == Some(429)
        || s.mentions(&[
            "rate limit",
            "rate_limit",
            "ratelimit",
            "too many requests",
            "resource_exhausted",
            "quota",
            "overloaded",
        ])
}

fn content_policy(s: &FailureSignals) -> bool {
    s.mentions(&[
        "content policy",
        "content_policy",
        "content management policy",
        "content_filter",
        "safety",
        "moderation",
        "flagged",
        "blockreason",
        "prohibited_content",
    ])
}

fn timeout_status(s: &FailureSignals) -> bool {
    matches!(s.status, Some(408 | 504))
}

fn malformed_envelope(s: &FailureSignals) -> bool {
    s.decode_failed
        || s.mentions(&["failed to parse", "unexpected token", "invalid json", "expected value at"])
}

fn invalid_response(s: &FailureSignals) -> bool {
    s.empty
        || s.status.is_some_and(|code| (500..600).contains(&code))
        || s.mentions(&["invalid response", "empty response"])
}

fn timeout_message(s: &FailureSignals) -> bool {
    s.mentions(&["timed out", "timeout", "deadline exceeded"])
}

fn network_message(s: &FailureSignals) -> bool {
    s.mentions(&[
        "network",
        "dns error",
        "enotfound",
        "socket hang up",
        "connection closed",
        "error trying to connect",
    ])
}

/// The built-in rule table, in evaluation order.
pub fn default_rules() -> Vec<ClassificationRule> {
    vec![
        ClassificationRule {
            name: "connection_refused_or_reset",
            kind: ErrorKind::Network,
            matches: connection_refused_or_reset,
        },
        ClassificationRule {
            name: "transport_timeout",
            kind: ErrorKind::Timeout,
            matches: transport_timeout,
        },
        ClassificationRule {
            name: "rate_limited",
            kind: ErrorKind::RateLimit,
            matches: rate_limited,
        },
        ClassificationRule {
            name: "content_policy",
            kind: ErrorKind::ContentPolicy,
            matches: content_policy,
        },
        ClassificationRule {
            name: "timeout_status",
            kind: ErrorKind::Timeout,
            matches: timeout_status,
        },
        ClassificationRule {
            name: "malformed_envelope",
            kind: ErrorKind::ParseError,
            matches: malformed_envelope,
        },
        ClassificationRule {
            name: "invalid_response",
            kind: ErrorKind::InvalidResponse,
            matches: invalid_response,
        },
        ClassificationRule {
            name: "timeout_message",
            kind: ErrorKind::Timeout,
            matches: timeout_message,
        },
        ClassificationRule {
            name: "network_message",
            kind: ErrorKind::Network,
            matches: network_message,
        },
    ]
}

/// Request-side context attached to a classification.
#[derive(Debug, Clone, Default)]
pub struct FailureContext {
    pub provider: Option<String>,
    pub raw_request: Option<String>,
}

impl FailureContext {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: Some(provider.into()),
            raw_request: None,
        }
    }

    pub fn with_request(mut self, raw_request: impl Into<String>) -> Self {
        self.raw_request = Some(raw_request.into());
        self
    }
}

/// A failure mapped onto the taxonomy.
///
/// Immutable: annotating the retry count yields a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedError {
    kind: ErrorKind,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    status_code: Option<u16>,
    retry_count: u32,
    /// Milliseconds since the Unix epoch.
    timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    raw_request: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    raw_response: Option<String>,
}

impl ClassifiedError {
    /// Build a classified error. Excerpts are redacted and truncated here.
    pub fn new(
        kind: ErrorKind,
        message: impl Into<String>,
        status_code: Option<u16>,
        raw_request: Option<&str>,
        raw_response: Option<&str>,
    ) -> Self {
        Self {
            kind,
            message: logging::excerpt(&message.into()),
            status_code,
            retry_count: 0,
            timestamp: now_millis(),
            raw_request: raw_request.map(logging::excerpt),
            raw_response: raw_response.map(logging::excerpt),
        }
    }

    /// Structured output could not be recovered; `original` is kept truncated.
    pub fn structured_parse(message: impl Into<String>, original: &str) -> Self {
        Self::new(ErrorKind::StructuredParseError, message, None, None, Some(original))
    }

    pub fn with_retry_count(self, retry_count: u32) -> Self {
        Self { retry_count, ..self }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn raw_request(&self) -> Option<&str> {
        self.raw_request.as_deref()
    }

    pub fn raw_response(&self) -> Option<&str> {
        self.raw_response.as_deref()
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ClassifiedError {}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Ordered-rule classifier.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    rules: Vec<ClassificationRule>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::with_rules(default_rules())
    }
}

impl ErrorClassifier {
    pub fn with_rules(rules: Vec<ClassificationRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    /// Kind only, without building an error or logging.
    pub fn kind_of(&self, failure: &ProviderFailure) -> ErrorKind {
        let signals = FailureSignals::from_failure(failure);
        self.rules
            .iter()
            .find(|rule| (rule.matches)(&signals))
            .map(|rule| rule.kind)
            .unwrap_or(ErrorKind::Unknown)
    }

    /// Classify a failure and log the result.
    pub fn classify(&self, failure: &ProviderFailure, context: &FailureContext) -> ClassifiedError {
        let signals = FailureSignals::from_failure(failure);
        let matched = self.rules.iter().find(|rule| (rule.matches)(&signals));
        let kind = matched.map(|rule| rule.kind).unwrap_or(ErrorKind::Unknown);

        let classified = ClassifiedError::new(
            kind,
            failure.to_string(),
            failure.status(),
            context.raw_request.as_deref(),
            failure.body(),
        );

        metrics::record_classification(kind.as_str());
        tracing::warn!(
            provider = context.provider.as_deref().unwrap_or("unknown"),
            kind = %kind,
            rule = matched.map(|rule| rule.name).unwrap_or("none"),
            status = ?classified.status_code(),
            request = classified.raw_request().unwrap_or(""),
            response = classified.raw_response().unwrap_or(""),
            "Classified provider failure"
        );

        classified
    }
}
