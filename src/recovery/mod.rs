//! Structured response recovery.
//!
//! # Data Flow
//! ```text
//! raw model text
//!     → sanitize.rs (control characters, unsafe type tags; always runs)
//!     → strict parse (JSON via serde_json, YAML via serde_yaml + tag rejection)
//!     → On failure: repair.rs (fences → markup → quotes → trailing commas → YAML indentation)
//!     → single reparse
//!     → serde_json::Value, or RecoveryError with the truncated original
//! ```
//!
//! # Design Decisions
//! - Model output is attacker-influenced, so sanitization is unconditional
//! - YAML is parsed into an untyped tree; any surviving non-core tag is rejected
//!   rather than interpreted
//! - Recovery never guesses: if the repaired text does not parse, callers get an error

pub mod repair;
pub mod sanitize;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observability::logging;
use crate::resilience::ClassifiedError;

/// Largest input accepted for structured parsing, in bytes.
pub const MAX_INPUT_BYTES: usize = 1024 * 1024;

/// Structured output formats the gateway can recover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructuredFormat {
    Json,
    Yaml,
}

impl fmt::Display for StructuredFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructuredFormat::Json => f.write_str("json"),
            StructuredFormat::Yaml => f.write_str("yaml"),
        }
    }
}

/// Structured output could not be recovered.
#[derive(Debug, Clone, Error)]
#[error("could not recover {format} output: {reason}")]
pub struct RecoveryError {
    pub format: StructuredFormat,
    pub reason: String,
    /// Redacted, truncated original text.
    pub excerpt: String,
}

impl RecoveryError {
    fn new(format: StructuredFormat, reason: impl Into<String>, original: &str) -> Self {
        Self {
            format,
            reason: reason.into(),
            excerpt: logging::excerpt(original),
        }
    }
}

impl From<RecoveryError> for ClassifiedError {
    fn from(err: RecoveryError) -> Self {
        ClassifiedError::structured_parse(err.to_string(), &err.excerpt)
    }
}

/// Outcome of a successful recovery.
#[derive(Debug, Clone, PartialEq)]
pub struct Recovered {
    pub value: serde_json::Value,
    /// Whether textual repairs were needed.
    pub repaired: bool,
}

/// Sanitize, parse and, if needed, repair `raw` as `format`.
pub fn recover(raw: &str, format: StructuredFormat) -> Result<Recovered, RecoveryError> {
    if raw.len() > MAX_INPUT_BYTES {
        return Err(RecoveryError::new(
            format,
            format!("input exceeds {} bytes", MAX_INPUT_BYTES),
            raw,
        ));
    }

    let sanitized = sanitize::sanitize(raw, format);

    let first_error = match parse_strict(&sanitized, format) {
        Ok(value) => {
            return Ok(Recovered {
                value,
                repaired: false,
            })
        }
        Err(reason) => reason,
    };

    let repaired = repair::repair(&sanitized, format);
    // Repairs must not reintroduce anything the sanitizer removed.
    let repaired = sanitize::sanitize(&repaired, format);

    match parse_strict(&repaired, format) {
        Ok(value) => {
            tracing::debug!(
                format = %format,
                first_error = %first_error,
                "Recovered structured output after repair"
            );
            Ok(Recovered {
                value,
                repaired: true,
            })
        }
        Err(reason) => {
            tracing::warn!(
                format = %format,
                reason = %reason,
                excerpt = %logging::excerpt(raw),
                "Structured output recovery failed"
            );
            Err(RecoveryError::new(format, reason, raw))
        }
    }
}

/// Strict parse with no repairs. Input is expected to be sanitized already.
pub fn parse_strict(text: &str, format: StructuredFormat) -> Result<serde_json::Value, String> {
    match format {
        StructuredFormat::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
        StructuredFormat::Yaml => {
            let value: serde_yaml::Value = serde_yaml::from_str(text).map_err(|e| e.to_string())?;
            yaml_to_json(value)
        }
    }
}

const CORE_TAGS: [&str; 7] = ["str", "int", "float", "bool", "null", "seq", "map"];

fn is_core_tag(tag: &serde_yaml::value::Tag) -> bool {
    let name = tag.to_string();
    let name = name.trim_start_matches('!');
    let name = name.strip_prefix("tag:yaml.org,2002:").unwrap_or(name);
    CORE_TAGS.contains(&name)
}

/// Convert an untyped YAML tree into JSON, rejecting non-core tags.
fn yaml_to_json(value: serde_yaml::Value) -> Result<serde_json::Value, String> {
    use serde_json::Value as Json;
    use serde_yaml::Value as Yaml;

    Ok(match value {
        Yaml::Null => Json::Null,
        Yaml::Bool(b) => Json::Bool(b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Json::from(i)
            } else if let Some(u) = n.as_u64() {
                Json::from(u)
            } else {
                let f = n.as_f64().unwrap_or(f64::NAN);
                serde_json::Number::from_f64(f)
                    .map(Json::Number)
                    .ok_or_else(|| format!("non-finite number {} is not representable", n))?
            }
        }
        Yaml::String(s) => Json::String(s),
        Yaml::Sequence(items) => Json::Array(
            items
                .into_iter()
                .map(yaml_to_json)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Yaml::Mapping(map) => {
            let mut object = serde_json::Map::with_capacity(map.len());
            for (key, value) in map {
                let key = match key {
                    Yaml::String(s) => s,
                    Yaml::Bool(b) => b.to_string(),
                    Yaml::Number(n) => n.to_string(),
                    Yaml::Null => "null".to_string(),
                    _ => return Err("mapping keys must be scalars".to_string()),
                };
                object.insert(key, yaml_to_json(value)?);
            }
            Json::Object(object)
        }
        Yaml::Tagged(tagged) => {
            if is_core_tag(&tagged.tag) {
                yaml_to_json(tagged.value)?
            } else {
                return Err(format!("type tag {} is not allowed", tagged.tag));
            }
        }
    })
}
