//! Request fingerprints.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::gateway::ExpectedFormat;
use crate::providers::{GenerationPayload, ProviderKind};

/// Lowercase hex SHA-256 of a normalized request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// `payload` must already be normalized; equal inputs always give equal keys.
    pub fn compute(
        provider: ProviderKind,
        format: ExpectedFormat,
        payload: &GenerationPayload,
    ) -> Self {
        // serde_json::Value keeps object keys sorted, which makes this canonical.
        let canonical = serde_json::to_value(payload)
            .map(|value| value.to_string())
            .unwrap_or_default();

        let mut hasher = Sha256::new();
        hasher.update(provider.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(format.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(canonical.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
