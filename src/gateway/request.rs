//! Inbound request and response envelopes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::providers::{GenerationPayload, ProviderKind};
use crate::recovery::StructuredFormat;
use crate::resilience::ClassifiedError;

/// Shape the caller wants the answer in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpectedFormat {
    #[default]
    Text,
    Json,
    Yaml,
}

impl ExpectedFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpectedFormat::Text => "text",
            ExpectedFormat::Json => "json",
            ExpectedFormat::Yaml => "yaml",
        }
    }

    /// `None` for plain text, which skips recovery.
    pub fn structured(&self) -> Option<StructuredFormat> {
        match self {
            ExpectedFormat::Text => None,
            ExpectedFormat::Json => Some(StructuredFormat::Json),
            ExpectedFormat::Yaml => Some(StructuredFormat::Yaml),
        }
    }
}

impl fmt::Display for ExpectedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRequest {
    pub provider: ProviderKind,
    pub payload: GenerationPayload,
    #[serde(default)]
    pub expected_format: ExpectedFormat,
    pub credential_owner_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Terminal outcome of one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayResponse {
    pub status: ResponseStatus,
    /// Recovered value for json/yaml, the raw text for text; null on error.
    pub content: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ClassifiedError>,
    #[serde(default)]
    pub cached: bool,
}

impl GatewayResponse {
    pub fn success(content: serde_json::Value, raw_content: String, cached: bool) -> Self {
        Self {
            status: ResponseStatus::Success,
            content,
            raw_content: Some(raw_content),
            error: None,
            cached,
        }
    }

    pub fn failure(error: ClassifiedError) -> Self {
        Self {
            status: ResponseStatus::Error,
            content: serde_json::Value::Null,
            raw_content: None,
            error: Some(error),
            cached: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::ErrorKind;

    #[test]
    fn test_request_wire_format() {
        let request: GatewayRequest = serde_json::from_str(
            r#"{
                "provider": "anthropic",
                "payload": {"prompt": "Outline chapter one"},
                "expectedFormat": "yaml",
                "credentialOwnerId": "user-42"
            }"#,
        )
        .unwrap();

        assert_eq!(request.provider, ProviderKind::Anthropic);
        assert_eq!(request.expected_format, ExpectedFormat::Yaml);
        assert_eq!(request.credential_owner_id, "user-42");

        let defaulted: GatewayRequest = serde_json::from_str(
            r#"{"provider":"openai","payload":{"prompt":"x"},"credentialOwnerId":"u"}"#,
        )
        .unwrap();
        assert_eq!(defaulted.expected_format, ExpectedFormat::Text);
    }

    #[test]
    fn test_response_wire_format() {
        let ok = GatewayResponse::success(serde_json::json!({"a": 1}), "{\"a\":1}".to_string(), true);
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["rawContent"], "{\"a\":1}");
        assert_eq!(json["cached"], true);
        assert!(json.get("error").is_none());

        let err = GatewayResponse::failure(
            ClassifiedError::new(ErrorKind::RateLimit, "slow down", Some(429), None, None).with_retry_count(3),
        );
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"]["kind"], "RateLimit");
        assert_eq!(json["error"]["statusCode"], 429);
        assert_eq!(json["error"]["retryCount"], 3);
        assert!(json["content"].is_null());
    }
}
