//! OpenAI-compatible chat completions (OpenAI, DeepSeek, xAI).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{
    decode, http_client, read_body, transport_failure, GenerationPayload, ProviderClient,
    ProviderKind,
};
use crate::config::ProviderConfig;
use crate::resilience::ProviderFailure;
use crate::vault::ApiKey;

pub struct OpenAiCompatibleClient {
    kind: ProviderKind,
    client: reqwest::Client,
    url: String,
    default_model: String,
}

impl OpenAiCompatibleClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderFailure> {
        Ok(Self {
            kind: config.kind,
            client: http_client()?,
            url: format!("{}/chat/completions", config.base_url().trim_end_matches('/')),
            default_model: config.model().to_string(),
        })
    }
}

#[async_trait]
impl ProviderClient for OpenAiCompatibleClient {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn call(
        &self,
        payload: &GenerationPayload,
        key: &ApiKey,
    ) -> Result<String, ProviderFailure> {
        let body = build_request(payload, &self.default_model);

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(key.expose())
            .json(&body)
            .send()
            .await
            .map_err(transport_failure)?;

        let text = read_body(response).await?;
        let parsed: ChatCompletionResponse = decode(&text)?;
        extract_content(parsed, &text)
    }
}

fn build_request<'a>(
    payload: &'a GenerationPayload,
    default_model: &'a str,
) -> ChatCompletionRequest<'a> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = payload.system.as_deref() {
        messages.push(ChatMessageRequest {
            role: "system",
            content: system,
        });
    }
    messages.push(ChatMessageRequest {
        role: "user",
        content: &payload.prompt,
    });

    ChatCompletionRequest {
        model: payload.model_or(default_model),
        messages,
        max_tokens: payload.max_tokens,
        temperature: payload.temperature,
    }
}

fn extract_content(response: ChatCompletionResponse, raw: &str) -> Result<String, ProviderFailure> {
    for choice in response.choices {
        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(ProviderFailure::Other(
                "completion withheld by the provider's content_filter".to_string(),
            ));
        }
        if let Some(content) = choice.message.and_then(|m| m.content) {
            if !content.trim().is_empty() {
                return Ok(content);
            }
        }
    }
    Err(ProviderFailure::EmptyResponse { body: raw.to_string() })
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessageRequest<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ChatMessageRequest<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ChatMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::{ErrorClassifier, ErrorKind};

    fn parse(raw: &str) -> Result<String, ProviderFailure> {
        let parsed: ChatCompletionResponse = decode(raw)?;
        extract_content(parsed, raw)
    }

    #[test]
    fn test_request_shape() {
        let payload = GenerationPayload {
            prompt: "hi".to_string(),
            system: Some("be brief".to_string()),
            max_tokens: Some(64),
            ..GenerationPayload::default()
        };
        let json = serde_json::to_value(build_request(&payload, "deepseek-chat")).unwrap();
        assert_eq!(json["model"], "deepseek-chat");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["max_tokens"], 64);
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn test_extracts_first_non_empty_choice() {
        let raw = r#"{"choices":[{"message":{"content":"  "}},{"message":{"content":"Paris"},"finish_reason":"stop"}]}"#;
        assert_eq!(parse(raw).unwrap(), "Paris");
    }

    #[test]
    fn test_failure_shapes_classify() {
        let classifier = ErrorClassifier::default();

        let empty = parse(r#"{"choices":[]}"#).unwrap_err();
        assert_eq!(classifier.kind_of(&empty), ErrorKind::InvalidResponse);

        let garbage = parse("<html>bad gateway</html>").unwrap_err();
        assert_eq!(classifier.kind_of(&garbage), ErrorKind::ParseError);

        let filtered = parse(r#"{"choices":[{"message":{"content":null},"finish_reason":"content_filter"}]}"#).unwrap_err();
        assert_eq!(classifier.kind_of(&filtered), ErrorKind::ContentPolicy);
    }
}
