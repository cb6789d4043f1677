//! Anthropic Messages API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{
    decode, http_client, read_body, transport_failure, GenerationPayload, ProviderClient,
    ProviderKind,
};
use crate::config::ProviderConfig;
use crate::resilience::ProviderFailure;
use crate::vault::ApiKey;

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
    client: reqwest::Client,
    url: String,
    default_model: String,
    default_max_tokens: u32,
}

impl AnthropicClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderFailure> {
        Ok(Self {
            client: http_client()?,
            url: format!("{}/messages", config.base_url().trim_end_matches('/')),
            default_model: config.model().to_string(),
            default_max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl ProviderClient for AnthropicClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    async fn call(
        &self,
        payload: &GenerationPayload,
        key: &ApiKey,
    ) -> Result<String, ProviderFailure> {
        let body = MessagesRequest {
            model: payload.model_or(&self.default_model),
            // Required by the API.
            max_tokens: payload.max_tokens.unwrap_or(self.default_max_tokens),
            system: payload.system.as_deref(),
            messages: vec![Message {
                role: "user",
                content: &payload.prompt,
            }],
            temperature: payload.temperature,
        };

        let response = self
            .client
            .post(&self.url)
            .header("x-api-key", key.expose())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(transport_failure)?;

        let text = read_body(response).await?;
        let parsed: MessagesResponse = decode(&text)?;
        extract_text(parsed, &text)
    }
}

fn extract_text(response: MessagesResponse, raw: &str) -> Result<String, ProviderFailure> {
    let text: String = response
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text)
        .collect();

    if text.trim().is_empty() {
        if response.stop_reason.as_deref() == Some("refusal") {
            return Err(ProviderFailure::Other(
                "model refused the request under its safety policy".to_string(),
            ));
        }
        return Err(ProviderFailure::EmptyResponse { body: raw.to_string() });
    }
    Ok(text)
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}
