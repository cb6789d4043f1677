//! Google Gemini `generateContent`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{
    decode, http_client, read_body, transport_failure, GenerationPayload, ProviderClient,
    ProviderKind,
};
use crate::config::ProviderConfig;
use crate::resilience::ProviderFailure;
use crate::vault::ApiKey;

pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    default_model: String,
}

impl GeminiClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderFailure> {
        Ok(Self {
            client: http_client()?,
            base_url: config.base_url().trim_end_matches('/').to_string(),
            default_model: config.model().to_string(),
        })
    }
}

#[async_trait]
impl ProviderClient for GeminiClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    async fn call(
        &self,
        payload: &GenerationPayload,
        key: &ApiKey,
    ) -> Result<String, ProviderFailure> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url,
            payload.model_or(&self.default_model)
        );
        let request = build_request(payload);

        // Key goes in a header so it never appears in a logged URL.
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", key.expose())
            .json(&request)
            .send()
            .await
            .map_err(transport_failure)?;

        let text = read_body(response).await?;
        let parsed: GeminiResponse = decode(&text)?;
        parse_response(parsed, &text)
    }
}

fn build_request(payload: &GenerationPayload) -> GeminiRequest<'_> {
    GeminiRequest {
        contents: vec![GeminiRequestContent {
            role: "user",
            parts: vec![GeminiRequestPart { text: &payload.prompt }],
        }],
        system_instruction: payload.system.as_deref().map(|system| GeminiSystemInstruction {
            parts: vec![GeminiRequestPart { text: system }],
        }),
        generation_config: GeminiGenerationConfig {
            max_output_tokens: payload.max_tokens,
            temperature: payload.temperature,
        },
    }
}

fn parse_response(response: GeminiResponse, raw: &str) -> Result<String, ProviderFailure> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ProviderFailure::Other(format!(
            "prompt blocked by safety filters (blockReason={})",
            reason
        )));
    }

    for candidate in response.candidates {
        match candidate.finish_reason.as_deref() {
            Some("SAFETY") | Some("PROHIBITED_CONTENT") | Some("BLOCKLIST") => {
                return Err(ProviderFailure::Other(
                    "response blocked by safety filters".to_string(),
                ));
            }
            Some("MAX_TOKENS") => tracing::warn!("Gemini response truncated at max_tokens"),
            _ => {}
        }

        if let Some(content) = candidate.content {
            let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
            if !text.trim().is_empty() {
                return Ok(text);
            }
        }
    }

    Err(ProviderFailure::EmptyResponse { body: raw.to_string() })
}

#[derive(Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiRequestContent<'a>>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystemInstruction<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiRequestContent<'a> {
    role: &'static str,
    parts: Vec<GeminiRequestPart<'a>>,
}

#[derive(Serialize)]
struct GeminiSystemInstruction<'a> {
    parts: Vec<GeminiRequestPart<'a>>,
}

#[derive(Serialize)]
struct GeminiRequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GeminiGenerationConfig {
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(rename = "promptFeedback", default)]
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct GeminiPromptFeedback {
    #[serde(rename = "blockReason", default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(rename = "finishReason", default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}
