//! Upstream LLM providers.
//!
//! # Data Flow
//! ```text
//! Gateway (after cache miss, with a decrypted ApiKey)
//!     → ProviderRegistry::get(kind)
//!     → ProviderClient::call(payload, key)
//!         → openai.rs    (OpenAI, DeepSeek, xAI: chat completions)
//!         → anthropic.rs (Messages API)
//!         → gemini.rs    (generateContent)
//!     → raw text, or a ProviderFailure for the classifier
//! ```
//!
//! # Design Decisions
//! - Adapters are stateless apart from their HTTP client; keys arrive per call
//! - Adapters never retry; the retry coordinator owns that
//! - The registry is built once at startup and is read-only afterwards

pub mod anthropic;
pub mod gemini;
pub mod openai;

use std::collections::HashMap;
use std::error::Error as _;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{GatewayConfig, ProviderConfig};
use crate::resilience::ProviderFailure;
use crate::vault::ApiKey;

pub use anthropic::AnthropicClient;
pub use gemini::GeminiClient;
pub use openai::OpenAiCompatibleClient;

/// Supported providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    DeepSeek,
    Xai,
    Anthropic,
    Gemini,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 5] = [
        ProviderKind::OpenAi,
        ProviderKind::DeepSeek,
        ProviderKind::Xai,
        ProviderKind::Anthropic,
        ProviderKind::Gemini,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::DeepSeek => "deepseek",
            ProviderKind::Xai => "xai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Gemini => "gemini",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "https://api.openai.com/v1",
            ProviderKind::DeepSeek => "https://api.deepseek.com/v1",
            ProviderKind::Xai => "https://api.x.ai/v1",
            ProviderKind::Anthropic => "https://api.anthropic.com/v1",
            ProviderKind::Gemini => "https://generativelanguage.googleapis.com/v1beta",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-4o-mini",
            ProviderKind::DeepSeek => "deepseek-chat",
            ProviderKind::Xai => "grok-2-latest",
            ProviderKind::Anthropic => "claude-3-5-sonnet-latest",
            ProviderKind::Gemini => "gemini-1.5-flash",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ProviderKind::ALL
            .into_iter()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| format!("unknown provider '{}'", s))
    }
}

/// Provider-neutral generation request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationPayload {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl GenerationPayload {
    /// Trim text and fill the model and token limit from `defaults`, so that
    /// equivalent requests fingerprint identically.
    pub fn normalized(&self, defaults: &ProviderConfig) -> Self {
        let system = self
            .system
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let model = self
            .model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(defaults.model())
            .to_string();

        Self {
            prompt: self.prompt.trim().to_string(),
            system,
            model: Some(model),
            max_tokens: Some(self.max_tokens.unwrap_or(defaults.max_tokens)),
            temperature: self.temperature,
        }
    }

    pub(crate) fn model_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.model.as_deref().unwrap_or(fallback)
    }
}

/// One uniform call capability per provider.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Send `payload` and return the generated text.
    async fn call(
        &self,
        payload: &GenerationPayload,
        key: &ApiKey,
    ) -> Result<String, ProviderFailure>;
}

/// Provider kind → client, built once.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    clients: HashMap<ProviderKind, Arc<dyn ProviderClient>>,
    settings: HashMap<ProviderKind, ProviderConfig>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One HTTP adapter per configured provider.
    ///
    /// Call deadlines are not baked into the adapters; the gateway applies the
    /// current (reloadable) per-provider timeout around every call.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ProviderFailure> {
        let mut registry = Self::new();

        for provider in &config.providers {
            let client: Arc<dyn ProviderClient> = match provider.kind {
                ProviderKind::OpenAi | ProviderKind::DeepSeek | ProviderKind::Xai => {
                    Arc::new(OpenAiCompatibleClient::new(provider)?)
                }
                ProviderKind::Anthropic => Arc::new(AnthropicClient::new(provider)?),
                ProviderKind::Gemini => Arc::new(GeminiClient::new(provider)?),
            };
            tracing::info!(
                provider = %provider.kind,
                base_url = %provider.base_url(),
                model = %provider.model(),
                "Provider registered"
            );
            registry = registry.with_client(provider.clone(), client);
        }

        Ok(registry)
    }

    pub fn with_client(
        mut self,
        settings: ProviderConfig,
        client: Arc<dyn ProviderClient>,
    ) -> Self {
        self.clients.insert(settings.kind, client);
        self.settings.insert(settings.kind, settings);
        self
    }

    pub fn get(&self, kind: ProviderKind) -> Option<&Arc<dyn ProviderClient>> {
        self.clients.get(&kind)
    }

    pub fn settings(&self, kind: ProviderKind) -> Option<&ProviderConfig> {
        self.settings.get(&kind)
    }

    pub fn kinds(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<_> = self.clients.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }
}

/// Upper bound on establishing a connection to a provider.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared client settings. No overall request timeout: `with_timeout` owns that.
pub(crate) fn http_client() -> Result<reqwest::Client, ProviderFailure> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| ProviderFailure::Other(format!("failed to build HTTP client: {}", e)))
}

/// Map a reqwest error onto the failure shape the classifier reads.
pub(crate) fn transport_failure(err: reqwest::Error) -> ProviderFailure {
    if err.is_timeout() {
        return ProviderFailure::Timeout {
            message: err.to_string(),
        };
    }

    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            return ProviderFailure::Transport {
                code: Some(io.kind()),
                message: format!("{}: {}", err, io),
            };
        }
        source = cause.source();
    }

    ProviderFailure::Transport {
        code: None,
        message: chain_message(&err),
    }
}

fn chain_message(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Read a response body, turning non-2xx into `ProviderFailure::Status`.
pub(crate) async fn read_body(response: reqwest::Response) -> Result<String, ProviderFailure> {
    let status = response.status();
    let body = response.text().await.map_err(transport_failure)?;
    if !status.is_success() {
        return Err(ProviderFailure::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}

/// Decode a 2xx envelope.
pub(crate) fn decode<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, ProviderFailure> {
    serde_json::from_str(body).map_err(|e| ProviderFailure::Decode {
        message: e.to_string(),
        body: body.to_string(),
    })
}
