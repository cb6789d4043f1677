use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

pub type SdkError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
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

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub provider: String, // "openai", "deepseek", "xai", "anthropic" or "gemini"
    pub payload: GenerationPayload,
    pub expected_format: String, // "text", "json" or "yaml"
    pub credential_owner_id: String,
}

impl GenerateRequest {
    pub fn text(provider: &str, owner: &str, prompt: &str) -> Self {
        Self {
            provider: provider.to_string(),
            payload: GenerationPayload {
                prompt: prompt.to_string(),
                ..Default::default()
            },
            expected_format: "text".to_string(),
            credential_owner_id: owner.to_string(),
        }
    }

    pub fn with_format(mut self, format: &str) -> Self {
        self.expected_format = format.to_string();
        self
    }
}

/// Response envelope. Error responses deserialize into this too.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub status: String,
    #[serde(default)]
    pub content: serde_json::Value,
    #[serde(default)]
    pub raw_content: Option<String>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
    #[serde(default)]
    pub cached: bool,
}

impl GenerateResponse {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }

    /// The classified error kind, e.g. `"RateLimit"`.
    pub fn error_kind(&self) -> Option<&str> {
        self.error.as_ref()?.get("kind")?.as_str()
    }
}

pub struct GatewayClient {
    client: Client,
    gateway_url: String,
    admin_key: Option<String>,
}

impl GatewayClient {
    pub fn new(gateway_url: &str) -> Self {
        Self::with_client(Client::new(), gateway_url)
    }

    pub fn with_client(client: Client, gateway_url: &str) -> Self {
        Self {
            client,
            gateway_url: gateway_url.trim_end_matches('/').to_string(),
            admin_key: None,
        }
    }

    pub fn with_admin_key(mut self, key: &str) -> Self {
        self.admin_key = Some(key.to_string());
        self
    }

    /// Send a generation request. Returns the HTTP status with the envelope.
    pub async fn generate(
        &self,
        req: &GenerateRequest,
    ) -> Result<(StatusCode, GenerateResponse), SdkError> {
        let resp = self
            .client
            .post(format!("{}/v1/generate", self.gateway_url))
            .json(req)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        match serde_json::from_str::<GenerateResponse>(&text) {
            Ok(body) => Ok((status, body)),
            Err(_) => Err(format!("Gateway returned status {}: {}", status, text).into()),
        }
    }

    pub async fn health(&self) -> Result<bool, reqwest::Error> {
        let resp = self
            .client
            .get(format!("{}/health", self.gateway_url))
            .send()
            .await?;
        Ok(resp.status().is_success())
    }

    pub async fn status(&self) -> Result<serde_json::Value, SdkError> {
        let resp = self
            .admin(self.client.get(format!("{}/admin/status", self.gateway_url)))
            .send()
            .await?;
        Self::json_or_error(resp).await
    }

    /// Store a provider key for `owner`. Returns the HTTP status.
    pub async fn put_credential(
        &self,
        owner: &str,
        provider: &str,
        api_key: &str,
    ) -> Result<StatusCode, reqwest::Error> {
        let resp = self
            .admin(
                self.client
                    .put(format!("{}/admin/credentials/{}/{}", self.gateway_url, owner, provider)),
            )
            .json(&serde_json::json!({ "apiKey": api_key }))
            .send()
            .await?;
        Ok(resp.status())
    }

    pub async fn delete_credential(
        &self,
        owner: &str,
        provider: &str,
    ) -> Result<StatusCode, reqwest::Error> {
        let url = format!("{}/admin/credentials/{}/{}", self.gateway_url, owner, provider);
        let resp = self.admin(self.client.delete(url)).send().await?;
        Ok(resp.status())
    }

    fn admin(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.admin_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn json_or_error(resp: reqwest::Response) -> Result<serde_json::Value, SdkError> {
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(format!("Gateway returned error status {}: {}", status, text).into());
        }
        Ok(serde_json::from_str(&text)?)
    }
}
