//! Azure-OpenAI-style chat completions provider

use crate::provider::{ChatProvider, ChatRequest, LlmError, LlmResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// Connection settings for the deployment-scoped completions endpoint.
#[derive(Clone, Debug, Default)]
pub struct LlmSettings {
    pub endpoint: String,
    pub api_key: String,
    pub deployment: String,
    pub api_version: String,
}

impl LlmSettings {
    pub fn from_env() -> Self {
        Self {
            endpoint: std::env::var("AZURE_OPENAI_ENDPOINT").unwrap_or_default(),
            api_key: std::env::var("AZURE_OPENAI_API_KEY").unwrap_or_default(),
            deployment: std::env::var("AZURE_OPENAI_DEPLOYMENT")
                .unwrap_or_else(|_| "gpt-4o".to_string()),
            api_version: std::env::var("AZURE_OPENAI_API_VERSION")
                .unwrap_or_else(|_| "2024-02-15-preview".to_string()),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.endpoint.is_empty() && !self.api_key.is_empty()
    }
}

pub struct AzureOpenAiProvider {
    client: Client,
    settings: LlmSettings,
}

impl AzureOpenAiProvider {
    pub fn new(settings: LlmSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
        }
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.settings.endpoint.trim_end_matches('/'),
            self.settings.deployment,
            self.settings.api_version,
        )
    }
}

#[async_trait::async_trait]
impl ChatProvider for AzureOpenAiProvider {
    fn name(&self) -> &str {
        "azure-openai"
    }

    async fn complete(&self, request: ChatRequest) -> LlmResult<String> {
        let body = CompletionsRequest {
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: request.system,
                },
                ChatMessage {
                    role: "user",
                    content: request.user,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        debug!(deployment = %self.settings.deployment, "chat completion request");

        let response = self
            .client
            .post(self.completions_url())
            .header("api-key", &self.settings.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "completion error: {error_text}");
            return match status.as_u16() {
                401 | 403 => Err(LlmError::AuthFailed(error_text)),
                429 => Err(LlmError::RateLimited {
                    retry_after_ms: 60_000,
                }),
                _ => Err(LlmError::RequestFailed(format!("{status}: {error_text}"))),
            };
        }

        let parsed: CompletionsResponse = response.json().await?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::EmptyResponse("no choices in response".to_string()))?;

        match choice.message.content {
            Some(content) if !content.is_empty() => Ok(content),
            _ => Err(LlmError::EmptyResponse(format!(
                "finish_reason={}",
                choice.finish_reason.unwrap_or_else(|| "unknown".to_string())
            ))),
        }
    }
}

#[derive(Serialize)]
struct CompletionsRequest {
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct CompletionsResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_includes_deployment_and_version() {
        let provider = AzureOpenAiProvider::new(LlmSettings {
            endpoint: "https://example.openai.azure.com/".to_string(),
            api_key: "k".to_string(),
            deployment: "gpt-4o".to_string(),
            api_version: "2024-02-15-preview".to_string(),
        });
        assert_eq!(
            provider.completions_url(),
            "https://example.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-02-15-preview"
        );
    }

    #[test]
    fn configured_requires_endpoint_and_key() {
        assert!(!LlmSettings::default().is_configured());
        let settings = LlmSettings {
            endpoint: "https://e".to_string(),
            api_key: "k".to_string(),
            ..Default::default()
        };
        assert!(settings.is_configured());
    }
}
