//! OpenAI implementation of the Generator trait.
//!
//! A reference implementation using chat completions with a JSON schema
//! response format.
//!
//! # Example
//!
//! ```rust,ignore
//! use disruption_engine::ai::OpenAiGenerator;
//!
//! let generator = OpenAiGenerator::new("sk-...").with_model("gpt-4o-mini");
//! let engine = ExtractionEngine::new(store, generator)?;
//! ```

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::security::credentials::{ApiKey, GeneratorCredentials};
use crate::traits::generator::{Generator, Prompt};

const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI-based generator.
#[derive(Clone)]
pub struct OpenAiGenerator {
    client: Client,
    api_key: ApiKey,
    model: String,
    base_url: String,
}

impl OpenAiGenerator {
    /// Create a new OpenAI client with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: ApiKey::new(api_key),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Create from resolved credentials.
    pub fn from_credentials(credentials: GeneratorCredentials) -> Self {
        Self {
            client: Client::new(),
            api_key: credentials.api_key,
            model: credentials.model,
            base_url: credentials
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    /// Set the chat model (default: gpt-4o).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set a custom base URL (for Azure, proxies, etc.).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Use a preconfigured HTTP client.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }
}

/// Map a non-success status to an engine error.
///
/// Rate limiting and server-side failures are transient; anything else
/// means the request itself is wrong and retrying will not help.
fn status_error(status: StatusCode, body: &str) -> EngineError {
    let detail = format!("OpenAI API error {}: {}", status, body.chars().take(300).collect::<String>());
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        EngineError::TransientUpstream(detail)
    } else {
        EngineError::Config(detail.into())
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        let request = StructuredRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: prompt.system.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.user.clone(),
                },
            ],
            temperature: 0.0,
            response_format: ResponseFormat {
                format_type: "json_schema".to_string(),
                json_schema: JsonSchemaFormat {
                    name: "disruption_events".to_string(),
                    strict: false,
                    schema: prompt.schema.clone(),
                },
            },
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key.expose()))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| EngineError::TransientUpstream(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(status_error(status, &error_text));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| EngineError::TransientUpstream(e.to_string()))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| EngineError::TransientUpstream("No response from OpenAI".into()))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct StructuredRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
    json_schema: JsonSchemaFormat,
}

#[derive(Serialize)]
struct JsonSchemaFormat {
    name: String,
    strict: bool,
    schema: serde_json::Value,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_and_server_errors_are_transient() {
        assert!(status_error(StatusCode::TOO_MANY_REQUESTS, "slow down").is_retryable());
        assert!(status_error(StatusCode::BAD_GATEWAY, "").is_retryable());
        assert!(!status_error(StatusCode::UNAUTHORIZED, "bad key").is_retryable());
    }

    #[test]
    fn test_credentials_carry_over() {
        let generator = OpenAiGenerator::from_credentials(
            GeneratorCredentials::new("sk-test", "gpt-4o-mini").with_base_url("http://localhost:8080/v1"),
        );
        assert_eq!(generator.model(), "gpt-4o-mini");
        assert_eq!(generator.base_url, "http://localhost:8080/v1");
    }
}
