use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

use crate::config::ProviderConfig;
use crate::llm::{AiBackend, LlmError};

const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// OpenAI-style chat completions backend.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct PromptRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct PromptResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl OpenAiProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, LlmError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            LlmError::ConfigError("API key is required for the OpenAI provider".to_string())
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            api_url: config
                .api_url
                .clone()
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            api_key,
            model: if config.model.trim().is_empty() {
                DEFAULT_MODEL.to_string()
            } else {
                config.model.clone()
            },
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl AiBackend for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError> {
        let request = PromptRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system_prompt.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: user_prompt.to_string(),
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        debug!("Sending request to OpenAI with model: {}", self.model);

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("OpenAI API responded with status code: {} - {}", status, body);
            return Err(LlmError::ResponseError(format!(
                "API responded with status code: {}",
                status
            )));
        }

        let prompt_response: PromptResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ResponseError(e.to_string()))?;

        prompt_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::ResponseError("No choices in response".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::providers::testing::{serve_once, ServedRequest};
    use axum::http::StatusCode;
    use serde_json::json;

    fn config(api_url: String) -> ProviderConfig {
        ProviderConfig {
            api_key: Some("sk-test".to_string()),
            api_url: Some(api_url),
            model: "gpt-test".to_string(),
            ..ProviderConfig::default()
        }
    }

    #[tokio::test]
    async fn test_sends_chat_request_and_reads_first_choice() {
        let (url, served) = serve_once(
            StatusCode::OK,
            json!({"choices": [{"message": {"role": "assistant", "content": "{\"sql\": \"SELECT 1\"}"}}]}),
        )
        .await;

        let provider = OpenAiProvider::new(&config(url)).unwrap();
        let text = provider.complete("system text", "user text").await.unwrap();
        assert_eq!(text, "{\"sql\": \"SELECT 1\"}");

        let ServedRequest { headers, body } = served.await.unwrap();
        assert_eq!(headers.get("authorization").unwrap(), "Bearer sk-test");
        assert_eq!(body["model"], "gpt-test");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "system text");
        assert_eq!(body["messages"][1]["content"], "user text");
        assert_eq!(body["max_tokens"], 1024);
    }

    #[tokio::test]
    async fn test_error_status_is_response_error() {
        let (url, _served) = serve_once(
            StatusCode::UNAUTHORIZED,
            json!({"error": {"message": "bad key"}}),
        )
        .await;

        let provider = OpenAiProvider::new(&config(url)).unwrap();
        let err = provider.complete("s", "u").await.unwrap_err();
        assert!(matches!(err, LlmError::ResponseError(_)));
    }

    #[tokio::test]
    async fn test_empty_choices_is_response_error() {
        let (url, _served) = serve_once(StatusCode::OK, json!({"choices": []})).await;
        let provider = OpenAiProvider::new(&config(url)).unwrap();
        assert!(provider.complete("s", "u").await.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_connection_error() {
        let provider = OpenAiProvider::new(&config("http://127.0.0.1:9/v1/chat".to_string())).unwrap();
        let err = provider.complete("s", "u").await.unwrap_err();
        assert!(matches!(err, LlmError::ConnectionError(_)));
    }

    #[tokio::test]
    async fn test_blank_model_falls_back_to_default() {
        let (url, served) = serve_once(
            StatusCode::OK,
            json!({"choices": [{"message": {"content": "{}"}}]}),
        )
        .await;

        let mut cfg = config(url);
        cfg.model = String::new();
        OpenAiProvider::new(&cfg).unwrap().complete("s", "u").await.unwrap();
        assert_eq!(served.await.unwrap().body["model"], DEFAULT_MODEL);
    }

    #[test]
    fn test_requires_api_key() {
        let mut cfg = config("http://localhost".to_string());
        cfg.api_key = None;
        assert!(matches!(
            OpenAiProvider::new(&cfg),
            Err(LlmError::ConfigError(_))
        ));
    }
}
