//! Chat-completions client for AI-assisted CRN lookup.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use kybcheck_shared::{KybError, Result};

/// Chat completion endpoint path, relative to the configured base URL.
const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

/// Client for an OpenAI-compatible chat-completions API.
#[derive(Debug, Clone)]
pub struct AiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl AiClient {
    pub fn new(base_url: &str, api_key: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KybError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    /// Send a single-turn prompt and return the assistant's text reply.
    #[instrument(skip_all)]
    pub async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let url = format!("{}{CHAT_COMPLETIONS_PATH}", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| KybError::Ai(format!("chat completion request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(KybError::Ai(format!("chat completion: HTTP {status}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| KybError::Ai(format!("chat completion: invalid JSON: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(KybError::Ai("chat completion returned no content".into()));
        }

        debug!(chars = content.len(), "AI reply received");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn returns_first_choice_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [
                    {"message": {"role": "assistant", "content": "CRN: 12345678"}}
                ]
            })))
            .mount(&server)
            .await;

        let client = AiClient::new(&server.uri(), "key", "test-model", TIMEOUT).unwrap();
        let reply = client.complete("system", "user").await.unwrap();
        assert_eq!(reply, "CRN: 12345678");
    }

    #[tokio::test]
    async fn empty_content_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "  "}}]
            })))
            .mount(&server)
            .await;

        let client = AiClient::new(&server.uri(), "key", "test-model", TIMEOUT).unwrap();
        let err = client.complete("system", "user").await.unwrap_err();
        assert!(matches!(err, KybError::Ai(_)));
    }

    #[tokio::test]
    async fn http_error_maps_to_ai_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = AiClient::new(&server.uri(), "key", "test-model", TIMEOUT).unwrap();
        let err = client.complete("system", "user").await.unwrap_err();
        assert!(matches!(err, KybError::Ai(_)));
    }
}
