//! Anthropic Messages API adapter.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{non_empty, send_json, AiProvider, CompletionProvider, CompletionRequest, LlmError};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: [Message<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

impl MessagesResponse {
    /// Extracts the text content from the first text block.
    fn into_text(self) -> Option<String> {
        self.content
            .into_iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text)
    }
}

#[derive(Clone)]
pub struct ClaudeProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl ClaudeProvider {
    pub fn new(client: Client, api_key: String, base_url: Option<String>) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }
}

#[async_trait]
impl CompletionProvider for ClaudeProvider {
    fn provider(&self) -> AiProvider {
        AiProvider::Claude
    }

    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, LlmError> {
        let body = MessagesRequest {
            model: request.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            messages: [Message {
                role: "user",
                content: request.prompt,
            }],
        };

        let http = self
            .client
            .post(format!("{}/v1/messages", self.base_url.trim_end_matches('/')))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);

        let response: MessagesResponse = send_json(AiProvider::Claude, http).await?;

        if let Some(usage) = &response.usage {
            debug!(
                model = request.model,
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                "Claude call succeeded"
            );
        }

        non_empty(AiProvider::Claude, response.into_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;
    use std::time::Duration;

    fn request<'a>(prompt: &'a str) -> CompletionRequest<'a> {
        CompletionRequest {
            model: "claude-3-5-sonnet-20241022",
            prompt,
            max_tokens: 2000,
            temperature: 0.3,
        }
    }

    fn provider(url: String) -> ClaudeProvider {
        let client = crate::llm_client::build_http_client(Duration::from_secs(5)).unwrap();
        ClaudeProvider::new(client, "test-key".to_string(), Some(url))
    }

    #[tokio::test]
    async fn test_returns_first_text_block() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "test-key")
            .match_header("anthropic-version", ANTHROPIC_VERSION)
            .match_body(Matcher::PartialJson(json!({
                "model": "claude-3-5-sonnet-20241022",
                "max_tokens": 2000,
                "messages": [{"role": "user", "content": "Analyse this"}]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "id": "msg_01",
                    "content": [
                        {"type": "thinking", "thinking": "..."},
                        {"type": "text", "text": "{\"overallScore\": 80}"}
                    ],
                    "usage": {"input_tokens": 12, "output_tokens": 7}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let text = provider(server.url())
            .complete(&request("Analyse this"))
            .await
            .unwrap();

        assert_eq!(text, "{\"overallScore\": 80}");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_api_error_is_call_failed() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/v1/messages")
            .with_status(401)
            .with_body(r#"{"type":"error","error":{"type":"authentication_error","message":"invalid x-api-key"}}"#)
            .create_async()
            .await;

        let err = provider(server.url())
            .complete(&request("hi"))
            .await
            .unwrap_err();

        match err {
            LlmError::ProviderCallFailed {
                provider,
                status,
                message,
            } => {
                assert_eq!(provider, AiProvider::Claude);
                assert_eq!(status, Some(401));
                assert_eq!(message, "invalid x-api-key");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_text_block_is_malformed() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/v1/messages")
            .with_status(200)
            .with_body(r#"{"content": [], "usage": {"input_tokens": 1, "output_tokens": 0}}"#)
            .create_async()
            .await;

        let err = provider(server.url())
            .complete(&request("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::ProviderResponseMalformed { .. }));
    }
}
