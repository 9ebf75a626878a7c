//! Cohere Generate adapter. Used for CV analysis only.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{non_empty, send_json, AiProvider, CompletionProvider, CompletionRequest, LlmError};

pub const DEFAULT_BASE_URL: &str = "https://api.cohere.ai";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    generations: Vec<Generation>,
}

#[derive(Debug, Deserialize)]
struct Generation {
    text: String,
}

#[derive(Clone)]
pub struct CohereProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl CohereProvider {
    pub fn new(client: Client, api_key: String, base_url: Option<String>) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }
}

#[async_trait]
impl CompletionProvider for CohereProvider {
    fn provider(&self) -> AiProvider {
        AiProvider::Cohere
    }

    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, LlmError> {
        let body = GenerateRequest {
            model: request.model,
            prompt: request.prompt,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let http = self
            .client
            .post(format!("{}/v1/generate", self.base_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&body);

        let response: GenerateResponse = send_json(AiProvider::Cohere, http).await?;
        debug!(
            model = request.model,
            generations = response.generations.len(),
            "Cohere call succeeded"
        );

        let text = response.generations.into_iter().next().map(|g| g.text);
        non_empty(AiProvider::Cohere, text)
    }
}
