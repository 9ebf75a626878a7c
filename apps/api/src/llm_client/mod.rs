//! LLM Client: the single point of entry for all AI provider calls in ApplyAce.
//!
//! ARCHITECTURAL RULE: No other module may call a provider API directly.
//! Every provider is reached through a `CompletionProvider` implementation
//! from this module, and the router picks one per subscription tier.

use std::fmt;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

pub mod claude;
pub mod cohere;
pub mod openai;
pub mod prompts;

pub use claude::ClaudeProvider;
pub use cohere::CohereProvider;
pub use openai::OpenAiProvider;

/// The external AI completion services a tier can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    OpenAi,
    Claude,
    Cohere,
}

impl AiProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            AiProvider::OpenAi => "openai",
            AiProvider::Claude => "claude",
            AiProvider::Cohere => "cohere",
        }
    }
}

impl fmt::Display for AiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("{provider} call failed{}: {message}", status_suffix(.status))]
    ProviderCallFailed {
        provider: AiProvider,
        status: Option<u16>,
        message: String,
    },

    #[error("{provider} returned a malformed response: {message}")]
    ProviderResponseMalformed {
        provider: AiProvider,
        message: String,
    },

    #[error("{provider} does not support {operation}")]
    UnsupportedProviderForOperation {
        provider: AiProvider,
        operation: &'static str,
    },

    #[error("no adapter registered for {0}")]
    ProviderNotRegistered(AiProvider),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

impl LlmError {
    pub fn provider(&self) -> AiProvider {
        match self {
            LlmError::ProviderCallFailed { provider, .. }
            | LlmError::ProviderResponseMalformed { provider, .. }
            | LlmError::UnsupportedProviderForOperation { provider, .. }
            | LlmError::ProviderNotRegistered(provider) => *provider,
        }
    }
}

/// One single-message completion call.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// The capability every provider adapter exposes: prompt in, generated text out.
/// Adapters differ only in endpoint, auth header and response envelope.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn provider(&self) -> AiProvider;

    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, LlmError>;
}

/// Builds the HTTP client shared by all adapters. Requests exceeding `timeout`
/// surface as `ProviderCallFailed`.
pub fn build_http_client(timeout: Duration) -> anyhow::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}

/// Sends a prepared request and decodes the provider's JSON envelope.
/// Non-2xx responses and transport failures map to `ProviderCallFailed`;
/// an undecodable 2xx body maps to `ProviderResponseMalformed`.
pub(crate) async fn send_json<T: DeserializeOwned>(
    provider: AiProvider,
    request: RequestBuilder,
) -> Result<T, LlmError> {
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(provider, e, None))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(provider, e, Some(status.as_u16())))?;

    if !status.is_success() {
        error!(%provider, %status, "Provider returned an error");
        return Err(LlmError::ProviderCallFailed {
            provider,
            status: Some(status.as_u16()),
            message: extract_error_message(&body),
        });
    }

    serde_json::from_str(&body).map_err(|e| LlmError::ProviderResponseMalformed {
        provider,
        message: format!("unexpected response envelope: {e}"),
    })
}

/// A timeout, whether waiting for headers or for the body, carries no status.
fn transport_error(provider: AiProvider, e: reqwest::Error, status: Option<u16>) -> LlmError {
    error!(%provider, error = %e, "Provider request failed");
    if e.is_timeout() {
        return LlmError::ProviderCallFailed {
            provider,
            status: None,
            message: "request timed out".to_string(),
        };
    }
    LlmError::ProviderCallFailed {
        provider,
        status: e.status().map(|s| s.as_u16()).or(status),
        message: e.to_string(),
    }
}

/// Pulls a human-readable message out of a provider error body.
/// OpenAI and Anthropic nest it under `error.message`, Cohere uses a top-level `message`.
fn extract_error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct Nested {
        error: Flat,
    }

    #[derive(Deserialize)]
    struct Flat {
        message: String,
    }

    serde_json::from_str::<Nested>(body)
        .map(|n| n.error.message)
        .or_else(|_| serde_json::from_str::<Flat>(body).map(|f| f.message))
        .unwrap_or_else(|_| body.to_string())
}

/// Decodes model output that was instructed to be JSON.
pub fn parse_json_output<T: DeserializeOwned>(
    provider: AiProvider,
    text: &str,
) -> Result<T, LlmError> {
    let text = strip_json_fences(text);
    debug!(%provider, len = text.len(), "Parsing JSON completion");

    serde_json::from_str(text).map_err(|e| LlmError::ProviderResponseMalformed {
        provider,
        message: format!("completion is not valid analysis JSON: {e}"),
    })
}

/// Unwraps a fenced code block (```json or bare ```) from model output.
/// Prose before the opening fence or after the closing one is dropped.
/// Unfenced text, including a bare JSON value, is returned trimmed.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if text.starts_with('{') || text.starts_with('[') {
        return text;
    }
    let Some(open) = text.find("```") else {
        return text;
    };
    let fenced = &text[open + 3..];
    let fenced = fenced.strip_prefix("json").unwrap_or(fenced);
    match fenced.find("```") {
        Some(close) => fenced[..close].trim(),
        None => fenced.trim(),
    }
}

/// Rejects empty completions so callers never treat "" as a valid answer.
pub(crate) fn non_empty(provider: AiProvider, text: Option<String>) -> Result<String, LlmError> {
    match text {
        Some(t) if !t.trim().is_empty() => Ok(t),
        _ => Err(LlmError::ProviderResponseMalformed {
            provider,
            message: "completion contained no text".to_string(),
        }),
    }
}
