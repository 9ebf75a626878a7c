//! Per-call cost estimates.
//!
//! Token counts are approximated as `chars / 4`. This is a heuristic for
//! dashboards and soft accounting, not a billing-grade tokenizer.

use crate::llm_client::AiProvider;

const CHARS_PER_TOKEN: f64 = 4.0;

/// USD per token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TokenRates {
    /// Separate input and output prices.
    Split { input: f64, output: f64 },
    /// One price applied to prompt and response combined.
    Flat(f64),
}

pub fn rates(provider: AiProvider) -> TokenRates {
    match provider {
        AiProvider::OpenAi => TokenRates::Split {
            input: 0.000_000_15,
            output: 0.000_000_6,
        },
        AiProvider::Claude => TokenRates::Split {
            input: 0.000_000_25,
            output: 0.000_001_25,
        },
        AiProvider::Cohere => TokenRates::Flat(0.000_000_15),
    }
}

pub fn estimate_tokens(text: &str) -> f64 {
    text.chars().count() as f64 / CHARS_PER_TOKEN
}

/// Estimated USD cost of one call. Always non-negative.
pub fn estimate_cost(provider: AiProvider, prompt: &str, response: &str) -> f64 {
    let prompt_tokens = estimate_tokens(prompt);
    let response_tokens = estimate_tokens(response);
    match rates(provider) {
        TokenRates::Split { input, output } => prompt_tokens * input + response_tokens * output,
        TokenRates::Flat(rate) => (prompt_tokens + response_tokens) * rate,
    }
}
