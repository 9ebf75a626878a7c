//! Resolves a tier to its AI backend and model, builds the prompt,
//! dispatches to the matching adapter and prices the call.
//!
//! The router does not touch the usage ledger. Callers reserve quota before
//! calling and settle afterwards (see `handlers::run_metered`).

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::analysis::cost::estimate_cost;
use crate::analysis::prompts::{
    COVER_LETTER_PROMPT_TEMPLATE, CV_ANALYSIS_PROMPT_TEMPLATE, INDUSTRY_MATCH_FIELD,
    JOB_SECTION_TEMPLATE,
};
use crate::analysis::{AnalysisResult, CoverLetterResult, CvAnalysis};
use crate::llm_client::prompts::{FACTUAL_INSTRUCTION, JSON_ONLY_INSTRUCTION};
use crate::llm_client::{
    parse_json_output, AiProvider, CompletionProvider, CompletionRequest, LlmError,
};
use crate::tiers::{get_tier_config, TierDefinition};

const ANALYSIS_TEMPERATURE: f32 = 0.3;
const ANALYSIS_MAX_TOKENS: u32 = 2000;
const COVER_LETTER_TEMPERATURE: f32 = 0.7;
const COVER_LETTER_MAX_TOKENS: u32 = 1000;

const COVER_LETTER_OPERATION: &str = "cover letter generation";

#[derive(Clone, Default)]
pub struct ProviderRouter {
    adapters: HashMap<AiProvider, Arc<dyn CompletionProvider>>,
}

impl ProviderRouter {
    /// Registers each adapter under the provider it reports. A later adapter for
    /// the same provider replaces an earlier one.
    pub fn new(adapters: impl IntoIterator<Item = Arc<dyn CompletionProvider>>) -> Self {
        Self {
            adapters: adapters
                .into_iter()
                .map(|adapter| (adapter.provider(), adapter))
                .collect(),
        }
    }

    fn adapter(&self, provider: AiProvider) -> Result<&dyn CompletionProvider, LlmError> {
        self.adapters
            .get(&provider)
            .map(|a| a.as_ref())
            .ok_or(LlmError::ProviderNotRegistered(provider))
    }

    /// Scores a CV with the tier's AI provider. Including a job description
    /// adds an industry-match score to the requested schema.
    pub async fn analyze_cv(
        &self,
        cv_text: &str,
        tier: &str,
        job_description: Option<&str>,
    ) -> Result<AnalysisResult, LlmError> {
        let config = get_tier_config(tier);
        let adapter = self.adapter(config.ai_provider)?;
        let prompt = build_analysis_prompt(cv_text, job_description);

        let text = complete(
            adapter,
            config,
            &prompt,
            ANALYSIS_MAX_TOKENS,
            ANALYSIS_TEMPERATURE,
        )
        .await?;
        let analysis: CvAnalysis = parse_json_output(config.ai_provider, &text)?;
        let cost = estimate_cost(config.ai_provider, &prompt, &text);

        info!(
            tier = %config.tier,
            provider = %config.ai_provider,
            overall_score = %analysis.overall_score,
            cost,
            "CV analysed"
        );

        Ok(AnalysisResult {
            analysis,
            provider: config.ai_provider,
            cost,
        })
    }

    /// Writes a 250–350 word cover letter. Not available on Cohere-routed tiers.
    pub async fn generate_cover_letter(
        &self,
        cv_text: &str,
        job_description: &str,
        tier: &str,
    ) -> Result<CoverLetterResult, LlmError> {
        let config = get_tier_config(tier);
        if !supports_cover_letters(config.ai_provider) {
            warn!(tier = %config.tier, provider = %config.ai_provider, "Cover letters unsupported");
            return Err(LlmError::UnsupportedProviderForOperation {
                provider: config.ai_provider,
                operation: COVER_LETTER_OPERATION,
            });
        }
        let adapter = self.adapter(config.ai_provider)?;

        let prompt = COVER_LETTER_PROMPT_TEMPLATE
            .replace("{factual_instruction}", FACTUAL_INSTRUCTION)
            .replace("{job_description}", job_description)
            .replace("{cv_text}", cv_text);

        let text = complete(
            adapter,
            config,
            &prompt,
            COVER_LETTER_MAX_TOKENS,
            COVER_LETTER_TEMPERATURE,
        )
        .await?;
        let cover_letter = text.trim().to_string();
        let cost = estimate_cost(config.ai_provider, &prompt, &cover_letter);

        info!(
            tier = %config.tier,
            provider = %config.ai_provider,
            words = cover_letter.split_whitespace().count(),
            cost,
            "Cover letter generated"
        );

        Ok(CoverLetterResult {
            cover_letter,
            provider: config.ai_provider,
            cost,
        })
    }
}

fn supports_cover_letters(provider: AiProvider) -> bool {
    matches!(provider, AiProvider::OpenAi | AiProvider::Claude)
}

async fn complete(
    adapter: &dyn CompletionProvider,
    config: &TierDefinition,
    prompt: &str,
    max_tokens: u32,
    temperature: f32,
) -> Result<String, LlmError> {
    debug!(
        provider = %config.ai_provider,
        model = config.ai_model,
        prompt_chars = prompt.len(),
        "Dispatching completion"
    );
    adapter
        .complete(&CompletionRequest {
            model: config.ai_model,
            prompt,
            max_tokens,
            temperature,
        })
        .await
}

fn build_analysis_prompt(cv_text: &str, job_description: Option<&str>) -> String {
    let (job_section, industry_field) = match job_description {
        Some(jd) => (
            JOB_SECTION_TEMPLATE.replace("{job_description}", jd),
            INDUSTRY_MATCH_FIELD,
        ),
        None => (String::new(), ""),
    };

    CV_ANALYSIS_PROMPT_TEMPLATE
        .replace("{factual_instruction}", FACTUAL_INSTRUCTION)
        .replace("{json_only}", JSON_ONLY_INSTRUCTION)
        .replace("{industry_field}", industry_field)
        .replace("{job_section}", &job_section)
        .replace("{cv_text}", cv_text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    enum Reply {
        Text(String),
        Status(u16),
    }

    struct FakeProvider {
        provider: AiProvider,
        reply: Reply,
        calls: Mutex<Vec<(String, String, f32)>>,
    }

    impl FakeProvider {
        fn new(provider: AiProvider, reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                provider,
                reply,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(String, String, f32)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionProvider for FakeProvider {
        fn provider(&self) -> AiProvider {
            self.provider
        }

        async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, LlmError> {
            self.calls.lock().unwrap().push((
                request.model.to_string(),
                request.prompt.to_string(),
                request.temperature,
            ));
            match &self.reply {
                Reply::Text(t) => Ok(t.clone()),
                Reply::Status(s) => Err(LlmError::ProviderCallFailed {
                    provider: self.provider,
                    status: Some(*s),
                    message: "upstream error".to_string(),
                }),
            }
        }
    }

    fn analysis_json(with_industry: bool) -> serde_json::Value {
        let mut v = json!({
            "overallScore": 78,
            "atsCompatibility": 85,
            "readabilityScore": 71,
            "strengths": ["Clear progression", "Quantified impact"],
            "weaknesses": ["No summary"],
            "suggestions": ["Add a summary"],
            "missingKeywords": ["Kubernetes"]
        });
        if with_industry {
            v["industryMatch"] = json!(64);
        }
        v
    }

    fn router_with(fakes: &[Arc<FakeProvider>]) -> ProviderRouter {
        ProviderRouter::new(
            fakes
                .iter()
                .map(|f| Arc::clone(f) as Arc<dyn CompletionProvider>),
        )
    }

    #[tokio::test]
    async fn test_analyze_cv_round_trips_provider_json() {
        let openai = FakeProvider::new(
            AiProvider::OpenAi,
            Reply::Text(analysis_json(false).to_string()),
        );
        let router = router_with(&[openai.clone()]);

        let result = router
            .analyze_cv("Jane Doe, Software Engineer", "free", None)
            .await
            .unwrap();

        assert_eq!(result.provider, AiProvider::OpenAi);
        assert_eq!(
            serde_json::to_value(&result.analysis).unwrap(),
            analysis_json(false)
        );
        assert!(result.cost > 0.0);

        let calls = openai.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "gpt-4o-mini");
        assert!(calls[0].1.contains("Jane Doe, Software Engineer"));
        assert!(!calls[0].1.contains("industryMatch"));
        assert_eq!(calls[0].2, ANALYSIS_TEMPERATURE);
    }

    #[tokio::test]
    async fn test_job_description_requests_industry_match() {
        let claude = FakeProvider::new(
            AiProvider::Claude,
            Reply::Text(format!("```json\n{}\n```", analysis_json(true))),
        );
        let router = router_with(&[claude.clone()]);

        let result = router
            .analyze_cv("CV text", "careerPro", Some("Staff engineer, payments"))
            .await
            .unwrap();

        assert_eq!(result.analysis.industry_match, Some(serde_json::Number::from(64)));
        let calls = claude.calls();
        assert_eq!(calls[0].0, "claude-3-5-sonnet-20241022");
        assert!(calls[0].1.contains("Staff engineer, payments"));
        assert!(calls[0].1.contains("industryMatch"));
    }

    #[tokio::test]
    async fn test_cost_uses_provider_rates() {
        let reply = analysis_json(false).to_string();
        let cohere = FakeProvider::new(AiProvider::Cohere, Reply::Text(reply.clone()));
        let router = router_with(&[cohere.clone()]);

        let result = router.analyze_cv("CV", "payAsYouGo", None).await.unwrap();
        let prompt = &cohere.calls()[0].1;
        assert_eq!(result.provider, AiProvider::Cohere);
        assert_eq!(result.cost, estimate_cost(AiProvider::Cohere, prompt, &reply));
    }

    #[tokio::test]
    async fn test_unknown_tier_routes_like_free() {
        let openai = FakeProvider::new(
            AiProvider::OpenAi,
            Reply::Text(analysis_json(false).to_string()),
        );
        let router = router_with(&[openai.clone()]);
        router.analyze_cv("CV", "bogus-tier", None).await.unwrap();
        assert_eq!(openai.calls()[0].0, "gpt-4o-mini");
    }

    #[tokio::test]
    async fn test_non_json_reply_is_malformed() {
        let openai = FakeProvider::new(
            AiProvider::OpenAi,
            Reply::Text("I'm sorry, I can't review this CV.".to_string()),
        );
        let err = router_with(&[openai])
            .analyze_cv("CV", "starter", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LlmError::ProviderResponseMalformed {
                provider: AiProvider::OpenAi,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_required_field_is_malformed() {
        let mut partial = analysis_json(false);
        partial.as_object_mut().unwrap().remove("missingKeywords");
        let openai = FakeProvider::new(AiProvider::OpenAi, Reply::Text(partial.to_string()));
        let err = router_with(&[openai])
            .analyze_cv("CV", "free", None)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::ProviderResponseMalformed { .. }));
    }

    #[tokio::test]
    async fn test_provider_failure_propagates_without_retry() {
        let claude = FakeProvider::new(AiProvider::Claude, Reply::Status(529));
        let router = router_with(&[claude.clone()]);
        let err = router
            .analyze_cv("CV", "eliteExecutive", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LlmError::ProviderCallFailed {
                status: Some(529),
                ..
            }
        ));
        assert_eq!(claude.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_cover_letter_via_claude() {
        let claude = FakeProvider::new(
            AiProvider::Claude,
            Reply::Text("\n  Dear Hiring Manager,\n\nI am writing...  \n".to_string()),
        );
        let router = router_with(&[claude.clone()]);

        let result = router
            .generate_cover_letter("CV text", "Product designer at Acme", "careerPro")
            .await
            .unwrap();

        assert_eq!(result.provider, AiProvider::Claude);
        assert_eq!(result.cover_letter, "Dear Hiring Manager,\n\nI am writing...");
        let calls = claude.calls();
        assert!(calls[0].1.contains("250 to 350 words"));
        assert!(calls[0].1.contains("Product designer at Acme"));
        assert_eq!(calls[0].2, COVER_LETTER_TEMPERATURE);
    }

    #[tokio::test]
    async fn test_cover_letter_unsupported_on_cohere() {
        let cohere = FakeProvider::new(AiProvider::Cohere, Reply::Text("letter".to_string()));
        let router = router_with(&[cohere.clone()]);

        let err = router
            .generate_cover_letter("CV", "JD", "payAsYouGo")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LlmError::UnsupportedProviderForOperation {
                provider: AiProvider::Cohere,
                ..
            }
        ));
        assert!(cohere.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unregistered_provider() {
        let router = ProviderRouter::default();
        let err = router.analyze_cv("CV", "free", None).await.unwrap_err();
        assert!(matches!(
            err,
            LlmError::ProviderNotRegistered(AiProvider::OpenAi)
        ));
    }

    #[tokio::test]
    async fn test_end_to_end_through_openai_adapter() {
        use crate::llm_client::{build_http_client, OpenAiProvider};
        use std::time::Duration;

        let mut server = mockito::Server::new_async().await;
        let content = analysis_json(true).to_string();
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(
                json!({"choices": [{"message": {"role": "assistant", "content": content}}]})
                    .to_string(),
            )
            .create_async()
            .await;

        let client = build_http_client(Duration::from_secs(5)).unwrap();
        let adapter: Arc<dyn CompletionProvider> = Arc::new(OpenAiProvider::new(
            client,
            "sk-test".to_string(),
            Some(server.url()),
        ));
        let router = ProviderRouter::new([adapter]);

        let result = router
            .analyze_cv("CV", "professional", Some("Data engineer"))
            .await
            .unwrap();

        assert_eq!(
            serde_json::to_value(&result.analysis).unwrap(),
            analysis_json(true)
        );
        mock.assert_async().await;
    }
}
