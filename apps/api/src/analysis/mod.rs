// AI-assisted CV analysis and cover letter generation.
// Provider selection is per tier (router.rs); quota enforcement wraps it in handlers.rs.

use serde::{Deserialize, Serialize};
use serde_json::Number;

use crate::llm_client::AiProvider;

pub mod cost;
pub mod handlers;
pub mod prompts;
pub mod router;

pub use router::ProviderRouter;

/// Structured CV review returned by the model. Scores keep the exact numeric
/// form the model produced (`78` stays `78`, `78.5` stays `78.5`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CvAnalysis {
    pub overall_score: Number,
    pub ats_compatibility: Number,
    pub readability_score: Number,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub suggestions: Vec<String>,
    pub missing_keywords: Vec<String>,
    /// Only requested when a job description is supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry_match: Option<Number>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub analysis: CvAnalysis,
    pub provider: AiProvider,
    pub cost: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoverLetterResult {
    pub cover_letter: String,
    pub provider: AiProvider,
    pub cost: f64,
}

/// Anything produced by a metered provider call.
pub trait Costed {
    fn cost(&self) -> f64;
}

impl Costed for AnalysisResult {
    fn cost(&self) -> f64 {
        self.cost
    }
}

impl Costed for CoverLetterResult {
    fn cost(&self) -> f64 {
        self.cost
    }
}
