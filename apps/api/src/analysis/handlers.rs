use std::future::Future;

use axum::{extract::State, Json};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::analysis::{AnalysisResult, CoverLetterResult, Costed};
use crate::errors::AppError;
use crate::llm_client::LlmError;
use crate::state::AppState;
use crate::usage::{Operation, Settlement, UsageLedger};

#[derive(Debug, Deserialize)]
pub struct AnalyzeCvRequest {
    pub user_id: Uuid,
    #[serde(default)]
    pub tier: String,
    pub cv_text: String,
    pub job_description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CoverLetterRequest {
    pub user_id: Uuid,
    #[serde(default)]
    pub tier: String,
    pub cv_text: String,
    pub job_description: String,
}

/// POST /api/v1/ai/analyze-cv
pub async fn handle_analyze_cv(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeCvRequest>,
) -> Result<Json<AnalysisResult>, AppError> {
    require_text("cv_text", &req.cv_text)?;
    let job_description = req
        .job_description
        .as_deref()
        .map(str::trim)
        .filter(|jd| !jd.is_empty());

    let result = run_metered(&state.ledger, req.user_id, &req.tier, || {
        state
            .router
            .analyze_cv(&req.cv_text, &req.tier, job_description)
    })
    .await?;
    Ok(Json(result))
}

/// POST /api/v1/ai/cover-letter
pub async fn handle_cover_letter(
    State(state): State<AppState>,
    Json(req): Json<CoverLetterRequest>,
) -> Result<Json<CoverLetterResult>, AppError> {
    require_text("cv_text", &req.cv_text)?;
    require_text("job_description", &req.job_description)?;

    let result = run_metered(&state.ledger, req.user_id, &req.tier, || {
        state
            .router
            .generate_cover_letter(&req.cv_text, &req.job_description, &req.tier)
    })
    .await?;
    Ok(Json(result))
}

fn require_text(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Reserves one AI call, runs `call`, then charges its cost or refunds the
/// reservation. A failed settlement is logged and does not fail the request.
/// A refund landing after a month rollover is dropped by the ledger.
async fn run_metered<T, F, Fut>(
    ledger: &UsageLedger,
    user_id: Uuid,
    tier: &str,
    call: F,
) -> Result<T, AppError>
where
    T: Costed,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let reservation = ledger.try_consume(user_id, tier, Operation::Ai).await?;
    if !reservation.decision.allowed {
        let reason = reservation
            .decision
            .reason
            .unwrap_or_else(|| "AI usage limit reached".to_string());
        return Err(AppError::QuotaExceeded(format!(
            "{reason}. Upgrade your plan to continue."
        )));
    }

    let outcome = call().await;
    let settlement = match &outcome {
        Ok(result) => Settlement::Completed {
            cost: result.cost(),
        },
        Err(_) => reservation.refund(),
    };
    match ledger.settle(user_id, tier, Operation::Ai, settlement).await {
        Ok(record) => info!(
            key = %record.key(),
            ai_calls = record.ai_call_count,
            total_cost = record.total_cost,
            ?settlement,
            "AI call settled"
        ),
        Err(e) => warn!(%user_id, tier, ?settlement, "Failed to settle AI usage: {e}"),
    }

    Ok(outcome?)
}
