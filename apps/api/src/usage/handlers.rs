use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;
use crate::usage::{Operation, QuotaDecision, UserStats};

#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    pub user_id: Uuid,
    #[serde(default)]
    pub tier: String,
}

#[derive(Debug, Deserialize)]
pub struct TrackUsageRequest {
    pub user_id: Uuid,
    #[serde(default)]
    pub tier: String,
    pub operation: Operation,
    #[serde(default)]
    pub cost: f64,
}

/// GET /api/v1/usage
pub async fn handle_get_usage(
    State(state): State<AppState>,
    Query(params): Query<UsageQuery>,
) -> Result<Json<UserStats>, AppError> {
    let stats = state.ledger.user_stats(params.user_id, &params.tier).await?;
    Ok(Json(stats))
}

/// GET /api/v1/usage/can-parse
pub async fn handle_can_parse(
    State(state): State<AppState>,
    Query(params): Query<UsageQuery>,
) -> Result<Json<QuotaDecision>, AppError> {
    let decision = state.ledger.can_parse(params.user_id, &params.tier).await?;
    Ok(Json(decision))
}

/// GET /api/v1/usage/can-use-ai
pub async fn handle_can_use_ai(
    State(state): State<AppState>,
    Query(params): Query<UsageQuery>,
) -> Result<Json<QuotaDecision>, AppError> {
    let decision = state.ledger.can_use_ai(params.user_id, &params.tier).await?;
    Ok(Json(decision))
}

/// POST /api/v1/usage/track
///
/// Counts an operation performed elsewhere (e.g. CV parsing). No limit check.
/// The stats reflect exactly the record this call produced.
pub async fn handle_track_usage(
    State(state): State<AppState>,
    Json(req): Json<TrackUsageRequest>,
) -> Result<Json<UserStats>, AppError> {
    let record = state
        .ledger
        .record_usage(req.user_id, &req.tier, req.operation, req.cost)
        .await?;
    Ok(Json(UserStats::from_record(&record)))
}
