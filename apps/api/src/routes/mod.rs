pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::analysis::handlers as analysis;
use crate::state::AppState;
use crate::tiers::handlers as tiers;
use crate::usage::handlers as usage;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Tier catalogue
        .route("/api/v1/tiers", get(tiers::handle_list_tiers))
        .route("/api/v1/tiers/:tier", get(tiers::handle_get_tier))
        // Usage ledger
        .route("/api/v1/usage", get(usage::handle_get_usage))
        .route("/api/v1/usage/can-parse", get(usage::handle_can_parse))
        .route("/api/v1/usage/can-use-ai", get(usage::handle_can_use_ai))
        .route("/api/v1/usage/track", post(usage::handle_track_usage))
        // Metered AI calls
        .route("/api/v1/ai/analyze-cv", post(analysis::handle_analyze_cv))
        .route("/api/v1/ai/cover-letter", post(analysis::handle_cover_letter))
        .with_state(state)
}
