use axum::{extract::Path, Json};

use crate::tiers::{all_tiers, get_tier_config, TierDefinition};

/// GET /api/v1/tiers
pub async fn handle_list_tiers() -> Json<&'static [TierDefinition]> {
    Json(all_tiers())
}

/// GET /api/v1/tiers/:tier
///
/// Unknown names answer with the free plan, matching how usage is metered.
pub async fn handle_get_tier(Path(tier): Path<String>) -> Json<&'static TierDefinition> {
    Json(get_tier_config(&tier))
}
