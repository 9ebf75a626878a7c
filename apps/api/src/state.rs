use crate::analysis::ProviderRouter;
use crate::usage::UsageLedger;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Backed by Postgres when `DATABASE_URL` is set, otherwise process-local.
    pub ledger: UsageLedger,
    pub router: ProviderRouter,
}
