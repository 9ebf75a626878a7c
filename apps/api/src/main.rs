mod analysis;
mod config;
mod db;
mod errors;
mod llm_client;
mod routes;
mod state;
mod tiers;
mod usage;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::analysis::ProviderRouter;
use crate::config::Config;
use crate::db::create_pool;
use crate::llm_client::{
    build_http_client, AiProvider, ClaudeProvider, CohereProvider, CompletionProvider, OpenAiProvider,
};
use crate::routes::build_router;
use crate::state::AppState;
use crate::usage::{InMemoryUsageStore, PgUsageStore, UsageLedger, UsageStore};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting ApplyAce API v{}", env!("CARGO_PKG_VERSION"));

    // Usage ledger
    let store: Arc<dyn UsageStore> = match &config.database_url {
        Some(url) => Arc::new(PgUsageStore::new(create_pool(url).await?)),
        None => {
            warn!("DATABASE_URL not set: usage is tracked in memory and lost on restart");
            Arc::new(InMemoryUsageStore::new())
        }
    };
    let ledger = UsageLedger::new(store);

    // AI providers share one HTTP client
    let http = build_http_client(config.provider_timeout)?;
    let adapters: [Arc<dyn CompletionProvider>; 3] = [
        Arc::new(OpenAiProvider::new(
            http.clone(),
            config.openai_api_key.clone(),
            config.openai_base_url.clone(),
        )),
        Arc::new(ClaudeProvider::new(
            http.clone(),
            config.anthropic_api_key.clone(),
            config.anthropic_base_url.clone(),
        )),
        Arc::new(CohereProvider::new(
            http,
            config.cohere_api_key.clone(),
            config.cohere_base_url.clone(),
        )),
    ];
    for adapter in &adapters {
        if !has_key(&config, adapter.provider()) {
            warn!(provider = %adapter.provider(), "API key not set; calls will be rejected upstream");
        }
    }
    let router = ProviderRouter::new(adapters);
    info!(
        timeout_secs = config.provider_timeout.as_secs(),
        "AI provider router initialized"
    );

    let state = AppState { ledger, router };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins to the web client's domain

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn has_key(config: &Config, provider: AiProvider) -> bool {
    match provider {
        AiProvider::OpenAi => !config.openai_api_key.is_empty(),
        AiProvider::Claude => !config.anthropic_api_key.is_empty(),
        AiProvider::Cohere => !config.cohere_api_key.is_empty(),
    }
}
