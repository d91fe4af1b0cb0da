//! Clarity Chat - a reflective conversation companion
//!
//! HTTP backend that drives per-session conversations through a pure state
//! machine and an OpenAI-compatible gateway.

mod api;
mod clarity;
mod config;
mod db;
mod llm;
mod prompt;
mod runtime;
mod state_machine;
mod tools;

use api::{create_router, AppState};
use config::Config;
use db::Database;
use llm::{LlmService, LoggingService, OpenAIService};
use runtime::SessionManager;
use std::net::SocketAddr;
use std::sync::Arc;
use tools::ToolRegistry;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clarity_chat=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = Config::from_env();

    // Ensure database directory exists
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;

    let reset = db.reset_all_to_idle()?;
    if reset > 0 {
        tracing::warn!(count = reset, "Reset sessions interrupted mid-turn");
    }

    if !config.is_configured() {
        tracing::warn!("AI Gateway not configured. Set CF_AI_BASE_URL and CF_AI_API_KEY.");
    }

    let openai = OpenAIService::new(
        config.base_url.as_deref().unwrap_or_default(),
        config.api_key.clone().unwrap_or_default(),
        config.llm_timeout,
        config.llm_max_retries,
    )?;
    let llm: Arc<dyn LlmService> = Arc::new(LoggingService::new(Arc::new(openai)));

    tracing::info!(
        default_model = %config.default_model,
        timeout_secs = config.llm_timeout.as_secs(),
        max_retries = config.llm_max_retries,
        "LLM client initialized"
    );

    let sessions = Arc::new(SessionManager::new(
        Arc::new(db),
        llm,
        Arc::new(ToolRegistry::standard()),
        config.default_model.clone(),
    ));

    let port = config.port;
    let state = AppState::new(sessions, config);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state)
        .layer(cors)
        .layer(compression)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Clarity Chat server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
