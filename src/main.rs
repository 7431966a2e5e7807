//! Tutor Chat - conversational tutoring engine
//!
//! A Rust backend implementing a conversation state machine for
//! mode-aware tutoring sessions, structured quizzes and session pacing.

mod api;
mod db;
mod llm;
mod pacing;
mod presentation;
mod quiz;
mod runtime;
mod state_machine;
mod system_prompt;
mod title_generator;

use api::{create_router, AppState};
use db::Database;
use llm::{AnthropicService, LlmConfig, LlmService, LoggingService};
use runtime::{DatabaseStorage, RuntimeManager, ServiceCompletionClient};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_PORT: u16 = 8000;

/// Server settings read from the environment
#[derive(Debug, Clone)]
struct ServerConfig {
    db_path: PathBuf,
    port: u16,
}

impl ServerConfig {
    fn from_env() -> Self {
        let db_path = std::env::var("TUTOR_DB_PATH").map_or_else(
            |_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".tutor-chat").join("sessions.db")
            },
            PathBuf::from,
        );

        let port = std::env::var("TUTOR_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        Self { db_path, port }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tutor_chat=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = ServerConfig::from_env();

    // Ensure database directory exists
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;

    // Completion service
    let llm_config = LlmConfig::from_env();
    if !llm_config.has_api_key() {
        tracing::warn!("No completion credentials configured. Set ANTHROPIC_API_KEY or LLM_GATEWAY.");
    }
    let service: Arc<dyn LlmService> = Arc::new(AnthropicService::new(&llm_config)?);
    tracing::info!(model = %service.model_id(), "Completion service initialized");
    let client = Arc::new(ServiceCompletionClient::new(Arc::new(LoggingService::new(
        service,
    ))));

    let runtime = RuntimeManager::new(DatabaseStorage::new(db), client);
    let state = AppState::new(runtime);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Tutor chat server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
