//! services/bot/src/bin/bot.rs

use async_openai::{config::OpenAIConfig, Client};
use axum::{routing::post, Router};
use bot_lib::{
    adapters::{DbAdapter, OpenAiAnalysisAdapter, TelegramApi},
    config::Config,
    error::BotError,
    web::{
        background::BackgroundTasks, session::SessionManager, state::AppState, webhook_handler,
    },
};
use shelfbot_core::ports::{SystemClock, TextAnalysisService};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), BotError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting bot...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter
        .run_migrations()
        .await
        .map_err(|e| BotError::Internal(e.to_string()))?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let transport = Arc::new(TelegramApi::new(config.telegram_token.clone()));

    let analysis: Option<Arc<dyn TextAnalysisService>> = match &config.openai_api_key {
        Some(api_key) => {
            let openai_config = OpenAIConfig::new().with_api_key(api_key);
            let client = Client::with_config(openai_config);
            Some(Arc::new(OpenAiAnalysisAdapter::new(
                client,
                config.analysis_model.clone(),
            )))
        }
        None => {
            warn!("OPENAI_API_KEY not set; uploads will skip metadata suggestions");
            None
        }
    };

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        documents: db_adapter.clone(),
        user_states: db_adapter.clone(),
        users: db_adapter,
        transport,
        analysis,
        sessions: SessionManager::new(config.session_ttl, Arc::new(SystemClock)),
        background: BackgroundTasks::new(),
        config: config.clone(),
    });

    // --- 5. Create the Web Router ---
    let app = Router::new()
        .route("/webhook", post(webhook_handler))
        .with_state(app_state);

    // --- 6. Start the Server ---
    info!("Starting webhook server on {}", config.bind_address);
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
