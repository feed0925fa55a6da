use anyhow::{Context, Result};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use anatomy_quiz::{
    api::{create_router, AppState},
    config::{Config, LoggingConfig, StorageConfig},
    flag_store::{FlagStore, InMemoryFlagStore, SqliteFlagStore},
    llm_service::LLMService,
    log_system_event,
    question_bank::QuestionBank,
    runner::QuizRunner,
    session_store::SessionStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    let _guard = setup_logging(&config.logging)?;
    config.validate()?;

    log_system_event!(startup, component = "server", "Starting anatomy quiz server");

    let bank = match &config.quiz.question_bank_path {
        Some(path) => QuestionBank::from_json_file(path)
            .with_context(|| format!("Failed to load question bank from {}", path))?,
        None => QuestionBank::builtin().context("Built-in question bank is invalid")?,
    };
    info!(
        questions = bank.len(),
        categories = bank.categories().len(),
        "Question bank loaded"
    );

    let flags: Arc<dyn FlagStore> = match &config.storage {
        StorageConfig::Memory => Arc::new(InMemoryFlagStore::new()),
        StorageConfig::Sqlite { url } => Arc::new(SqliteFlagStore::new(url).await?),
    };
    info!(storage = ?config.storage, "Flag store initialized");

    let llm_service = LLMService::new_with_provider(
        config.llm.api_key.clone(),
        config.llm.base_url.clone(),
        config.llm.provider,
        config.llm.model_override.clone(),
    );
    info!(
        provider = llm_service.provider_name().unwrap_or("none"),
        configured = llm_service.is_configured(),
        "Initialized LLM service"
    );

    let runner = QuizRunner::with_collaborator(Arc::new(bank), Arc::new(llm_service), flags)
        .with_default_model(config.llm.default_model);

    let sessions = SessionStore::new(config.quiz.max_sessions, config.quiz.session_idle_ttl_minutes);
    spawn_session_cleanup(sessions.clone());

    let app = create_router(AppState::with_sessions(runner, sessions)).layer(ServiceBuilder::new().layer(CorsLayer::permissive()));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Sweeps idle sessions once a minute so abandoned quizzes do not accumulate.
fn spawn_session_cleanup(sessions: SessionStore) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            sessions.cleanup().await;
        }
    });
}

fn setup_logging(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    use std::fs;
    use tracing_subscriber::fmt;

    let env_filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = logging.console_enabled.then(|| {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(true)
    });

    let (file_layer, guard) = if logging.file_enabled {
        fs::create_dir_all(&logging.log_directory).unwrap_or_else(|e| {
            eprintln!("Warning: Could not create logs directory: {}", e);
        });

        // Daily rotation, no ANSI colors in files
        let file_appender = tracing_appender::rolling::daily(&logging.log_directory, "anatomy-quiz.log");
        let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);
        let layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .with_writer(non_blocking_file);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!(
        directory = %logging.log_directory,
        file_enabled = logging.file_enabled,
        "Logging initialized"
    );

    Ok(guard)
}
