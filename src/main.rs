use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use fortune_bot::agent::{DialoguePolicy, Dispatcher};
use fortune_bot::channels::{LineChannel, ReplySink, WebhookState, webhook_routes};
use fortune_bot::config::BotConfig;
use fortune_bot::crypto::FieldCipher;
use fortune_bot::fortune::{FortuneGenerator, GeneratorConfig};
use fortune_bot::llm::{LlmConfig, LlmProvider, UnconfiguredProvider, create_provider};
use fortune_bot::onboarding::OnboardingManager;
use fortune_bot::store::{EncryptedProfileStore, LibSqlBackend, ProfileStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let config = BotConfig::from_env().context("Invalid configuration")?;

    // Keep the guard alive so buffered file logs are flushed on exit.
    let _log_guard = init_tracing(&config);

    tracing::info!("fortune-bot v{}", env!("CARGO_PKG_VERSION"));

    let (channel_secret, access_token) = config
        .line_credentials()
        .context("LINE credentials are required")?;

    // ── Database ─────────────────────────────────────────────────────────
    let backend: Arc<dyn ProfileStore> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );
    tracing::info!(path = %config.db_path.display(), "Database ready");

    let cipher = FieldCipher::from_secret(&config.encryption_key);
    let store = Arc::new(EncryptedProfileStore::new(backend, cipher));

    // ── LLM ──────────────────────────────────────────────────────────────
    let llm_config = LlmConfig {
        backend: config.llm_backend,
        api_key: config.llm_api_key.clone(),
        model: config.model.clone(),
    };
    let llm: Arc<dyn LlmProvider> = match create_provider(&llm_config) {
        Ok(llm) => llm,
        Err(e) => {
            tracing::error!(error = %e, "LLM provider unavailable; fortunes will use the fallback reply");
            Arc::new(UnconfiguredProvider::new(
                config.llm_backend.name(),
                config.model.clone(),
            ))
        }
    };
    let generator = FortuneGenerator::new(llm, GeneratorConfig::default());

    // ── Dispatcher ───────────────────────────────────────────────────────
    let policy = Arc::new(DialoguePolicy::new(
        OnboardingManager::new(store),
        generator,
        config.max_message_chars,
    ));
    let sink: Arc<dyn ReplySink> = Arc::new(LineChannel::new(access_token.clone()));
    let (events, _dispatcher) =
        Dispatcher::new(policy, sink, config.max_in_flight).spawn(config.queue_capacity);

    // ── HTTP ─────────────────────────────────────────────────────────────
    let app = webhook_routes(WebhookState::new(channel_secret.clone(), events));
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "Webhook server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    tracing::info!("Shutting down");
    Ok(())
}

/// Console logging, plus a daily-rotated file when `FORTUNE_LOG_DIR` is set.
fn init_tracing(config: &BotConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "fortune-bot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    guard
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
