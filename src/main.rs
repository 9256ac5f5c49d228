use anyhow::Context;
use tokio::net::TcpListener;

use chatbot_api::{build_router, config, services, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = config::settings::Settings::from_env().context("failed to load configuration")?;
    config::logging::init(&settings);

    tracing::info!("Starting AI Chatbot API...");
    tracing::info!(
        provider = %settings.model_provider,
        log_level = %settings.log_level,
        "configuration loaded"
    );
    tracing::debug!(?settings);

    let provider = services::llm::build_provider(&settings);
    let addr = format!("{}:{}", settings.host, settings.port);
    let app = build_router(AppState::new(settings, provider));

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Shutting down AI Chatbot API...");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
