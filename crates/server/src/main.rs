//! Voice Shopper server entry point

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use voice_shopper_config::Settings;
use voice_shopper_gateway::HttpActionGateway;
use voice_shopper_llm::{GeminiConfig, GeminiTurnGenerator};
use voice_shopper_server::{create_router, init_metrics, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Missing required environment variables are fatal, before anything else
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            // Tracing is not up yet
            eprintln!("Configuration error: {e}");
            eprintln!("Please check your environment and ensure all required variables are set");
            std::process::exit(1);
        }
    };

    init_tracing(&settings);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        backend = %settings.backend.base_url,
        "Starting Voice Shopper server"
    );

    init_metrics();

    // One HTTP client pool shared by the gateway and the speech/LLM engines
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.backend.request_timeout_secs))
        .build()?;

    let gateway = Arc::new(HttpActionGateway::new(&settings.backend)?);
    let generator = Arc::new(GeminiTurnGenerator::new(
        http_client.clone(),
        GeminiConfig::new(settings.speech.llm_api_key.clone()),
    ));

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port).parse()?;
    let state = AppState::new(settings, gateway, generator, http_client);

    // Periodic cleanup of idle sessions
    let cleanup_shutdown = state.sessions.start_cleanup_task();

    let app = create_router(state);
    tracing::info!(%addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = cleanup_shutdown.send(true);
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

/// Initialize tracing from settings
fn init_tracing(settings: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "voice_shopper={},tower_http=info",
            settings.observability.log_level
        )
        .into()
    });

    let fmt_layer = if settings.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
