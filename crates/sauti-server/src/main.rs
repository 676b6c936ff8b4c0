//! Sauti Server - HTTP API for text-to-speech and speech-to-text

use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sauti_core::{IndexTtsLoader, Settings, SpeechService, WhisperLoader};
use sauti_server::{create_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sauti_server=debug,sauti_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Sauti speech server");

    // Load configuration
    let settings = Settings::load()?;
    info!("Checkpoints directory: {:?}", settings.checkpoints_dir);
    info!("Voices directory: {:?}", settings.voices_dir);
    info!(
        "Whisper model: {} (download root {:?})",
        settings.whisper_model_name, settings.whisper_model_dir
    );

    std::fs::create_dir_all(&settings.voices_dir)?;

    // Engines load lazily on first request
    let service = SpeechService::with_loaders(Arc::new(IndexTtsLoader), Arc::new(WhisperLoader));
    let state = AppState::new(service, settings.clone());
    tokio::fs::create_dir_all(&state.output_dir).await?;

    let app = create_router(state);

    let addr = format!("{}:{}", settings.host, settings.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    // Dropping the router on shutdown stops the engine daemons
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
