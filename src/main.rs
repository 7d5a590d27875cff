//! Main entry point for the Voice Serving Gateway

use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use voice_serving_gateway::{api, config::Settings, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = Settings::load()?;
    settings.validate()?;

    // Initialize logging; RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));
    if settings.logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Voice Serving Gateway"
    );

    // Build backend registry and routers
    let state = Arc::new(AppState::from_settings(settings)?);
    info!(
        completion_backends = state.registry.completion().len(),
        speech_backends = state.registry.speech().len(),
        "Backend registry ready"
    );

    // Build the router
    let app = api::routes::create_router(state.clone());

    // Start the server
    let addr = format!(
        "{}:{}",
        state.settings.server.host, state.settings.server.port
    );
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
