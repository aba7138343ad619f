mod backend_client;
mod config;
mod errors;
mod models;
mod routes;
mod screening;
mod state;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::backend_client::HttpBackend;
use crate::config::Config;
use crate::routes::build_router;
use crate::screening::EditorRegistry;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting prescreen v{}", env!("CARGO_PKG_VERSION"));

    // Initialize the screening backend client
    let backend = HttpBackend::new(
        &config.backend_url,
        config.backend_api_key.clone(),
        config.backend_timeout_secs,
    )
    .context("Failed to build the screening backend client")?;
    info!(
        "Screening backend: {} (timeout {}s)",
        config.backend_url, config.backend_timeout_secs
    );
    info!(
        "Engine timing: {} attempts, debounce {}ms, highlight {}ms, idle editors kept {}s",
        config.engine.max_attempts,
        config.engine.autosave_debounce.as_millis(),
        config.engine.highlight_window.as_millis(),
        config.engine.editor_idle_ttl.as_secs()
    );

    // Build app state; idle editors are swept in the background
    let registry = Arc::new(EditorRegistry::new(Arc::new(backend), config.engine.clone()));
    registry.spawn_idle_sweeper();
    let state = AppState { registry };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
