mod claims;
mod config;
mod content;
mod errors;
mod fetch;
mod models;
mod personalize;
mod routes;
mod state;

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{build_pipeline, Config};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Newsletter API v{}", env!("CARGO_PKG_VERSION"));

    // Shared HTTP client for every fetch strategy
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .build()
        .context("failed to build HTTP client")?;

    let pipeline = build_pipeline(&config, &client)?;
    info!(
        sources = ?pipeline.source_names(),
        relay = config.relay_url.is_some(),
        server_relay = config.server_relay_url.is_some(),
        attempt_timeout = ?config.fetch_attempt_timeout,
        pipeline_timeout = ?config.pipeline_timeout,
        "Personalization pipeline ready"
    );

    let state = AppState {
        pipeline,
        catalog: config.topic_catalog.clone(),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
