// main.rs
// Axum server wiring: loads config, connects MongoDB, builds the JSON API router and serves it.
//
// Endpoints (all JSON):
// - /api/students   -> enrollment, edits, fee structure
// - /api/results    -> publish, revise, delete exam results; clear back subjects
// - /api/payments   -> record and delete fee payments
// - /api/courses    -> course catalog
// - /api/reports    -> fee and result summaries

use std::sync::Arc;

use anyhow::{Context, Result};
use coachdesk::{config::Config, routes, state};
use dotenvy::dotenv;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;
    let state = Arc::new(
        state::init_state(&config)
            .await
            .context("failed to initialize MongoDB state")?,
    );

    let app = routes::router(state);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!("Listening on http://{}", config.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
