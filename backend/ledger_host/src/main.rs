//! Crowdfund ledger host: entry point.
//!
//! Plays the ledger around the crowdfund hook: a SQLite-backed hook state
//! with a fixed entry capacity, a sequencer that runs one invocation at a
//! time, and an Axum REST API for submitting transactions and reading
//! campaigns.

mod api;
mod config;
mod db;
mod errors;
mod ledger;
mod views;

use std::sync::Arc;

use crowdfund_hook::CrowdfundHook;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use ledger::Ledger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;
    if config.dev_mode {
        warn!("DEV_MODE enabled: payloads may override the ledger clock");
    }

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(&config.database_url).await?;

    let hook = CrowdfundHook::new(config.hook_config());
    info!(
        create_deposit = config.create_campaign_deposit_drops,
        fund_deposit = config.fund_campaign_deposit_drops,
        capacity = config.hook_state_capacity,
        "crowdfund hook installed"
    );

    // ─── REST API ─────────────────────────────────────────
    let api_state = Arc::new(api::ApiState {
        ledger: Ledger::new(pool, hook, config.hook_state_capacity),
    });

    let app = api::router(api_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    // ─── Shutdown ─────────────────────────────────────────
    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
            }
            shutdown.cancel();
        }
    });

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}
