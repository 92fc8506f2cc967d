//! Olympus Daemon
//!
//! Serves bitcoin fee rates, prices and Lightning payment routes over HTTP.

use anyhow::{Context, Result};
use clap::Parser;
use olympus_daemon::{http_router, AppState, Config, FeerateFetcher, LnRouter, PriceFetcher};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    dotenv::dotenv().ok();
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .init();

    tracing::info!("Olympus daemon {} starting...", env!("CARGO_PKG_VERSION"));
    config.validate()?;

    let endpoint = config.ln_endpoint()?;
    let router = LnRouter::connect(&endpoint, config.ln_max_hops)
        .await
        .with_context(|| format!("Failed to connect to Lightning node at {}", endpoint))?;
    let router = Arc::new(router);
    tracing::info!("Route finder initialized (max {} hops)", router.max_hops());

    let prices = PriceFetcher::new(&config.price_api_url)?;
    tracing::info!("Price fetcher initialized ({})", config.price_api_url);
    let feerates = FeerateFetcher::new(&config.btc_url, &config.btc_user, &config.btc_password)?;
    tracing::info!("Fee rate fetcher initialized ({})", config.btc_url);

    let app = http_router(AppState {
        prices: Arc::new(prices),
        feerates: Arc::new(feerates),
        routes: router.clone(),
    });

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down...");
    if let Err(e) = router.close().await {
        tracing::warn!("Error closing Lightning RPC connection: {}", e);
    }
    tracing::info!("Shutdown completed");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl-C"),
        Err(e) => tracing::error!("Failed to listen for Ctrl-C: {}", e),
    }
}
