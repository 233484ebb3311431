// OTP Dashboard Server
// Admin dashboard backend over the bot's MongoDB collections

use std::sync::Arc;

use anyhow::Result;
use otp_dashboard::{config::Config, database::Database, handlers, AppState};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("otp_dashboard=info".parse()?)
                .add_directive("mongodb=warn".parse()?),
        )
        .init();

    info!("Starting OTP Dashboard Server");

    let config = Config::from_env()?;
    config.log_summary();

    // Initialize database
    let store = Database::init(&config.store).await?;

    let state = Arc::new(AppState::new(store.clone(), &config));

    // Warm the dashboard cache; the server still starts when this fails
    if let Err(e) = state.dashboard.refresh_dashboard_cache().await {
        warn!("Initial dashboard refresh failed: {}", e);
    }

    let app = handlers::with_http_layers(handlers::router(state), config.request_timeout);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("OTP Dashboard listening on {}", listener.local_addr()?);

    let served = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e));

    store.disconnect().await;
    info!("Shutdown complete");
    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
