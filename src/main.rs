// SPDX-License-Identifier: MIT

//! Octodash API Server
//!
//! GitHub OAuth proxy plus the server-side contribution aggregation
//! pipeline behind `/api/dashboard`.

use octodash::{
    analytics::{AnalyticsConfig, AnalyticsHandle},
    cache::MemoryCacheStore,
    config::Config,
    routes::privacy::ConsentStore,
    services::{DashboardTuning, GitHubClient},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Octodash API");

    let analytics = AnalyticsHandle::init(AnalyticsConfig {
        enabled: config.analytics_enabled,
        environment: config.environment.clone(),
    });
    if analytics.is_enabled() {
        tracing::info!(environment = %config.environment, "Analytics enabled");
    }

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        github: GitHubClient::new(),
        cache: Arc::new(MemoryCacheStore::default()),
        tuning: DashboardTuning::default(),
        consent: ConsentStore::default(),
        analytics,
    });

    // Build router
    let app = octodash::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("octodash=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
