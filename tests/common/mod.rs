// SPDX-License-Identifier: MIT

use octodash::analytics::AnalyticsHandle;
use octodash::cache::MemoryCacheStore;
use octodash::config::Config;
use octodash::pagination::PageOptions;
use octodash::routes::create_router;
use octodash::routes::privacy::ConsentStore;
use octodash::services::{DashboardTuning, GitHubClient};
use octodash::AppState;
use std::sync::Arc;

/// Create a test app with offline dependencies.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    create_test_app_with_frontend_url("http://localhost:3000")
}

/// Same, with an explicit frontend URL (drives cookie Secure attributes).
#[allow(dead_code)]
pub fn create_test_app_with_frontend_url(frontend_url: &str) -> (axum::Router, Arc<AppState>) {
    // Unroutable GitHub base: any test that accidentally reaches the
    // network fails fast instead of calling GitHub.
    build_test_app(frontend_url, "http://127.0.0.1:1")
}

/// Same, pointed at a local GitHub stand-in server.
#[allow(dead_code)]
pub fn create_test_app_with_github_base(github_base: &str) -> (axum::Router, Arc<AppState>) {
    build_test_app("http://localhost:3000", github_base)
}

fn build_test_app(frontend_url: &str, github_base: &str) -> (axum::Router, Arc<AppState>) {
    let config = Config {
        frontend_url: frontend_url.to_string(),
        ..Config::default()
    };

    let state = Arc::new(AppState {
        config,
        github: GitHubClient::with_base(github_base),
        cache: Arc::new(MemoryCacheStore::default()),
        tuning: DashboardTuning {
            page_options: PageOptions {
                page_delay_ms: 0,
                ..PageOptions::default()
            },
            ..DashboardTuning::default()
        },
        consent: ConsentStore::default(),
        analytics: AnalyticsHandle::disabled(),
    });

    (create_router(state.clone()), state)
}
