// SPDX-License-Identifier: MIT

//! Octodash: GitHub account analytics backend
//!
//! This crate provides the contribution-data aggregation pipeline and the
//! API proxy server that feeds the dashboard frontend.

pub mod aggregate;
pub mod analytics;
pub mod batch;
pub mod cache;
pub mod config;
pub mod credentials;
pub mod error;
pub mod heatmap;
pub mod middleware;
pub mod pagination;
pub mod ratelimit;
pub mod routes;
pub mod services;
pub mod time_utils;

use analytics::AnalyticsHandle;
use cache::CacheStore;
use config::Config;
use routes::privacy::ConsentStore;
use services::{DashboardTuning, GitHubClient};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub github: GitHubClient,
    pub cache: Arc<dyn CacheStore>,
    pub tuning: DashboardTuning,
    pub consent: ConsentStore,
    pub analytics: AnalyticsHandle,
}
