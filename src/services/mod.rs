// SPDX-License-Identifier: MIT

//! Service layer: GitHub API access and the dashboard pipeline.

pub mod dashboard;
pub mod github;

pub use dashboard::{DashboardService, DashboardTuning};
pub use github::{GitHubClient, GitHubTransport};
