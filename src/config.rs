// SPDX-License-Identifier: MIT

//! Application configuration loaded from environment variables.
//!
//! Everything is read once at startup. OAuth credentials are optional:
//! without them the token-paste flow (`POST /auth/token`) still works.

use std::env;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// GitHub OAuth client ID (public). Empty disables the redirect flow.
    pub github_client_id: String,
    /// GitHub OAuth client secret.
    pub github_client_secret: String,
    /// Frontend URL for OAuth redirects and CORS.
    pub frontend_url: String,
    /// Key used to sign the OAuth `state` parameter.
    pub oauth_state_key: Vec<u8>,
    /// Server port
    pub port: u16,
    /// Whether usage analytics events are emitted.
    pub analytics_enabled: bool,
    /// Deployment label attached to analytics events.
    pub environment: String,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            github_client_id: "test_client_id".to_string(),
            github_client_secret: "test_secret".to_string(),
            frontend_url: "http://localhost:3000".to_string(),
            oauth_state_key: b"test_state_key_32_bytes_minimum!".to_vec(),
            port: 4000,
            analytics_enabled: false,
            environment: "test".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            github_client_id: env::var("GITHUB_CLIENT_ID").unwrap_or_default(),
            github_client_secret: env::var("GITHUB_CLIENT_SECRET").unwrap_or_default(),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            oauth_state_key: env::var("OAUTH_STATE_KEY")
                .map_err(|_| ConfigError::Missing("OAUTH_STATE_KEY"))?
                .into_bytes(),
            port: env::var("PORT")
                .unwrap_or_else(|_| "4000".to_string())
                .parse()
                .unwrap_or(4000),
            analytics_enabled: env::var("ANALYTICS_ENABLED")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}
