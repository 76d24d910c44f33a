// SPDX-License-Identifier: MIT

//! GitHub API client for REST, GraphQL, and OAuth code exchange.
//!
//! Handles:
//! - REST fetches with response headers exposed (pagination needs `Link`)
//! - GraphQL queries with GitHub's in-body error envelope
//! - OAuth authorization-code exchange and token validation
//! - Rate-limit inspection on every direct response

use crate::credentials::{resolve, CredentialStore};
use crate::error::AppError;
use crate::ratelimit::{enforce, RateLimitSnapshot, WarningSink};
use axum::http::HeaderMap;
use serde_json::{json, Value};

const USER_AGENT: &str = "octodash";

/// A REST response body plus the headers callers need (Link, rate limit).
#[derive(Debug, Clone)]
pub struct RestResponse {
    pub data: Value,
    pub headers: HeaderMap,
}

impl RestResponse {
    pub fn link_header(&self) -> Option<String> {
        self.headers
            .get("link")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }
}

/// GitHub API client.
#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    rest_base: String,
    graphql_url: String,
    oauth_token_url: String,
}

impl Default for GitHubClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GitHubClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            rest_base: "https://api.github.com".to_string(),
            graphql_url: "https://api.github.com/graphql".to_string(),
            oauth_token_url: "https://github.com/login/oauth/access_token".to_string(),
        }
    }

    /// Client pointed at a different host (tests, GitHub Enterprise).
    pub fn with_base(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            http: reqwest::Client::new(),
            graphql_url: format!("{base}/graphql"),
            oauth_token_url: format!("{base}/login/oauth/access_token"),
            rest_base: base,
        }
    }

    /// GET a REST path (e.g. `/user/repos?per_page=100`).
    ///
    /// The rate-limit guard runs on every response before the payload is
    /// returned; soft warnings go to `warnings`.
    pub async fn get_rest(
        &self,
        token: Option<&str>,
        path: &str,
        warnings: &WarningSink,
    ) -> Result<RestResponse, AppError> {
        let url = if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string() // pagination follows absolute `next` links
        } else {
            format!("{}{}", self.rest_base, path)
        };

        let mut request = self
            .http
            .get(&url)
            .header("Accept", "application/vnd.github.v3+json")
            .header("User-Agent", USER_AGENT);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::GitHubApi(e.to_string()))?;

        let headers = to_header_map(response.headers());
        if let Some(snapshot) = RateLimitSnapshot::from_headers(&headers) {
            enforce(&snapshot, warnings)?;
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.as_u16() == 401 {
            return Err(AppError::InvalidToken);
        }
        if !status.is_success() {
            return Err(AppError::GitHubApi(format!("HTTP {}: {}", status, body)));
        }

        let data =
            serde_json::from_str(&body).map_err(|e| AppError::GitHubApi(format!("JSON parse error: {}", e)))?;

        Ok(RestResponse { data, headers })
    }

    /// POST a GraphQL query; returns the `data` field.
    pub async fn graphql(
        &self,
        token: &str,
        query: &str,
        variables: &Value,
    ) -> Result<Value, AppError> {
        let response = self
            .http
            .post(&self.graphql_url)
            .bearer_auth(token)
            .header("User-Agent", USER_AGENT)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|e| AppError::GitHubApi(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 401 {
            return Err(AppError::InvalidToken);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::GitHubApi(format!("HTTP {}: {}", status, body)));
        }

        let envelope: Value = response
            .json()
            .await
            .map_err(|e| AppError::GitHubApi(format!("JSON parse error: {}", e)))?;

        if let Some(errors) = envelope.get("errors").and_then(Value::as_array) {
            let joined = errors
                .iter()
                .filter_map(|e| e.get("message").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(AppError::GitHubApi(joined));
        }

        Ok(envelope.get("data").cloned().unwrap_or(Value::Null))
    }

    /// Validate a token against `/user`; returns the profile and the
    /// granted scopes from `x-oauth-scopes`.
    pub async fn validate_token(&self, token: &str) -> Result<(Value, String), AppError> {
        let response = self.get_rest(Some(token), "/user", &None).await?;
        let scopes = response
            .headers
            .get("x-oauth-scopes")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        Ok((response.data, scopes))
    }

    /// Exchange an OAuth authorization code for an access token.
    pub async fn exchange_code(
        &self,
        client_id: &str,
        client_secret: &str,
        code: &str,
        redirect_uri: &str,
    ) -> Result<String, AppError> {
        let response = self
            .http
            .post(&self.oauth_token_url)
            .header("Accept", "application/json")
            .form(&[
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("code", code),
                ("redirect_uri", redirect_uri),
            ])
            .send()
            .await
            .map_err(|e| AppError::GitHubApi(format!("Token exchange failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::error!(status = %status, "GitHub token exchange failed");
            return Err(AppError::GitHubApi(format!(
                "Token exchange failed with status {}",
                status
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::GitHubApi(format!("Failed to parse token response: {}", e)))?;

        body.get("access_token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AppError::GitHubApi("No access token in GitHub response".to_string()))
    }
}

fn to_header_map(headers: &reqwest::header::HeaderMap) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        if let (Ok(name), Ok(value)) = (
            axum::http::HeaderName::from_bytes(name.as_str().as_bytes()),
            axum::http::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            map.append(name, value);
        }
    }
    map
}

// ─── Transport selection ─────────────────────────────────────────────────

/// How pipeline fetches reach GitHub: directly with a bearer credential,
/// or through the cookie-authenticated proxy server.
pub enum GitHubTransport {
    Direct {
        client: GitHubClient,
        token: String,
        warnings: WarningSink,
    },
    Proxy {
        http: reqwest::Client,
        base_url: String,
    },
}

impl GitHubTransport {
    /// Pick the transport from the credential store: a resolved credential
    /// means direct calls, absence means proxy mode.
    pub fn from_store(
        store: &dyn CredentialStore,
        proxy_base_url: impl Into<String>,
        warnings: WarningSink,
    ) -> Self {
        match resolve(store) {
            Some(credential) => GitHubTransport::Direct {
                client: GitHubClient::new(),
                token: credential.as_str().to_string(),
                warnings,
            },
            None => GitHubTransport::Proxy {
                http: reqwest::Client::new(),
                base_url: proxy_base_url.into(),
            },
        }
    }

    pub async fn rest(&self, path: &str) -> Result<RestResponse, AppError> {
        match self {
            GitHubTransport::Direct {
                client,
                token,
                warnings,
            } => client.get_rest(Some(token), path, warnings).await,
            GitHubTransport::Proxy { http, base_url } => {
                let url = format!(
                    "{}/api/github/rest?path={}",
                    base_url,
                    urlencoding::encode(path)
                );
                let envelope: Value = http
                    .get(&url)
                    .send()
                    .await
                    .map_err(|e| AppError::GitHubApi(e.to_string()))?
                    .json()
                    .await
                    .map_err(|e| AppError::GitHubApi(format!("JSON parse error: {}", e)))?;
                unwrap_proxy_envelope(envelope)
            }
        }
    }

    pub async fn graphql(&self, query: &str, variables: &Value) -> Result<Value, AppError> {
        match self {
            GitHubTransport::Direct { client, token, .. } => {
                client.graphql(token, query, variables).await
            }
            GitHubTransport::Proxy { http, base_url } => {
                let envelope: Value = http
                    .post(format!("{}/api/github/graphql", base_url))
                    .json(&json!({ "query": query, "variables": variables }))
                    .send()
                    .await
                    .map_err(|e| AppError::GitHubApi(e.to_string()))?
                    .json()
                    .await
                    .map_err(|e| AppError::GitHubApi(format!("JSON parse error: {}", e)))?;

                if envelope.get("ok").and_then(Value::as_bool) != Some(true) {
                    return Err(AppError::GitHubApi(
                        envelope
                            .get("error")
                            .map(|e| e.to_string())
                            .unwrap_or_else(|| "proxy error".to_string()),
                    ));
                }
                Ok(envelope.get("data").cloned().unwrap_or(Value::Null))
            }
        }
    }
}

/// Rebuild a `RestResponse` from the proxy's `{ok, data, headers}` body.
fn unwrap_proxy_envelope(envelope: Value) -> Result<RestResponse, AppError> {
    if envelope.get("ok").and_then(Value::as_bool) != Some(true) {
        return Err(AppError::GitHubApi(
            envelope
                .get("error")
                .map(|e| e.to_string())
                .unwrap_or_else(|| "proxy error".to_string()),
        ));
    }

    let mut headers = HeaderMap::new();
    if let Some(map) = envelope.get("headers").and_then(Value::as_object) {
        for (name, value) in map {
            if let (Ok(name), Some(value)) = (
                axum::http::HeaderName::from_bytes(name.as_bytes()),
                value.as_str().and_then(|v| v.parse().ok()),
            ) {
                headers.insert(name, value);
            }
        }
    }

    Ok(RestResponse {
        data: envelope.get("data").cloned().unwrap_or(Value::Null),
        headers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{Credential, MemoryCredentialStore};

    #[test]
    fn test_transport_selection_follows_credential() {
        let store = MemoryCredentialStore::default();
        let transport = GitHubTransport::from_store(&store, "http://localhost:4000", None);
        assert!(matches!(transport, GitHubTransport::Proxy { .. }));

        store.set(Credential::new("ghp_abc"));
        let transport = GitHubTransport::from_store(&store, "http://localhost:4000", None);
        assert!(matches!(transport, GitHubTransport::Direct { .. }));
    }

    #[test]
    fn test_unwrap_proxy_envelope_success() {
        let envelope = serde_json::json!({
            "ok": true,
            "data": [1, 2, 3],
            "headers": {"link": "<https://api.github.com/x?page=2>; rel=\"next\""}
        });

        let response = unwrap_proxy_envelope(envelope).unwrap();
        assert_eq!(response.data, serde_json::json!([1, 2, 3]));
        assert!(response.link_header().unwrap().contains("rel=\"next\""));
    }

    #[test]
    fn test_unwrap_proxy_envelope_error() {
        let envelope = serde_json::json!({"ok": false, "error": "Not authenticated"});
        assert!(matches!(
            unwrap_proxy_envelope(envelope),
            Err(AppError::GitHubApi(_))
        ));
    }

    #[test]
    fn test_with_base_rewrites_endpoints() {
        let client = GitHubClient::with_base("http://127.0.0.1:9999");
        assert_eq!(client.rest_base, "http://127.0.0.1:9999");
        assert_eq!(client.graphql_url, "http://127.0.0.1:9999/graphql");
    }
}
