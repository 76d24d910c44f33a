// SPDX-License-Identifier: MIT

//! Authenticated proxy and dashboard routes.
//!
//! Proxy responses use the `{ok, data, headers}` envelope the frontend's
//! transport layer unwraps; the dashboard route runs the whole pipeline
//! server-side and returns renderer-ready series.

use crate::analytics::AnalyticsEvent;
use crate::error::{AppError, Result};
use crate::middleware::auth::SessionToken;
use crate::ratelimit::RateLimitWarning;
use crate::services::dashboard::{DashboardData, DashboardService, Progress, ProgressCallback};
use crate::services::github::{GitHubTransport, RestResponse};
use crate::AppState;
use axum::{
    extract::{Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// API routes (require authentication via the session cookie).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/github/user", get(get_user))
        .route("/api/github/scopes", get(get_scopes))
        .route("/api/github/rest", get(rest_proxy))
        .route("/api/github/graphql", post(graphql_proxy))
        .route("/api/dashboard", get(get_dashboard))
}

/// Headers the frontend needs, as a JSON object (Link, rate limit, scopes).
fn headers_to_json(response: &RestResponse) -> Value {
    let mut map = Map::new();
    for (name, value) in &response.headers {
        if let Ok(value) = value.to_str() {
            map.insert(name.as_str().to_string(), Value::String(value.to_string()));
        }
    }
    Value::Object(map)
}

// ─── Identity ────────────────────────────────────────────────────────────

/// Get the authenticated user via the stored token.
async fn get_user(
    State(state): State<Arc<AppState>>,
    Extension(token): Extension<SessionToken>,
) -> Result<Json<Value>> {
    let response = state.github.get_rest(Some(&token.0), "/user", &None).await?;
    Ok(Json(json!({ "ok": true, "user": response.data })))
}

/// Get the stored token's granted scopes.
async fn get_scopes(
    State(state): State<Arc<AppState>>,
    Extension(token): Extension<SessionToken>,
) -> Result<Json<Value>> {
    let (_, scopes) = state.github.validate_token(&token.0).await?;
    Ok(Json(json!({ "ok": true, "scopes": scopes })))
}

// ─── Pass-through proxies ────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct RestProxyParams {
    path: String,
}

/// Generic REST proxy: `/api/github/rest?path=/user/repos?per_page=100`.
async fn rest_proxy(
    State(state): State<Arc<AppState>>,
    Extension(token): Extension<SessionToken>,
    Query(params): Query<RestProxyParams>,
) -> Result<Json<Value>> {
    if !params.path.starts_with('/') {
        return Err(AppError::BadRequest("Invalid path".to_string()));
    }

    let response = state
        .github
        .get_rest(Some(&token.0), &params.path, &None)
        .await?;

    Ok(Json(json!({
        "ok": true,
        "data": response.data,
        "headers": headers_to_json(&response),
    })))
}

#[derive(Deserialize)]
pub struct GraphqlBody {
    #[serde(default)]
    query: String,
    #[serde(default)]
    variables: Value,
}

/// GraphQL proxy: `POST /api/github/graphql { query, variables }`.
async fn graphql_proxy(
    State(state): State<Arc<AppState>>,
    Extension(token): Extension<SessionToken>,
    Json(body): Json<GraphqlBody>,
) -> Result<Json<Value>> {
    if body.query.is_empty() {
        return Err(AppError::BadRequest("Missing query".to_string()));
    }

    let data = state
        .github
        .graphql(&token.0, &body.query, &body.variables)
        .await?;

    Ok(Json(json!({ "ok": true, "data": data })))
}

// ─── Server-side dashboard ───────────────────────────────────────────────

/// Dashboard payload plus the signals collected while loading it: soft
/// rate-limit warnings and the final fallback progress step, both of which
/// the frontend surfaces as notices.
#[derive(Serialize)]
pub struct DashboardResponse {
    #[serde(flatten)]
    pub data: DashboardData,
    pub rate_limit_warnings: Vec<RateLimitWarning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_progress: Option<Progress>,
}

/// Run the full aggregation pipeline with the session token.
async fn get_dashboard(
    State(state): State<Arc<AppState>>,
    Extension(token): Extension<SessionToken>,
) -> Result<Json<DashboardResponse>> {
    let (warn_tx, mut warn_rx) = mpsc::unbounded_channel();
    let transport = GitHubTransport::Direct {
        client: state.github.clone(),
        token: token.0,
        warnings: Some(warn_tx),
    };

    let last_progress = Arc::new(Mutex::new(None));
    let progress_slot = Arc::clone(&last_progress);
    let on_progress: ProgressCallback = Box::new(move |step| {
        if let Ok(mut slot) = progress_slot.lock() {
            *slot = Some(step);
        }
    });

    let service = DashboardService::new(transport, state.cache.clone(), state.tuning.clone());
    let data = service.load(Some(&on_progress)).await?;

    state.analytics.track(AnalyticsEvent::with_detail(
        "dashboard_loaded",
        format!("{:?}", data.reconcile_state),
    ));

    // The unbounded channel buffers everything sent during the load.
    let mut rate_limit_warnings = Vec::new();
    while let Ok(warning) = warn_rx.try_recv() {
        rate_limit_warnings.push(warning);
    }
    let fallback_progress = last_progress.lock().ok().and_then(|slot| *slot);

    Ok(Json(DashboardResponse {
        data,
        rate_limit_warnings,
        fallback_progress,
    }))
}
