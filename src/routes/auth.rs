// SPDX-License-Identifier: MIT

//! GitHub OAuth and token-paste authentication routes.

use axum::{
    extract::{Query, State},
    response::Redirect,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{AppError, Result};
use crate::middleware::auth::TOKEN_COOKIE;
use crate::AppState;

type HmacSha256 = Hmac<Sha256>;

/// Requested OAuth scopes: profile plus repository read access.
const OAUTH_SCOPE: &str = "read:user repo";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/github", get(auth_start))
        .route("/auth/github/callback", get(auth_callback))
        .route("/auth/token", post(token_store))
        .route("/auth/token/test", post(token_test))
        .route("/auth/logout", post(logout))
}

/// Build the session cookie holding the GitHub token.
fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((TOKEN_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

/// Removal counterpart: identical attributes plus `Max-Age=0`.
fn expired_session_cookie(secure: bool) -> Cookie<'static> {
    let mut cookie = session_cookie(String::new(), secure);
    cookie.make_removal();
    cookie
}

fn wants_secure_cookies(frontend_url: &str) -> bool {
    frontend_url.starts_with("https://")
}

/// Query parameters for starting the OAuth flow.
#[derive(Deserialize)]
pub struct AuthStartParams {
    /// Frontend URL to redirect back to after OAuth completes.
    /// If not provided, uses FRONTEND_URL env var.
    #[serde(default)]
    redirect_uri: Option<String>,
}

/// Start the OAuth flow: redirect to GitHub authorization.
async fn auth_start(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuthStartParams>,
    headers: axum::http::HeaderMap,
) -> Result<Redirect> {
    if state.config.github_client_id.is_empty() {
        return Err(AppError::BadRequest(
            "OAuth not configured on server. Set GITHUB_CLIENT_ID.".to_string(),
        ));
    }

    let frontend_url = params
        .redirect_uri
        .unwrap_or_else(|| state.config.frontend_url.clone());

    // Encode frontend URL + timestamp in the state parameter
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("System time error: {}", e)))?
        .as_millis();

    // Data payload: "frontend_url|timestamp_hex"
    let state_payload = format!("{}|{:x}", frontend_url, timestamp);

    let mut mac = HmacSha256::new_from_slice(&state.config.oauth_state_key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(state_payload.as_bytes());
    let signature = mac.finalize().into_bytes();

    // "payload|signature_hex", base64url-encoded for the URL
    let signed_state = format!("{}|{}", state_payload, hex::encode(signature));
    let oauth_state = URL_SAFE_NO_PAD.encode(signed_state.as_bytes());

    let callback_url = callback_url(&headers);

    let auth_url = format!(
        "https://github.com/login/oauth/authorize?\
         client_id={}&\
         redirect_uri={}&\
         scope={}&\
         state={}&\
         allow_signup=true",
        state.config.github_client_id,
        urlencoding::encode(&callback_url),
        urlencoding::encode(OAUTH_SCOPE),
        oauth_state
    );

    tracing::info!(
        client_id = %state.config.github_client_id,
        frontend_url = %frontend_url,
        "Starting OAuth flow, redirecting to GitHub"
    );

    Ok(Redirect::temporary(&auth_url))
}

/// Derive this server's callback URL from the request host.
fn callback_url(headers: &axum::http::HeaderMap) -> String {
    let host = headers
        .get(axum::http::header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| {
            std::env::var("API_HOST").unwrap_or_else(|_| "localhost:4000".to_string())
        });

    let scheme = if host.contains("localhost") || host.contains("127.0.0.1") {
        "http"
    } else {
        "https"
    };

    format!("{}://{}/auth/github/callback", scheme, host)
}

#[derive(Deserialize)]
pub struct CallbackParams {
    code: String,
    state: String,
    #[serde(default)]
    error: Option<String>,
}

/// OAuth callback: verify state, exchange the code, set the session cookie.
async fn auth_callback(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    headers: axum::http::HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Result<(CookieJar, Redirect)> {
    // Decode and verify the frontend URL from the state parameter
    let frontend_url = verify_and_decode_state(&params.state, &state.config.oauth_state_key)
        .unwrap_or_else(|| {
            tracing::warn!(
                "Invalid or tampered state parameter, falling back to default frontend URL"
            );
            state.config.frontend_url.clone()
        });

    if let Some(error) = params.error {
        tracing::warn!(error = %error, "OAuth error from GitHub");
        let redirect = format!("{}?error={}", frontend_url, urlencoding::encode(&error));
        return Ok((jar, Redirect::temporary(&redirect)));
    }

    tracing::info!("Exchanging authorization code for access token");

    let token = state
        .github
        .exchange_code(
            &state.config.github_client_id,
            &state.config.github_client_secret,
            &params.code,
            &callback_url(&headers),
        )
        .await?;

    let secure = wants_secure_cookies(&state.config.frontend_url);
    let jar = jar.add(session_cookie(token, secure));

    let redirect_url = format!("{}?auth=success", frontend_url);
    Ok((jar, Redirect::temporary(&redirect_url)))
}

/// Verify the HMAC signature and decode the frontend URL from the OAuth
/// state parameter.
fn verify_and_decode_state(state: &str, secret: &[u8]) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(state).ok()?;
    let state_str = String::from_utf8(bytes).ok()?;

    // Format is "frontend_url|timestamp_hex|signature_hex"
    let parts: Vec<&str> = state_str.splitn(3, '|').collect();
    if parts.len() != 3 {
        return None;
    }

    let frontend_url = parts[0];
    let timestamp_hex = parts[1];
    let signature_hex = parts[2];

    let payload = format!("{}|{}", frontend_url, timestamp_hex);

    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(payload.as_bytes());

    let expected_signature = hex::encode(mac.finalize().into_bytes());

    if signature_hex != expected_signature {
        tracing::error!("OAuth state signature mismatch! Potential tampering.");
        return None;
    }

    Some(frontend_url.to_string())
}

#[derive(Deserialize)]
pub struct TokenBody {
    #[serde(default)]
    token: String,
}

/// Validate a pasted token and store it in the session cookie.
async fn token_store(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(body): Json<TokenBody>,
) -> Result<(CookieJar, Json<Value>)> {
    if body.token.is_empty() {
        return Err(AppError::BadRequest("Missing token".to_string()));
    }

    let (user, scopes) = state.github.validate_token(&body.token).await?;

    let secure = wants_secure_cookies(&state.config.frontend_url);
    let jar = jar.add(session_cookie(body.token, secure));

    Ok((jar, Json(json!({ "ok": true, "user": user, "scopes": scopes }))))
}

/// Validate a token without storing it.
async fn token_test(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TokenBody>,
) -> Result<Json<Value>> {
    if body.token.is_empty() {
        return Err(AppError::BadRequest("Missing token".to_string()));
    }

    let (user, scopes) = state.github.validate_token(&body.token).await?;

    Ok(Json(json!({ "ok": true, "user": user, "scopes": scopes })))
}

/// Clear the session cookie.
async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> (CookieJar, Json<Value>) {
    let secure = wants_secure_cookies(&state.config.frontend_url);
    let jar = jar.add(expired_session_cookie(secure));
    (jar, Json(json!({ "ok": true })))
}
