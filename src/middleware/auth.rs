// SPDX-License-Identifier: MIT

//! Session authentication middleware.
//!
//! The session credential is the GitHub token itself, stored in an
//! httpOnly cookie at login. The middleware never validates it against
//! GitHub; a stale token surfaces as a 401 from the proxied call.

use axum::{
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;

/// Cookie holding the GitHub access token.
pub const TOKEN_COOKIE: &str = "github_token";

/// The GitHub token extracted from the session cookie.
#[derive(Debug, Clone)]
pub struct SessionToken(pub String);

/// Middleware that requires a session token via cookie or bearer header.
pub async fn require_auth(
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // Try cookie first, then header
    let token = if let Some(cookie) = jar.get(TOKEN_COOKIE) {
        cookie.value().to_string()
    } else {
        let auth_header = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok());

        match auth_header {
            Some(h) if h.starts_with("Bearer ") => h[7..].to_string(),
            _ => return Err(StatusCode::UNAUTHORIZED),
        }
    };

    request.extensions_mut().insert(SessionToken(token));

    Ok(next.run(request).await)
}
