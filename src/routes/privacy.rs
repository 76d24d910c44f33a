// SPDX-License-Identifier: MIT

//! Privacy endpoints: consent record, data export, right to be forgotten.
//!
//! Visitors are keyed by an anonymous uuid cookie, never by their GitHub
//! identity. Storage is in-memory and ephemeral; a restart forgets
//! everyone, which is acceptable for a consent record.

use crate::analytics::AnalyticsEvent;
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;
use axum::{
    extract::State,
    routing::{delete, get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Cookie carrying the anonymous visitor id.
pub const ANON_COOKIE: &str = "anon_id";

/// A visitor's consent decision.
#[derive(Debug, Clone, Serialize)]
pub struct ConsentRecord {
    pub consent: bool,
    pub updated_at: String,
}

/// In-memory consent storage keyed by anonymous id.
#[derive(Default)]
pub struct ConsentStore {
    records: DashMap<String, ConsentRecord>,
}

impl ConsentStore {
    pub fn get(&self, id: &str) -> Option<ConsentRecord> {
        self.records.get(id).map(|r| r.clone())
    }

    pub fn set(&self, id: &str, consent: bool) -> ConsentRecord {
        let record = ConsentRecord {
            consent,
            updated_at: format_utc_rfc3339(chrono::Utc::now()),
        };
        self.records.insert(id.to_string(), record.clone());
        record
    }

    pub fn remove(&self, id: &str) {
        self.records.remove(id);
    }
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/consent", get(get_consent))
        .route("/api/consent", post(set_consent))
        .route("/api/data-request", post(data_request))
        .route("/api/data", delete(delete_data))
}

/// Read the anon id from the jar, minting one (and its cookie) if absent.
fn anon_id(jar: CookieJar) -> (CookieJar, String) {
    if let Some(cookie) = jar.get(ANON_COOKIE) {
        let id = cookie.value().to_string();
        return (jar, id);
    }

    let id = uuid::Uuid::new_v4().to_string();
    let cookie = Cookie::build((ANON_COOKIE, id.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();
    (jar.add(cookie), id)
}

/// Current consent record, or `{consent: null}` when never set.
async fn get_consent(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> (CookieJar, Json<Value>) {
    let (jar, id) = anon_id(jar);
    let consent = match state.consent.get(&id) {
        Some(record) => json!(record),
        None => json!({ "consent": null }),
    };
    (jar, Json(json!({ "id": id, "consent": consent })))
}

#[derive(Deserialize)]
pub struct ConsentBody {
    #[serde(default)]
    consent: bool,
}

async fn set_consent(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(body): Json<ConsentBody>,
) -> (CookieJar, Json<Value>) {
    let (jar, id) = anon_id(jar);
    let record = state.consent.set(&id, body.consent);

    state.analytics.track(AnalyticsEvent::with_detail(
        "consent_updated",
        body.consent.to_string(),
    ));

    (
        jar,
        Json(json!({ "ok": true, "id": id, "consent": record })),
    )
}

/// Export everything stored about this visitor.
async fn data_request(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> (CookieJar, Json<Value>) {
    let (jar, id) = anon_id(jar);
    let export = json!({
        "id": id,
        "consent": state.consent.get(&id),
        "createdAt": format_utc_rfc3339(chrono::Utc::now()),
    });
    (jar, Json(json!({ "ok": true, "data": export })))
}

/// Delete everything stored about this visitor.
async fn delete_data(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> (CookieJar, Json<Value>) {
    let (jar, id) = anon_id(jar);
    state.consent.remove(&id);
    tracing::info!(%id, "Visitor data deleted");
    (jar, Json(json!({ "ok": true, "id": id })))
}
