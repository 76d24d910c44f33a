// SPDX-License-Identifier: MIT

//! GitHub rate-limit inspection.
//!
//! Every direct (non-proxied) GitHub response passes through here before
//! its payload reaches callers. Exhausted quota fails the in-flight call;
//! low quota emits a non-fatal warning that the UI layer can surface as a
//! dismissible notice.

use crate::error::AppError;
use axum::http::HeaderMap;
use serde::Serialize;
use tokio::sync::mpsc;

/// Remaining-quota level below which a soft warning is emitted.
pub const SOFT_WARNING_THRESHOLD: u32 = 50;

/// Per-response rate-limit state, derived from headers. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSnapshot {
    pub remaining: u32,
    pub reset_epoch_secs: i64,
}

impl RateLimitSnapshot {
    /// Parse `x-ratelimit-remaining` / `x-ratelimit-reset` headers.
    ///
    /// Returns `None` when the headers are absent (e.g. proxied responses
    /// that strip them), which callers treat as "no information".
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let remaining = header_u64(headers, "x-ratelimit-remaining")? as u32;
        let reset_epoch_secs = header_u64(headers, "x-ratelimit-reset").unwrap_or(0) as i64;
        Some(Self {
            remaining,
            reset_epoch_secs,
        })
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

/// Non-fatal warning surfaced to the caller (and ultimately the UI).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitWarning {
    pub remaining: u32,
    pub reset_epoch_secs: i64,
}

/// Observable channel for soft warnings. `None` senders mean the caller
/// doesn't want them (they are still logged).
pub type WarningSink = Option<mpsc::UnboundedSender<RateLimitWarning>>;

/// Fail fast on exhausted quota; emit a soft warning below the threshold.
pub fn enforce(snapshot: &RateLimitSnapshot, sink: &WarningSink) -> Result<(), AppError> {
    if snapshot.remaining == 0 {
        return Err(AppError::RateLimitExceeded {
            reset_epoch_secs: snapshot.reset_epoch_secs,
        });
    }

    if snapshot.remaining < SOFT_WARNING_THRESHOLD {
        tracing::warn!(
            remaining = snapshot.remaining,
            reset = snapshot.reset_epoch_secs,
            "GitHub rate limit running low"
        );
        if let Some(tx) = sink {
            let _ = tx.send(RateLimitWarning {
                remaining: snapshot.remaining,
                reset_epoch_secs: snapshot.reset_epoch_secs,
            });
        }
    }

    Ok(())
}
