// SPDX-License-Identifier: MIT

//! Opt-in usage analytics as an explicit context object.
//!
//! No global mutable state: callers hold a handle created by `init` and
//! drop it (or call `dispose`) when done. A disabled handle is a no-op, so
//! call sites never need to branch on consent themselves.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Analytics configuration.
#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    /// Whether the user consented to usage analytics.
    pub enabled: bool,
    /// Deployment label attached to every event.
    pub environment: String,
}

/// A trackable event.
#[derive(Debug, Clone)]
pub struct AnalyticsEvent {
    pub name: &'static str,
    pub detail: Option<String>,
}

impl AnalyticsEvent {
    pub fn named(name: &'static str) -> Self {
        Self { name, detail: None }
    }

    pub fn with_detail(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            detail: Some(detail.into()),
        }
    }
}

/// Handle for emitting analytics events.
#[derive(Clone)]
pub struct AnalyticsHandle {
    enabled: Arc<AtomicBool>,
    environment: Arc<str>,
}

impl AnalyticsHandle {
    /// Create a handle from configuration.
    pub fn init(config: AnalyticsConfig) -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(config.enabled)),
            environment: config.environment.into(),
        }
    }

    /// A permanently disabled handle (no consent, or tests).
    pub fn disabled() -> Self {
        Self::init(AnalyticsConfig {
            enabled: false,
            environment: "off".to_string(),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Emit an event. No-op when disabled or disposed.
    pub fn track(&self, event: AnalyticsEvent) {
        if !self.is_enabled() {
            return;
        }
        tracing::info!(
            target: "octodash::analytics",
            event = event.name,
            detail = event.detail.as_deref().unwrap_or(""),
            environment = %self.environment,
            "analytics event"
        );
    }

    /// Permanently disable this handle and all of its clones.
    pub fn dispose(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_handle_never_tracks() {
        let handle = AnalyticsHandle::disabled();
        assert!(!handle.is_enabled());
        handle.track(AnalyticsEvent::named("dashboard_loaded")); // no-op
    }

    #[test]
    fn test_dispose_disables_all_clones() {
        let handle = AnalyticsHandle::init(AnalyticsConfig {
            enabled: true,
            environment: "test".to_string(),
        });
        let clone = handle.clone();
        assert!(clone.is_enabled());

        handle.dispose();
        assert!(!clone.is_enabled());
    }
}
