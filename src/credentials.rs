// SPDX-License-Identifier: MIT

//! Bearer credential storage and resolution.
//!
//! A resolved credential means API calls go straight to GitHub; an absent
//! one means the caller must route through the cookie-authenticated proxy.
//! Resolution is pure and performs no I/O.

/// Opaque bearer token presented in the `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Pluggable persisted-credential storage.
///
/// Set on login, cleared on logout. No expiry is tracked here; the
/// server-side cookie carries its own.
pub trait CredentialStore: Send + Sync {
    fn get(&self) -> Option<Credential>;
    fn set(&self, credential: Credential);
    fn clear(&self);
}

/// Resolve the active credential, if any.
pub fn resolve(store: &dyn CredentialStore) -> Option<Credential> {
    store.get()
}

/// In-memory credential store for tests and single-process callers.
#[derive(Default)]
pub struct MemoryCredentialStore {
    inner: std::sync::RwLock<Option<Credential>>,
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self) -> Option<Credential> {
        self.inner.read().ok().and_then(|guard| guard.clone())
    }

    fn set(&self, credential: Credential) {
        if let Ok(mut guard) = self.inner.write() {
            *guard = Some(credential);
        }
    }

    fn clear(&self) {
        if let Ok(mut guard) = self.inner.write() {
            *guard = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_absent_means_proxy_mode() {
        let store = MemoryCredentialStore::default();
        assert_eq!(resolve(&store), None);
    }

    #[test]
    fn test_set_resolve_clear_lifecycle() {
        let store = MemoryCredentialStore::default();
        store.set(Credential::new("ghp_abc"));
        assert_eq!(resolve(&store), Some(Credential::new("ghp_abc")));

        // Resolution is idempotent
        assert_eq!(resolve(&store), Some(Credential::new("ghp_abc")));

        store.clear();
        assert_eq!(resolve(&store), None);
    }
}
