// SPDX-License-Identifier: MIT

//! Time-bounded, content-addressed request cache.
//!
//! Wraps single REST/GraphQL calls to conserve API quota. Staleness up to
//! the TTL is an accepted tradeoff, not a correctness requirement, and any
//! storage fault degrades to a plain cache miss. Entries are written once
//! per key and replaced wholesale, so racing writers only do redundant
//! work (last write wins).

use crate::error::AppError;
use dashmap::DashMap;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::future::Future;

/// A cached payload with its write time.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub timestamp_ms: i64,
    pub payload: Value,
}

impl CacheEntry {
    /// An entry is valid iff it is younger than the TTL.
    pub fn is_fresh(&self, now_ms: i64, ttl_secs: u64) -> bool {
        now_ms - self.timestamp_ms < ttl_secs as i64 * 1000
    }
}

/// Storage-fault type. Always swallowed by the cached-fetch layer.
#[derive(Debug, thiserror::Error)]
#[error("cache storage fault: {0}")]
pub struct CacheFault(pub String);

/// Injected key-value storage so the layer is testable with fakes.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheFault>;
    fn set(&self, entry: CacheEntry) -> Result<(), CacheFault>;
}

/// Unbounded in-memory store. Expired entries linger until overwritten;
/// they are simply never returned once past TTL.
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: DashMap<String, CacheEntry>,
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheFault> {
        Ok(self.entries.get(key).map(|entry| entry.clone()))
    }

    fn set(&self, entry: CacheEntry) -> Result<(), CacheFault> {
        self.entries.insert(entry.key.clone(), entry);
        Ok(())
    }
}

/// Compute the cache key for a (namespace, request-identity) pair.
///
/// Identity is the URL for REST calls, or the serialized (query, variables)
/// pair for GraphQL.
pub fn cache_key(namespace: &str, identity: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update(b"\n");
    hasher.update(identity.as_bytes());
    hex::encode(hasher.finalize())
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Fetch through the cache: fresh hits skip the fetcher entirely, misses
/// (including storage faults and expired entries) invoke it and store the
/// result. Fetcher errors propagate; cache errors never do.
pub async fn cached_fetch<F, Fut>(
    store: &dyn CacheStore,
    namespace: &str,
    identity: &str,
    ttl_secs: u64,
    fetcher: F,
) -> Result<Value, AppError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Value, AppError>>,
{
    let key = cache_key(namespace, identity);
    let now = now_ms();

    match store.get(&key) {
        Ok(Some(entry)) if entry.is_fresh(now, ttl_secs) => return Ok(entry.payload),
        Ok(_) => {}
        Err(fault) => {
            tracing::debug!(%key, error = %fault, "cache read failed, treating as miss");
        }
    }

    let payload = fetcher().await?;

    if let Err(fault) = store.set(CacheEntry {
        key: key.clone(),
        timestamp_ms: now_ms(),
        payload: payload.clone(),
    }) {
        tracing::debug!(%key, error = %fault, "cache write failed, continuing");
    }

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Store whose every operation fails, for fault-swallowing tests.
    struct BrokenStore;

    impl CacheStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<CacheEntry>, CacheFault> {
            Err(CacheFault("read unavailable".into()))
        }

        fn set(&self, _entry: CacheEntry) -> Result<(), CacheFault> {
            Err(CacheFault("write unavailable".into()))
        }
    }

    #[test]
    fn test_cache_key_is_stable_and_namespaced() {
        let a = cache_key("rest", "/user/repos?per_page=100");
        let b = cache_key("rest", "/user/repos?per_page=100");
        let c = cache_key("graphql", "/user/repos?per_page=100");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64); // hex sha-256
    }

    #[tokio::test]
    async fn test_fresh_hit_skips_fetcher() {
        let store = MemoryCacheStore::default();
        let calls = AtomicU32::new(0);

        for _ in 0..2 {
            let result = cached_fetch(&store, "rest", "/user", 60, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!({"login": "octocat"}))
            })
            .await
            .unwrap();
            assert_eq!(result, json!({"login": "octocat"}));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_never_returned() {
        let store = MemoryCacheStore::default();
        let key = cache_key("rest", "/user");

        // Seed an entry that is already past a 1-second TTL.
        store
            .set(CacheEntry {
                key,
                timestamp_ms: now_ms() - 5_000,
                payload: json!("stale"),
            })
            .unwrap();

        let calls = AtomicU32::new(0);
        let result = cached_fetch(&store, "rest", "/user", 1, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!("fresh"))
        })
        .await
        .unwrap();

        assert_eq!(result, json!("fresh"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_storage_faults_degrade_to_miss() {
        let result = cached_fetch(&BrokenStore, "rest", "/user", 60, || async {
            Ok(json!("served anyway"))
        })
        .await
        .unwrap();

        assert_eq!(result, json!("served anyway"));
    }

    #[tokio::test]
    async fn test_fetcher_errors_propagate() {
        let store = MemoryCacheStore::default();
        let result = cached_fetch(&store, "rest", "/user", 60, || async {
            Err(AppError::GitHubApi("boom".into()))
        })
        .await;

        assert!(matches!(result, Err(AppError::GitHubApi(_))));
    }
}
