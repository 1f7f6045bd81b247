//! The `SharedStore` contract: the primitives the Rate Limiter (C5),
//! Login Lock-out (C6), and OAuth token cache (C10) all build on.
//!
//! In production this would be backed by Redis (an external
//! collaborator per `spec.md` §1); this crate ships only the
//! in-process `LocalSharedStore` fallback the Design Notes call for,
//! built on `parking_lot::Mutex`, the same lock the stalwart-family
//! crates reach for throughout the pack.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

/// Minimal async key-value contract with TTL support, modeling the
/// subset of Redis commands this crate's components need.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Atomically increment the counter at `key` by 1, returning the
    /// new value. If this is the first increment (the key didn't
    /// exist), set its expiry to `ttl`.
    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> u64;

    /// Fetch the string value at `key`, or `None` if absent/expired.
    async fn get(&self, key: &str) -> Option<String>;

    /// Set `key` to `value` with the given expiry, unconditionally.
    async fn set(&self, key: &str, value: &str, ttl: Duration);

    /// Set `key` to `value` with the given expiry only if it is
    /// currently absent/expired. Returns `true` if the set happened.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> bool;

    /// Delete `key`, if present.
    async fn delete(&self, key: &str);
}

struct Entry {
    value: String,
    expires_at: Instant,
}

/// An in-process `SharedStore` backed by a mutex-guarded hash map.
///
/// Strictly per-process: in a multi-process deployment each process
/// sees its own counters, so limits overshoot by a factor equal to the
/// process count — the Design Notes call this out explicitly as the
/// accepted behavior of the fallback path.
#[derive(Default)]
pub struct LocalSharedStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl LocalSharedStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn live_entries(&self) -> parking_lot::MutexGuard<'_, HashMap<String, Entry>> {
        let mut guard = self.entries.lock();
        let now = Instant::now();
        guard.retain(|_, e| e.expires_at > now);
        guard
    }
}

#[async_trait]
impl SharedStore for LocalSharedStore {
    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> u64 {
        let mut entries = self.live_entries();
        match entries.get_mut(key) {
            Some(entry) => {
                let next: u64 = entry.value.parse().unwrap_or(0) + 1;
                entry.value = next.to_string();
                next
            }
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: "1".to_string(),
                        expires_at: Instant::now() + ttl,
                    },
                );
                1
            }
        }
    }

    async fn get(&self, key: &str) -> Option<String> {
        self.live_entries().get(key).map(|e| e.value.clone())
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) {
        self.live_entries().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> bool {
        let mut entries = self.live_entries();
        if entries.contains_key(key) {
            return false;
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        true
    }

    async fn delete(&self, key: &str) {
        self.live_entries().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn incr_starts_at_one_and_accumulates() {
        let store = LocalSharedStore::new();
        assert_eq!(store.incr_with_expiry("k", Duration::from_secs(60)).await, 1);
        assert_eq!(store.incr_with_expiry("k", Duration::from_secs(60)).await, 2);
        assert_eq!(store.incr_with_expiry("k", Duration::from_secs(60)).await, 3);
    }

    #[tokio::test]
    async fn entries_expire() {
        let store = LocalSharedStore::new();
        store.set("k", "v", Duration::from_millis(10)).await;
        assert_eq!(store.get("k").await, Some("v".to_string()));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.get("k").await, None);
    }

    #[tokio::test]
    async fn set_if_absent_only_sets_once() {
        let store = LocalSharedStore::new();
        assert!(store.set_if_absent("k", "first", Duration::from_secs(60)).await);
        assert!(!store.set_if_absent("k", "second", Duration::from_secs(60)).await);
        assert_eq!(store.get("k").await, Some("first".to_string()));
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let store = LocalSharedStore::new();
        store.set("k", "v", Duration::from_secs(60)).await;
        store.delete("k").await;
        assert_eq!(store.get("k").await, None);
    }
}
