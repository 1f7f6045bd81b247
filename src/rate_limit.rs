//! Rate Limiter (C5): per-credential requests/minute enforcement.
//!
//! Built on `SharedStore` (shared in production, `LocalSharedStore` as
//! the in-process fallback per the Design Notes' `RateLimiterBackend`
//! split). The key is `rate:credential:{id}:{minute_bucket}`,
//! incremented atomically with a 60-second expiry set on first
//! increment.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::info;

use crate::error::{Error, Result};
use crate::model::CredentialId;
use crate::shared_store::{LocalSharedStore, SharedStore};

const WINDOW: Duration = Duration::from_secs(60);

pub struct RateLimiter {
    store: Arc<dyn SharedStore>,
}

impl RateLimiter {
    /// Build a limiter around a supplied shared-store backend (the
    /// production path, backed by the external Redis client).
    #[must_use]
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        info!("rate limiter using externally supplied shared-store backend");
        Self { store }
    }

    /// Build a limiter around the in-process fallback. The Design
    /// Notes require the config loader to log which backend is active;
    /// this constructor is the one that logs the fallback choice.
    #[must_use]
    pub fn with_local_fallback() -> Self {
        info!("rate limiter falling back to per-process in-memory backend");
        Self {
            store: Arc::new(LocalSharedStore::new()),
        }
    }

    /// Record one request for `credential_id` and enforce
    /// `limit_per_minute`.
    ///
    /// # Errors
    ///
    /// Returns `Error::RateLimitExceeded` if this request would push
    /// the current minute bucket's count over the limit.
    pub async fn check(&self, credential_id: CredentialId, limit_per_minute: u32) -> Result<()> {
        let bucket = current_minute_bucket();
        let key = format!("rate:credential:{credential_id}:{bucket}");
        let count = self.store.incr_with_expiry(&key, WINDOW).await;

        if count > u64::from(limit_per_minute) {
            return Err(Error::RateLimitExceeded);
        }
        Ok(())
    }
}

fn current_minute_bucket() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        / 60
}
