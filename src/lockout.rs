//! Login Lock-out (C6): counts admin login failures per
//! `(username, ip)` and locks the pair out after a threshold.
//!
//! Built on the same `SharedStore` trait as C5 (two keys per pair: an
//! attempt counter, and a lock flag, both expiring after the lock
//! window).

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};
use crate::shared_store::SharedStore;

pub struct LoginLockout {
    store: Arc<dyn SharedStore>,
    max_attempts: u32,
    lock_window: Duration,
}

impl LoginLockout {
    #[must_use]
    pub fn new(store: Arc<dyn SharedStore>, max_attempts: u32, lock_window_minutes: i64) -> Self {
        Self {
            store,
            max_attempts,
            lock_window: Duration::from_secs((lock_window_minutes.max(0) as u64) * 60),
        }
    }

    /// Check whether `(username, ip)` is currently locked out.
    ///
    /// # Errors
    ///
    /// Returns `Error::AccountLocked` with the remaining whole minutes
    /// until the lock expires if a lock is active.
    pub async fn check_locked(&self, username: &str, ip: Option<&str>) -> Result<()> {
        let lock_key = self.lock_key(username, ip);
        if let Some(expires_at) = self.store.get(&lock_key).await {
            let expires_at: u64 = expires_at.parse().unwrap_or(0);
            let now = unix_now();
            if expires_at > now {
                let remaining_secs = expires_at - now;
                let minutes = remaining_secs.div_ceil(60);
                #[allow(clippy::cast_possible_wrap)]
                return Err(Error::AccountLocked {
                    minutes: minutes as i64,
                });
            }
        }
        Ok(())
    }

    /// Record a failed login attempt. If this failure reaches
    /// `max_attempts`, clears the attempt counter and sets the lock.
    pub async fn record_failure(&self, username: &str, ip: Option<&str>) {
        let attempt_key = self.attempt_key(username, ip);
        let count = self
            .store
            .incr_with_expiry(&attempt_key, self.lock_window)
            .await;

        if count >= u64::from(self.max_attempts) {
            self.store.delete(&attempt_key).await;
            let lock_key = self.lock_key(username, ip);
            let expires_at = unix_now() + self.lock_window.as_secs();
            self.store
                .set(&lock_key, &expires_at.to_string(), self.lock_window)
                .await;
        }
    }

    /// Clear both the attempt counter and any active lock, called on
    /// successful authentication.
    pub async fn clear(&self, username: &str, ip: Option<&str>) {
        self.store.delete(&self.attempt_key(username, ip)).await;
        self.store.delete(&self.lock_key(username, ip)).await;
    }

    fn attempt_key(&self, username: &str, ip: Option<&str>) -> String {
        format!(
            "lockout:attempts:{}:{}",
            username.to_lowercase(),
            ip.unwrap_or("unknown")
        )
    }

    fn lock_key(&self, username: &str, ip: Option<&str>) -> String {
        format!(
            "lockout:locked:{}:{}",
            username.to_lowercase(),
            ip.unwrap_or("unknown")
        )
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
