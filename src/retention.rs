//! Log Retention Job (C16): periodically deletes `ApiCallRecord` rows
//! older than the configured retention window.
//!
//! A `tokio::time::interval` loop guarded by an `AtomicBool`
//! re-entrancy flag (overlapping ticks are idempotent no-ops per the
//! Design Notes, so a flag rather than a queue is sufficient); the
//! returned `JoinHandle` is aborted on `RetentionJob::drop` so the
//! timer never keeps the process alive past shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::Result;

#[async_trait]
pub trait RetentionRepo: Send + Sync {
    /// Delete records with `created_at < cutoff`. Returns the number
    /// of rows removed.
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// Background handle for the periodic sweep. Aborts its task on drop
/// so the interval timer never keeps the process alive.
pub struct RetentionJob {
    handle: JoinHandle<()>,
}

impl RetentionJob {
    /// Spawn the periodic sweep, running every `interval` and deleting
    /// rows older than `retention_window`.
    #[must_use]
    pub fn spawn(repo: Arc<dyn RetentionRepo>, interval: Duration, retention_window: Duration) -> Self {
        let running = Arc::new(AtomicBool::new(false));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;

                if running
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    warn!("retention sweep still running, skipping this tick");
                    continue;
                }

                let cutoff = Utc::now() - chrono::Duration::from_std(retention_window)
                    .unwrap_or_else(|_| chrono::Duration::days(30));

                match repo.delete_older_than(cutoff).await {
                    Ok(deleted) => info!("retention sweep deleted {deleted} api call records"),
                    Err(e) => warn!("retention sweep failed: {e}"),
                }

                running.store(false, Ordering::SeqCst);
            }
        });

        Self { handle }
    }
}

impl Drop for RetentionJob {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// In-memory reference `RetentionRepo`.
#[derive(Default)]
pub struct MemRetentionRepo {
    records: Mutex<Vec<DateTime<Utc>>>,
}

impl MemRetentionRepo {
    #[must_use]
    pub fn new(records: Vec<DateTime<Utc>>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.records.lock().len()
    }
}

#[async_trait]
impl RetentionRepo for MemRetentionRepo {
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|created_at| *created_at >= cutoff);
        #[allow(clippy::cast_possible_truncation)]
        Ok((before - records.len()) as u64)
    }
}
