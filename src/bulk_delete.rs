//! Bulk Deleter (C14): bounded-concurrency deletion with progress
//! reporting.
//!
//! Grounded on the `buffer_unordered` fan-out pattern used for
//! attachment transfer throughout the pack (e.g.
//! `nullspace-client/src/attachments.rs`); individual item failures
//! here are swallowed rather than propagated with `try_collect`,
//! since a single bad message id must not abort the rest of the
//! batch.

use std::future::Future;
use std::pin::Pin;

use futures::stream::{self, StreamExt};
use tracing::warn;

/// Fixed fan-out for a single `clear()` batch. `spec.md` §4.14 calls
/// for 10 concurrent deletions.
const DELETE_CONCURRENCY: usize = 10;

/// Result of running a batch of deletions: how many succeeded versus
/// the full input count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteProgress {
    pub attempted: usize,
    pub deleted: usize,
}

/// Run `delete_fn(id)` for every id in `ids` with at most
/// `DELETE_CONCURRENCY` in flight at once. Failures are logged and
/// excluded from the success count; they never abort the batch.
pub async fn delete_all<F>(ids: Vec<String>, delete_fn: F) -> DeleteProgress
where
    F: for<'a> Fn(&'a str) -> Pin<Box<dyn Future<Output = Result<(), crate::error::Error>> + Send + 'a>>
        + Send
        + Sync,
{
    let attempted = ids.len();
    let deleted = stream::iter(ids.iter())
        .map(|id| delete_fn(id))
        .buffer_unordered(DELETE_CONCURRENCY)
        .fold(0usize, |count, result| async move {
            match result {
                Ok(()) => count + 1,
                Err(e) => {
                    warn!("bulk delete failed for one message: {e}");
                    count
                }
            }
        })
        .await;

    DeleteProgress { attempted, deleted }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::error::Error;

    #[tokio::test]
    async fn all_succeed_reports_full_progress() {
        let ids = vec!["1".to_string(), "2".to_string(), "3".to_string()];
        let progress = delete_all(ids, |_id| Box::pin(async { Ok(()) })).await;
        assert_eq!(progress, DeleteProgress { attempted: 3, deleted: 3 });
    }

    #[tokio::test]
    async fn individual_failures_do_not_abort_the_batch() {
        let ids = vec!["good-1".to_string(), "bad".to_string(), "good-2".to_string()];
        let progress = delete_all(ids, |id| {
            let id = id.to_string();
            Box::pin(async move {
                if id == "bad" {
                    Err(Error::GraphApiFailed("boom".to_string()))
                } else {
                    Ok(())
                }
            })
        })
        .await;
        assert_eq!(progress.attempted, 3);
        assert_eq!(progress.deleted, 2);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_observed = Arc::new(AtomicUsize::new(0));
        let ids: Vec<String> = (0..25).map(|i| i.to_string()).collect();

        let in_flight_for_closure = in_flight.clone();
        let max_for_closure = max_observed.clone();
        let progress = delete_all(ids, move |_id| {
            let in_flight = in_flight_for_closure.clone();
            let max_observed = max_for_closure.clone();
            Box::pin(async move {
                let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_observed.fetch_max(current, Ordering::SeqCst);
                tokio::task::yield_now().await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            })
        })
        .await;

        assert_eq!(progress.deleted, 25);
        assert!(max_observed.load(Ordering::SeqCst) <= DELETE_CONCURRENCY);
    }
}
