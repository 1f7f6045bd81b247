//! Request Logger (C15): appends one `ApiCallRecord` per terminal
//! external-API response.
//!
//! `synthesize_request_id` follows the `web-{base36(time)}-{6 random
//! chars}` shape `spec.md` §4.15 specifies when no inbound request-id
//! header is present. `RequestLogRepo` is the persistence boundary;
//! logging failures are swallowed (via `tracing::error`) so a logging
//! outage never masks the real response, matching the Design Notes'
//! non-transactional logging guarantee.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rand::Rng;
use serde_json::Value;
use tracing::error;

use crate::error::Result;
use crate::model::{ApiCallId, ApiCallRecord, CredentialId, MailboxId};

const BASE36_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Synthesize a short request id in the shape `web-{base36(time)}-{6
/// random chars}`, used when the inbound request carried none.
#[must_use]
pub fn synthesize_request_id(unix_millis: u64) -> String {
    let time_part = to_base36(unix_millis);
    let mut rng = rand::thread_rng();
    let suffix: String = (0..6)
        .map(|_| {
            let idx = rng.gen_range(0..BASE36_ALPHABET.len());
            BASE36_ALPHABET[idx] as char
        })
        .collect();
    format!("web-{time_part}-{suffix}")
}

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36_ALPHABET[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).expect("base36 alphabet is ascii")
}

#[async_trait]
pub trait RequestLogRepo: Send + Sync {
    async fn insert(&self, record: ApiCallRecord) -> Result<()>;
}

/// One terminal call's observable facts, independent of whether it
/// succeeded.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub action: String,
    pub credential_id: Option<CredentialId>,
    pub mailbox_id: Option<MailboxId>,
    pub client_ip: String,
    pub http_status: u16,
    pub elapsed_ms: u64,
    pub request_id: Option<String>,
}

pub struct RequestLogger {
    repo: Arc<dyn RequestLogRepo>,
}

impl RequestLogger {
    #[must_use]
    pub const fn new(repo: Arc<dyn RequestLogRepo>) -> Self {
        Self { repo }
    }

    /// Record `outcome` as an `ApiCallRecord`, synthesizing a
    /// request-id if the caller supplied none. Swallows insert
    /// failures: they are logged but never returned, so a logging
    /// outage can't mask the real response already sent to the
    /// client.
    pub async fn record(&self, outcome: CallOutcome, unix_millis: u64) {
        let request_id = outcome
            .request_id
            .unwrap_or_else(|| synthesize_request_id(unix_millis));

        let metadata: Value = serde_json::json!({ "request_id": request_id });

        let record = ApiCallRecord {
            id: 0,
            action: outcome.action,
            credential_id: outcome.credential_id,
            mailbox_id: outcome.mailbox_id,
            client_ip: outcome.client_ip,
            http_status: outcome.http_status,
            elapsed_ms: outcome.elapsed_ms,
            metadata,
            created_at: Utc::now(),
        };

        if let Err(e) = self.repo.insert(record).await {
            error!("failed to persist api call record: {e}");
        }
    }
}

/// In-memory reference `RequestLogRepo`, assigning ids from a simple
/// counter the way a real auto-increment primary key would.
#[derive(Default)]
pub struct MemRequestLogRepo {
    records: Mutex<Vec<ApiCallRecord>>,
    next_id: AtomicU64,
}

impl MemRequestLogRepo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn records(&self) -> Vec<ApiCallRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl RequestLogRepo for MemRequestLogRepo {
    async fn insert(&self, mut record: ApiCallRecord) -> Result<()> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        #[allow(clippy::cast_possible_wrap)]
        {
            record.id = id as ApiCallId;
        }
        self.records.lock().push(record);
        Ok(())
    }
}
