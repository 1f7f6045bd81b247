//! Data-model entities.
//!
//! These are design-level types shared by every component; the
//! relational schema that actually persists them is an external
//! collaborator (`spec.md` §1) — only the in-memory reference
//! repositories in this crate construct and mutate them directly.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type CredentialId = i64;
pub type MailboxId = i64;
pub type GroupId = i64;
pub type AdminId = i64;
pub type ApiCallId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    Active,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MailboxStatus {
    Active,
    Error,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchStrategy {
    GraphFirst,
    ImapFirst,
    GraphOnly,
    ImapOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdminRole {
    SuperAdmin,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdminStatus {
    Active,
    Disabled,
}

/// Identity used by external callers of the `/api` surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub id: CredentialId,
    pub display_name: String,
    /// First 7 characters of the raw secret, kept for UI display only.
    pub prefix: String,
    /// SHA-256 digest of the raw secret. Unique, never reversible.
    pub secret_digest: String,
    pub rate_per_minute: u32,
    pub lifecycle_state: LifecycleState,
    pub expires_at: Option<DateTime<Utc>>,
    pub permission_map: Option<HashMap<String, bool>>,
    pub allowed_group_ids: Option<Vec<GroupId>>,
    pub allowed_email_ids: Option<Vec<MailboxId>>,
    pub usage_count: u64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_by: String,
}

/// A real mailbox the gateway can fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mailbox {
    pub id: MailboxId,
    pub address: String,
    pub oauth_client_id: String,
    /// Sealed by the Secret Box (C1); opaque outside it.
    pub refresh_token_cipher: String,
    pub password_cipher: Option<String>,
    pub status: MailboxStatus,
    pub group_id: Option<GroupId>,
    pub last_check_at: Option<DateTime<Utc>>,
    pub last_error_message: Option<String>,
}

/// Logical bucket of mailboxes with a fetch-strategy hint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailboxGroup {
    pub id: GroupId,
    pub name: String,
    pub description: Option<String>,
    pub fetch_strategy: FetchStrategy,
}

/// A claim that a `(credential, mailbox)` pair has been handed out.
///
/// Primary key is `(credential_id, mailbox_id)`; at most one row per
/// pair exists at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolAssignment {
    pub credential_id: CredentialId,
    pub mailbox_id: MailboxId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminAccount {
    pub id: AdminId,
    pub username: String,
    pub password_digest: String,
    pub email: Option<String>,
    pub role: AdminRole,
    pub status: AdminStatus,
    pub two_factor_enabled: bool,
    pub two_factor_secret_cipher: Option<String>,
    pub two_factor_pending_secret_cipher: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_login_ip: Option<String>,
}

/// Append-only log of external-API invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCallRecord {
    pub id: ApiCallId,
    pub action: String,
    pub credential_id: Option<CredentialId>,
    pub mailbox_id: Option<MailboxId>,
    pub client_ip: String,
    pub http_status: u16,
    pub elapsed_ms: u64,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A single fetched message, projected uniformly whether it came back
/// via Graph or IMAP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub from: Option<String>,
    pub subject: Option<String>,
    pub text: Option<String>,
    pub html: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

/// Which transport produced a set of fetched messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchMethod {
    #[serde(rename = "graph_api")]
    GraphApi,
    #[serde(rename = "imap")]
    Imap,
}
