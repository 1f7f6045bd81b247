#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! Multi-tenant mail-fetching gateway core.
//!
//! Internal clients present an API credential and either draw a
//! fresh mailbox address from a shared pool or fetch/clear messages
//! for a named address. This crate hides the OAuth2 refresh-token
//! dance, falls back between Microsoft Graph and IMAP/XOAUTH2,
//! enforces per-credential quotas and scopes, and keeps exactly-once
//! allocation records so a mailbox is never handed to the same
//! credential twice.
//!
//! The HTTP routing layer, the relational persistence driver, and the
//! admin console are external collaborators; this crate ships only
//! the core components plus in-memory reference repositories used by
//! its own tests.

mod admin_auth;
mod bulk_delete;
mod config;
mod credential;
mod error;
mod graph;
mod imap;
mod jwt;
mod lockout;
mod model;
mod oauth;
mod orchestrator;
mod password;
mod permission;
mod pool;
mod proxy;
mod rate_limit;
mod request_log;
mod retention;
mod scope;
mod secret_box;
mod shared_store;
mod totp;

pub use admin_auth::{AdminAuthenticator, AdminRepo, MemAdminRepo, TokenSources, extract_token};
pub use bulk_delete::{DeleteProgress, delete_all};
pub use config::{GatewayConfig, ImapConfig};
pub use credential::{
    ApiKeySources, CredentialIdentifier, CredentialRepo, MemCredentialRepo, digest, extract_api_key,
};
pub use error::{Error, Result};
pub use graph::{GraphTransport, HttpGraphTransport, MockGraphTransport};
pub use imap::{ImapTransport, MockImapClient, Rfc3501ImapClient};
pub use jwt::{Claims, JwtIssuer};
pub use lockout::LoginLockout;
pub use model::{
    AdminAccount, AdminId, AdminRole, AdminStatus, ApiCallId, ApiCallRecord, Credential,
    CredentialId, FetchMethod, FetchStrategy, GroupId, LifecycleState, Mailbox, MailboxGroup,
    MailboxId, MailboxStatus, Message, PoolAssignment,
};
pub use oauth::{HttpTokenExchanger, MockTokenExchanger, OAuthBroker, TokenExchanger, TokenResponse};
pub use orchestrator::{
    ClearOutcome, ClearStatus, FetchOutcome, FetchParams, MailOrchestrator, MailboxStatusRepo,
};
pub use password as password_hasher;
pub use permission::{is_allowed, normalize as normalize_action};
pub use pool::{MemPoolRepo, PoolAllocator, PoolDiff, PoolRepo, PoolStats};
pub use proxy::{ProxyConfig, build_client};
pub use rate_limit::RateLimiter;
pub use request_log::{
    CallOutcome, MemRequestLogRepo, RequestLogRepo, RequestLogger, synthesize_request_id,
};
pub use retention::{MemRetentionRepo, RetentionJob, RetentionRepo};
pub use scope::ScopeFilter;
pub use secret_box::SecretBox;
pub use shared_store::{LocalSharedStore, SharedStore};
pub use totp as totp_verifier;
