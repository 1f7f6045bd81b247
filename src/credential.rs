//! Credential Identifier (C17): resolves inbound API-key material to
//! a `Credential` record, enforces lifecycle/expiry/rate limits, and
//! records usage.
//!
//! `extract_api_key` is a pure function over raw header/query
//! material (mirrors the header-priority extraction the Admin
//! Authenticator (C18) does for session tokens); `CredentialRepo` is
//! the persistence boundary, alongside a `MemCredentialRepo`
//! reference implementation in the style of `pool.rs`'s
//! `MemPoolRepo`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::model::{Credential, CredentialId, LifecycleState};
use crate::rate_limit::RateLimiter;

/// Material an inbound request carried, in the priority order C17
/// extracts from.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiKeySources<'a> {
    pub header: Option<&'a str>,
    pub bearer: Option<&'a str>,
    pub query: Option<&'a str>,
}

/// Extract the raw API key from `sources` in priority order:
/// `X-API-Key` header, then `Authorization: Bearer sk_...`, then the
/// `api_key` query parameter.
#[must_use]
pub fn extract_api_key(sources: ApiKeySources<'_>) -> Option<String> {
    if let Some(header) = sources.header {
        if !header.is_empty() {
            return Some(header.to_string());
        }
    }
    if let Some(bearer) = sources.bearer {
        let trimmed = bearer.strip_prefix("Bearer ").unwrap_or(bearer);
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }
    if let Some(query) = sources.query {
        if !query.is_empty() {
            return Some(query.to_string());
        }
    }
    None
}

/// SHA-256 hex digest of a raw API key, used as `Credential.secret_digest`.
#[must_use]
pub fn digest(raw_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_key.as_bytes());
    let out: [u8; 32] = hasher.finalize().into();
    out.iter().map(|b| format!("{b:02x}")).collect()
}

#[async_trait]
pub trait CredentialRepo: Send + Sync {
    /// Look up a credential by its secret digest.
    async fn find_by_digest(&self, digest: &str) -> Result<Option<Credential>>;

    /// Increment `usage_count` and set `last_used_at` to now.
    async fn record_usage(&self, credential_id: CredentialId) -> Result<()>;
}

pub struct CredentialIdentifier {
    repo: Arc<dyn CredentialRepo>,
    rate_limiter: Arc<RateLimiter>,
}

impl CredentialIdentifier {
    #[must_use]
    pub const fn new(repo: Arc<dyn CredentialRepo>, rate_limiter: Arc<RateLimiter>) -> Self {
        Self { repo, rate_limiter }
    }

    /// Resolve `sources` to a `Credential`, enforcing lifecycle,
    /// expiry, and rate limit, and recording usage on success.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidApiKey` if no key material is present or no
    ///   credential matches its digest.
    /// - `Error::ApiKeyDisabled` if the credential's lifecycle state
    ///   is not `Active`.
    /// - `Error::ApiKeyExpired` if `expires_at` is in the past.
    /// - `Error::RateLimitExceeded` if C5 trips.
    pub async fn identify(&self, sources: ApiKeySources<'_>) -> Result<Credential> {
        let raw_key = extract_api_key(sources).ok_or(Error::InvalidApiKey)?;
        let digest = digest(&raw_key);

        let credential = self
            .repo
            .find_by_digest(&digest)
            .await?
            .ok_or(Error::InvalidApiKey)?;

        if credential.lifecycle_state != LifecycleState::Active {
            return Err(Error::ApiKeyDisabled);
        }

        if let Some(expires_at) = credential.expires_at {
            if expires_at < Utc::now() {
                return Err(Error::ApiKeyExpired);
            }
        }

        self.rate_limiter
            .check(credential.id, credential.rate_per_minute)
            .await?;

        self.repo.record_usage(credential.id).await?;

        Ok(credential)
    }
}

/// In-memory reference `CredentialRepo`, keyed the way the real
/// schema's unique `secret_digest` column would be.
#[derive(Default)]
pub struct MemCredentialRepo {
    credentials: Mutex<Vec<Credential>>,
}

impl MemCredentialRepo {
    #[must_use]
    pub fn new(credentials: Vec<Credential>) -> Self {
        Self {
            credentials: Mutex::new(credentials),
        }
    }
}

#[async_trait]
impl CredentialRepo for MemCredentialRepo {
    async fn find_by_digest(&self, digest: &str) -> Result<Option<Credential>> {
        Ok(self
            .credentials
            .lock()
            .iter()
            .find(|c| c.secret_digest == digest)
            .cloned())
    }

    async fn record_usage(&self, credential_id: CredentialId) -> Result<()> {
        let mut credentials = self.credentials.lock();
        if let Some(c) = credentials.iter_mut().find(|c| c.id == credential_id) {
            c.usage_count += 1;
            c.last_used_at = Some(Utc::now());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared_store::LocalSharedStore;
    use chrono::Duration;

    fn credential(raw_key: &str) -> Credential {
        Credential {
            id: 1,
            display_name: "test".into(),
            prefix: raw_key.chars().take(7).collect(),
            secret_digest: digest(raw_key),
            rate_per_minute: 60,
            lifecycle_state: LifecycleState::Active,
            expires_at: None,
            permission_map: None,
            allowed_group_ids: None,
            allowed_email_ids: None,
            usage_count: 0,
            last_used_at: None,
            created_by: "admin".into(),
        }
    }

    fn identifier(credentials: Vec<Credential>) -> CredentialIdentifier {
        let repo = Arc::new(MemCredentialRepo::new(credentials));
        let limiter = Arc::new(RateLimiter::new(Arc::new(LocalSharedStore::new())));
        CredentialIdentifier::new(repo, limiter)
    }

    #[test]
    fn header_takes_priority_over_bearer_and_query() {
        let sources = ApiKeySources {
            header: Some("from-header"),
            bearer: Some("Bearer from-bearer"),
            query: Some("from-query"),
        };
        assert_eq!(extract_api_key(sources).as_deref(), Some("from-header"));
    }

    #[test]
    fn bearer_prefix_is_stripped() {
        let sources = ApiKeySources {
            header: None,
            bearer: Some("Bearer sk_abc123"),
            query: None,
        };
        assert_eq!(extract_api_key(sources).as_deref(), Some("sk_abc123"));
    }

    #[test]
    fn falls_back_to_query_param() {
        let sources = ApiKeySources {
            header: None,
            bearer: None,
            query: Some("sk_xyz"),
        };
        assert_eq!(extract_api_key(sources).as_deref(), Some("sk_xyz"));
    }

    #[test]
    fn no_material_yields_none() {
        assert!(extract_api_key(ApiKeySources::default()).is_none());
    }

    #[tokio::test]
    async fn valid_key_resolves_and_records_usage() {
        let identifier = identifier(vec![credential("sk_live_1")]);
        let sources = ApiKeySources {
            header: Some("sk_live_1"),
            bearer: None,
            query: None,
        };
        let credential = identifier.identify(sources).await.unwrap();
        assert_eq!(credential.id, 1);
    }

    #[tokio::test]
    async fn unknown_key_is_invalid() {
        let identifier = identifier(vec![]);
        let sources = ApiKeySources {
            header: Some("sk_unknown"),
            bearer: None,
            query: None,
        };
        assert!(matches!(
            identifier.identify(sources).await,
            Err(Error::InvalidApiKey)
        ));
    }

    #[tokio::test]
    async fn disabled_credential_is_rejected() {
        let mut c = credential("sk_live_2");
        c.lifecycle_state = LifecycleState::Disabled;
        let identifier = identifier(vec![c]);
        let sources = ApiKeySources {
            header: Some("sk_live_2"),
            bearer: None,
            query: None,
        };
        assert!(matches!(
            identifier.identify(sources).await,
            Err(Error::ApiKeyDisabled)
        ));
    }

    #[tokio::test]
    async fn expired_credential_is_rejected() {
        let mut c = credential("sk_live_3");
        c.expires_at = Some(Utc::now() - Duration::hours(1));
        let identifier = identifier(vec![c]);
        let sources = ApiKeySources {
            header: Some("sk_live_3"),
            bearer: None,
            query: None,
        };
        assert!(matches!(
            identifier.identify(sources).await,
            Err(Error::ApiKeyExpired)
        ));
    }

    #[tokio::test]
    async fn rate_limit_trips_after_threshold() {
        let mut c = credential("sk_live_4");
        c.rate_per_minute = 1;
        let identifier = identifier(vec![c]);
        let sources = ApiKeySources {
            header: Some("sk_live_4"),
            bearer: None,
            query: None,
        };
        assert!(identifier.identify(sources).await.is_ok());
        assert!(matches!(
            identifier.identify(sources).await,
            Err(Error::RateLimitExceeded)
        ));
    }
}
