//! OAuth Token Broker (C10): refresh-token → access-token exchange
//! with scope-aware caching.
//!
//! `trait TokenExchanger` abstracts the HTTPS POST to Microsoft's
//! token endpoint behind a `reqwest`-backed production implementation
//! and a `MockTokenExchanger` used by tests and by the orchestrator's
//! own unit tests. The two-key cache (`graph_token:{address}` /
//! `imap_token:{address}`) lives on top of the same `SharedStore`
//! trait as C5/C6.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::warn;

use crate::error::Result;
use crate::model::Mailbox;
use crate::proxy::ProxyConfig;
use crate::shared_store::SharedStore;

const TOKEN_ENDPOINT: &str = "https://login.microsoftonline.com/consumers/oauth2/v2.0/token";
const GRAPH_MAIL_READ_SCOPE: &str = "https://graph.microsoft.com/Mail.Read";

#[derive(Debug, Clone)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: u64,
    pub scope: Option<String>,
}

#[derive(Deserialize)]
struct RawTokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    scope: Option<String>,
}

/// Abstracts the HTTPS refresh-token exchange against Microsoft's
/// token endpoint.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    /// Exchange `refresh_token` for an access token. `scope` is `None`
    /// for the scopeless (IMAP) exchange. Returns `Ok(None)` rather
    /// than an error on any non-2xx response or a missing
    /// `access_token` field — callers degrade on `None` rather than
    /// propagating an upstream failure.
    async fn exchange(
        &self,
        refresh_token: &str,
        client_id: &str,
        scope: Option<&str>,
        proxy: Option<&ProxyConfig>,
    ) -> Result<Option<TokenResponse>>;
}

pub struct HttpTokenExchanger;

impl Default for HttpTokenExchanger {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTokenExchanger {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TokenExchanger for HttpTokenExchanger {
    async fn exchange(
        &self,
        refresh_token: &str,
        client_id: &str,
        scope: Option<&str>,
        proxy: Option<&ProxyConfig>,
    ) -> Result<Option<TokenResponse>> {
        let client = crate::proxy::build_client(proxy)?;

        let mut form: HashMap<&str, &str> = HashMap::new();
        form.insert("grant_type", "refresh_token");
        form.insert("refresh_token", refresh_token);
        form.insert("client_id", client_id);
        if let Some(scope) = scope {
            form.insert("scope", scope);
        }

        let response = match client.post(TOKEN_ENDPOINT).form(&form).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("token exchange request failed: {e}");
                return Ok(None);
            }
        };

        if !response.status().is_success() {
            warn!("token exchange returned status {}", response.status());
            return Ok(None);
        }

        let Ok(parsed) = response.json::<RawTokenResponse>().await else {
            return Ok(None);
        };

        let Some(access_token) = parsed.access_token else {
            return Ok(None);
        };

        Ok(Some(TokenResponse {
            access_token,
            expires_in: parsed.expires_in.unwrap_or(3600),
            scope: parsed.scope,
        }))
    }
}

/// Canned-response exchanger used in tests.
#[derive(Default)]
pub struct MockTokenExchanger {
    /// Keyed by whether `scope` was `Some` ("graph") or `None` ("imap").
    pub responses: Mutex<HashMap<&'static str, Option<TokenResponse>>>,
}

impl MockTokenExchanger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_graph_response(&self, response: Option<TokenResponse>) {
        self.responses.lock().insert("graph", response);
    }

    pub fn set_imap_response(&self, response: Option<TokenResponse>) {
        self.responses.lock().insert("imap", response);
    }
}

#[async_trait]
impl TokenExchanger for MockTokenExchanger {
    async fn exchange(
        &self,
        _refresh_token: &str,
        _client_id: &str,
        scope: Option<&str>,
        _proxy: Option<&ProxyConfig>,
    ) -> Result<Option<TokenResponse>> {
        let key = if scope.is_some() { "graph" } else { "imap" };
        Ok(self.responses.lock().get(key).cloned().flatten())
    }
}

pub struct OAuthBroker {
    exchanger: Arc<dyn TokenExchanger>,
    store: Arc<dyn SharedStore>,
}

impl OAuthBroker {
    #[must_use]
    pub const fn new(exchanger: Arc<dyn TokenExchanger>, store: Arc<dyn SharedStore>) -> Self {
        Self { exchanger, store }
    }

    /// Obtain a Graph-scoped access token for `mailbox`, consulting
    /// the `graph_token:{address}` cache first. Only a response whose
    /// `scope` string contains `Mail.Read` is cached or returned.
    ///
    /// # Errors
    ///
    /// Propagates any error from decrypting the mailbox's refresh
    /// token.
    pub async fn get_graph_token(
        &self,
        mailbox: &Mailbox,
        refresh_token: &str,
        proxy: Option<&ProxyConfig>,
    ) -> Result<Option<String>> {
        let cache_key = format!("graph_token:{}", mailbox.address);
        if let Some(cached) = self.store.get(&cache_key).await {
            return Ok(Some(cached));
        }

        let Some(resp) = self
            .exchanger
            .exchange(
                refresh_token,
                &mailbox.oauth_client_id,
                Some(GRAPH_MAIL_READ_SCOPE),
                proxy,
            )
            .await?
        else {
            return Ok(None);
        };

        let has_mail_read = resp
            .scope
            .as_deref()
            .is_some_and(|s| s.contains("Mail.Read"));
        if !has_mail_read {
            return Ok(None);
        }

        let ttl = Duration::from_secs(resp.expires_in.saturating_sub(60));
        self.store.set(&cache_key, &resp.access_token, ttl).await;
        Ok(Some(resp.access_token))
    }

    /// Obtain a scopeless (IMAP) access token for `mailbox`,
    /// consulting the `imap_token:{address}` cache first.
    ///
    /// # Errors
    ///
    /// Propagates any error from decrypting the mailbox's refresh
    /// token.
    pub async fn get_imap_token(
        &self,
        mailbox: &Mailbox,
        refresh_token: &str,
        proxy: Option<&ProxyConfig>,
    ) -> Result<Option<String>> {
        let cache_key = format!("imap_token:{}", mailbox.address);
        if let Some(cached) = self.store.get(&cache_key).await {
            return Ok(Some(cached));
        }

        let Some(resp) = self
            .exchanger
            .exchange(refresh_token, &mailbox.oauth_client_id, None, proxy)
            .await?
        else {
            return Ok(None);
        };

        let ttl = Duration::from_secs(resp.expires_in.saturating_sub(60));
        self.store.set(&cache_key, &resp.access_token, ttl).await;
        Ok(Some(resp.access_token))
    }
}
