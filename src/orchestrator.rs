//! Mail Orchestrator (C13): Graph-first/IMAP-fallback fetch strategy,
//! plus bulk-clear paging.
//!
//! Wires together the OAuth Token Broker (C10), Graph Mail Client
//! (C11), IMAP Mail Client (C12), and Bulk Deleter (C14) behind the
//! single `fetch`/`clear` entry points `spec.md` §4.13 describes.
//! `trait MailboxStatusRepo` is the persistence boundary for the
//! `last_check_at`/`last_error_message`/`status` write-back, kept
//! separate from `PoolRepo` (C9) since the two are mutated by
//! different actors on different cadences.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::bulk_delete::delete_all;
use crate::error::{Error, Result};
use crate::graph::GraphTransport;
use crate::imap::ImapTransport;
use crate::model::{FetchMethod, FetchStrategy, Mailbox, MailboxId, MailboxStatus, Message};
use crate::oauth::OAuthBroker;
use crate::proxy::ProxyConfig;
use crate::secret_box::SecretBox;

/// Graph lists at most 500 messages per page; `clear` pages up to 10
/// times before giving up, per `spec.md` §4.13.
const CLEAR_PAGE_SIZE: usize = 500;
const CLEAR_MAX_PAGES: usize = 10;

/// Upper bound on a single `fetch`/`clear` call, covering every
/// suspension point inside it (token exchange, transport round trips,
/// per-page deletes) rather than just the initial connect. An inbound
/// request that outlives this is treated as failed, not hung.
const OPERATION_TIMEOUT: Duration = Duration::from_secs(60);

#[async_trait]
pub trait MailboxStatusRepo: Send + Sync {
    /// Persist the outcome of a fetch/clear attempt against `mailbox_id`.
    async fn update_status(
        &self,
        mailbox_id: MailboxId,
        status: MailboxStatus,
        error_message: Option<String>,
    ) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub messages: Vec<Message>,
    pub method: FetchMethod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearStatus {
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct ClearOutcome {
    pub deleted_count: usize,
    pub status: ClearStatus,
}

#[derive(Debug, Clone, Copy)]
pub struct FetchParams<'a> {
    pub folder: &'a str,
    pub limit: usize,
    pub proxy: Option<&'a ProxyConfig>,
}

pub struct MailOrchestrator {
    status_repo: Arc<dyn MailboxStatusRepo>,
    secret_box: Arc<SecretBox>,
    oauth: Arc<OAuthBroker>,
    graph: Arc<dyn GraphTransport>,
    imap: Arc<dyn ImapTransport>,
}

impl MailOrchestrator {
    #[must_use]
    pub const fn new(
        status_repo: Arc<dyn MailboxStatusRepo>,
        secret_box: Arc<SecretBox>,
        oauth: Arc<OAuthBroker>,
        graph: Arc<dyn GraphTransport>,
        imap: Arc<dyn ImapTransport>,
    ) -> Self {
        Self {
            status_repo,
            secret_box,
            oauth,
            graph,
            imap,
        }
    }

    /// Fetch messages for `mailbox` per `strategy`'s Graph/IMAP
    /// ordering. Updates `last_check_at`/`last_error_message`/`status`
    /// on every exit path.
    ///
    /// `cancel` is checked before the call starts and raced against the
    /// whole operation, so a caller whose inbound request was dropped
    /// doesn't have to wait out `OPERATION_TIMEOUT` to find out.
    ///
    /// # Errors
    ///
    /// Returns `Error::ImapTokenFailed` if the scopeless IMAP exchange
    /// yields no token, `Error::Internal` if `cancel` fires or the call
    /// exceeds `OPERATION_TIMEOUT`, or propagates the last transport's
    /// error when every attempted path fails.
    pub async fn fetch(
        &self,
        mailbox: &Mailbox,
        strategy: FetchStrategy,
        params: FetchParams<'_>,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome> {
        if cancel.is_cancelled() {
            return Err(Error::Internal("request cancelled".to_string()));
        }
        let result = tokio::select! {
            r = tokio::time::timeout(OPERATION_TIMEOUT, self.fetch_inner(mailbox, strategy, params)) => {
                r.map_err(|_| Error::Internal("fetch timed out".to_string())).and_then(|r| r)
            }
            () = cancel.cancelled() => Err(Error::Internal("request cancelled".to_string())),
        };
        match &result {
            Ok(_) => {
                self.status_repo
                    .update_status(mailbox.id, MailboxStatus::Active, None)
                    .await?;
            }
            Err(e) => {
                self.status_repo
                    .update_status(mailbox.id, MailboxStatus::Error, Some(e.to_string()))
                    .await?;
            }
        }
        result
    }

    async fn fetch_inner(
        &self,
        mailbox: &Mailbox,
        strategy: FetchStrategy,
        params: FetchParams<'_>,
    ) -> Result<FetchOutcome> {
        let refresh_token = self.secret_box.decrypt_str(&mailbox.refresh_token_cipher)?;

        match strategy {
            FetchStrategy::GraphOnly => self.fetch_via_graph(mailbox, &refresh_token, params).await,
            FetchStrategy::ImapOnly => self.fetch_via_imap(mailbox, &refresh_token, params).await,
            FetchStrategy::GraphFirst => {
                match self.fetch_via_graph(mailbox, &refresh_token, params).await {
                    Ok(outcome) => Ok(outcome),
                    Err(e) => {
                        warn!("graph fetch failed for {}, falling back to imap: {e}", mailbox.address);
                        self.fetch_via_imap(mailbox, &refresh_token, params).await
                    }
                }
            }
            FetchStrategy::ImapFirst => {
                match self.fetch_via_imap(mailbox, &refresh_token, params).await {
                    Ok(outcome) => Ok(outcome),
                    Err(e) => {
                        warn!("imap fetch failed for {}, falling back to graph: {e}", mailbox.address);
                        self.fetch_via_graph(mailbox, &refresh_token, params).await
                    }
                }
            }
        }
    }

    async fn fetch_via_graph(
        &self,
        mailbox: &Mailbox,
        refresh_token: &str,
        params: FetchParams<'_>,
    ) -> Result<FetchOutcome> {
        let Some(token) = self
            .oauth
            .get_graph_token(mailbox, refresh_token, params.proxy)
            .await?
        else {
            return Err(Error::GraphApiFailed(
                "no mail.read-scoped token available".to_string(),
            ));
        };

        let messages = self
            .graph
            .list(&token, params.folder, params.limit, params.proxy)
            .await?;
        Ok(FetchOutcome {
            messages,
            method: FetchMethod::GraphApi,
        })
    }

    async fn fetch_via_imap(
        &self,
        mailbox: &Mailbox,
        refresh_token: &str,
        params: FetchParams<'_>,
    ) -> Result<FetchOutcome> {
        let Some(access_token) = self
            .oauth
            .get_imap_token(mailbox, refresh_token, params.proxy)
            .await?
        else {
            return Err(Error::ImapTokenFailed);
        };

        let imap_folder = crate::imap::folder_alias(params.folder);
        let config = crate::config::ImapConfig {
            host: "outlook.office365.com".to_string(),
            port: 993,
            address: mailbox.address.clone(),
            access_token,
        };
        let messages = self
            .imap
            .fetch_recent(&config, imap_folder, params.limit)
            .await?;
        Ok(FetchOutcome {
            messages,
            method: FetchMethod::Imap,
        })
    }

    /// Page through Graph deleting everything in `folder`, up to
    /// `CLEAR_MAX_PAGES` pages of `CLEAR_PAGE_SIZE`, deleting each
    /// page with C14's bounded concurrency.
    ///
    /// # Errors
    ///
    /// Returns `Error::GraphApiFailed` if no Graph token is available
    /// at all; `Error::Internal` if `cancel` fires or the call exceeds
    /// `OPERATION_TIMEOUT`; per-message delete failures are absorbed
    /// into `deleted_count` rather than propagated.
    pub async fn clear(
        &self,
        mailbox: &Mailbox,
        folder: &str,
        proxy: Option<&ProxyConfig>,
        cancel: &CancellationToken,
    ) -> Result<ClearOutcome> {
        if cancel.is_cancelled() {
            return Err(Error::Internal("request cancelled".to_string()));
        }
        let refresh_token = self.secret_box.decrypt_str(&mailbox.refresh_token_cipher)?;
        let result = tokio::select! {
            r = tokio::time::timeout(OPERATION_TIMEOUT, self.clear_inner(mailbox, folder, proxy, &refresh_token)) => {
                r.map_err(|_| Error::Internal("clear timed out".to_string())).and_then(|r| r)
            }
            () = cancel.cancelled() => Err(Error::Internal("request cancelled".to_string())),
        };
        match &result {
            Ok(_) => {
                self.status_repo
                    .update_status(mailbox.id, MailboxStatus::Active, None)
                    .await?;
            }
            Err(e) => {
                self.status_repo
                    .update_status(mailbox.id, MailboxStatus::Error, Some(e.to_string()))
                    .await?;
            }
        }
        result
    }

    async fn clear_inner(
        &self,
        mailbox: &Mailbox,
        folder: &str,
        proxy: Option<&ProxyConfig>,
        refresh_token: &str,
    ) -> Result<ClearOutcome> {
        let Some(token) = self.oauth.get_graph_token(mailbox, refresh_token, proxy).await? else {
            return Err(Error::GraphApiFailed("no mail.read-scoped token available".to_string()));
        };

        let mut deleted_count = 0usize;
        for _page in 0..CLEAR_MAX_PAGES {
            let messages = self.graph.list(&token, folder, CLEAR_PAGE_SIZE, proxy).await?;
            if messages.is_empty() {
                break;
            }

            let ids: Vec<String> = messages.into_iter().map(|m| m.id).collect();
            let page_len = ids.len();
            let graph = self.graph.clone();
            let token_owned = token.clone();
            let proxy_owned = proxy.cloned();
            let progress = delete_all(ids, move |id| {
                let graph = graph.clone();
                let token = token_owned.clone();
                let proxy = proxy_owned.clone();
                let id = id.to_string();
                Box::pin(async move { graph.delete(&token, &id, proxy.as_ref()).await })
            })
            .await;

            deleted_count += progress.deleted;
            if page_len < CLEAR_PAGE_SIZE {
                break;
            }
        }

        Ok(ClearOutcome {
            deleted_count,
            status: ClearStatus::Success,
        })
    }
}
