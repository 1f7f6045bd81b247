//! Graph Mail Client (C11): listing and deletion via Microsoft Graph's
//! HTTPS JSON API.
//!
//! `trait GraphTransport` separates the network call from the pure
//! folder-alias and message-projection logic below, so the latter is
//! unit-testable without any transport at all.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::model::Message;
use crate::proxy::ProxyConfig;

const GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";

/// Map a gateway-facing folder name to the Graph API's folder id.
#[must_use]
pub fn folder_alias(folder: &str) -> &str {
    match folder.to_ascii_lowercase().as_str() {
        "junk" => "junkemail",
        _ => "inbox",
    }
}

#[derive(Deserialize)]
struct GraphMessageList {
    value: Vec<GraphMessage>,
}

#[derive(Deserialize)]
struct GraphMessage {
    id: String,
    from: Option<GraphRecipient>,
    subject: Option<String>,
    #[serde(rename = "bodyPreview")]
    body_preview: Option<String>,
    body: Option<GraphBody>,
    #[serde(rename = "receivedDateTime")]
    received_date_time: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct GraphRecipient {
    #[serde(rename = "emailAddress")]
    email_address: Option<GraphEmailAddress>,
}

#[derive(Deserialize)]
struct GraphEmailAddress {
    address: Option<String>,
}

#[derive(Deserialize)]
struct GraphBody {
    content: Option<String>,
}

/// Project a raw Graph message into the uniform `Message` shape shared
/// with the IMAP client.
fn project(raw: GraphMessage) -> Message {
    Message {
        id: raw.id,
        from: raw
            .from
            .and_then(|f| f.email_address)
            .and_then(|a| a.address),
        subject: raw.subject,
        text: raw.body_preview,
        html: raw.body.and_then(|b| b.content),
        date: raw.received_date_time,
    }
}

/// Abstracts the HTTPS calls Graph listing/deletion makes.
#[async_trait]
pub trait GraphTransport: Send + Sync {
    /// List up to `limit` messages in `folder`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `Error::GraphApiFailed` carrying the status and body on
    /// any non-2xx response.
    async fn list(
        &self,
        access_token: &str,
        folder: &str,
        limit: usize,
        proxy: Option<&ProxyConfig>,
    ) -> Result<Vec<Message>>;

    /// Delete a single message by id. Callers are expected to swallow
    /// per-message errors for best-effort clearing.
    ///
    /// # Errors
    ///
    /// Returns `Error::GraphApiFailed` on any non-2xx response.
    async fn delete(&self, access_token: &str, message_id: &str, proxy: Option<&ProxyConfig>) -> Result<()>;
}

pub struct HttpGraphTransport;

impl Default for HttpGraphTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpGraphTransport {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl GraphTransport for HttpGraphTransport {
    async fn list(
        &self,
        access_token: &str,
        folder: &str,
        limit: usize,
        proxy: Option<&ProxyConfig>,
    ) -> Result<Vec<Message>> {
        let client = crate::proxy::build_client(proxy)?;
        let folder_id = folder_alias(folder);
        let url = format!("{GRAPH_BASE}/me/mailFolders/{folder_id}/messages");

        let response = client
            .get(url)
            .bearer_auth(access_token)
            .query(&[
                ("$top", limit.to_string()),
                ("$orderby", "receivedDateTime desc".to_string()),
            ])
            .send()
            .await
            .map_err(|e| Error::GraphApiFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::GraphApiFailed(format!("{status}: {body}")));
        }

        let parsed: GraphMessageList = response
            .json()
            .await
            .map_err(|e| Error::GraphApiFailed(e.to_string()))?;

        Ok(parsed.value.into_iter().map(project).collect())
    }

    async fn delete(
        &self,
        access_token: &str,
        message_id: &str,
        proxy: Option<&ProxyConfig>,
    ) -> Result<()> {
        let client = crate::proxy::build_client(proxy)?;
        let url = format!("{GRAPH_BASE}/me/messages/{message_id}");

        let response = client
            .delete(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| Error::GraphApiFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::GraphApiFailed(format!("delete failed: {status}")));
        }
        Ok(())
    }
}

/// Mock transport used by orchestrator tests.
#[derive(Default)]
pub struct MockGraphTransport {
    pub messages: Vec<Message>,
    pub fail_list: bool,
    pub fail_delete_ids: Vec<String>,
}

#[async_trait]
impl GraphTransport for MockGraphTransport {
    async fn list(
        &self,
        _access_token: &str,
        _folder: &str,
        limit: usize,
        _proxy: Option<&ProxyConfig>,
    ) -> Result<Vec<Message>> {
        if self.fail_list {
            return Err(Error::GraphApiFailed("mock failure".to_string()));
        }
        Ok(self.messages.iter().take(limit).cloned().collect())
    }

    async fn delete(
        &self,
        _access_token: &str,
        message_id: &str,
        _proxy: Option<&ProxyConfig>,
    ) -> Result<()> {
        if self.fail_delete_ids.iter().any(|id| id == message_id) {
            return Err(Error::GraphApiFailed(format!("delete {message_id} failed")));
        }
        Ok(())
    }
}
