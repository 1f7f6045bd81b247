//! IMAP Mail Client (C12): XOAUTH2-authenticated read-only fetch
//! against `outlook.office365.com:993`.
//!
//! Grounded on the teacher's `client.rs`/`connection.rs` for the
//! connect → select → search → fetch → logout shape, `tokio_rustls` +
//! `async_imap` call sequence, and on
//! `johannesmutter-amberize/crates/adapters/src/imap.rs` for the
//! `async_imap::Authenticator` XOAUTH2 SASL pattern the teacher never
//! needed (Proton Bridge uses plain LOGIN). Two changes from the
//! teacher's connection handling: implicit TLS on port 993 (no
//! STARTTLS — Microsoft's IMAP endpoint doesn't offer it) with real
//! certificate verification (`rustls-native-certs` +
//! `webpki-roots`, not the teacher's accept-all verifier built for
//! Proton Bridge's self-signed cert), and RFC 5322 parsing via
//! `mail-parser` in place of the teacher's bespoke `email_parser`
//! crate.

use std::sync::Arc;

use async_imap::Session;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use mail_parser::MessageParser;
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
use tracing::{debug, info, warn};

use crate::config::ImapConfig;
use crate::error::{Error, Result};
use crate::model::Message;

type ImapSession = Session<Compat<tokio_rustls::client::TlsStream<TcpStream>>>;

/// Map a gateway-facing folder name to the name passed verbatim to
/// IMAP `SELECT`. Unlike Graph's `junkemail` alias, this is
/// case-sensitive — Microsoft's IMAP endpoint only recognizes the
/// literal `Junk`. `spec.md`'s Open Questions flag this asymmetry as
/// something to confirm against real deployments rather than paper
/// over.
#[must_use]
pub fn folder_alias(folder: &str) -> &str {
    match folder.to_ascii_lowercase().as_str() {
        "junk" => "Junk",
        _ => "INBOX",
    }
}

/// Abstracts the whole connect → authenticate → select → search →
/// fetch → logout sequence behind one call, so the Mail Orchestrator
/// (C13) can be tested without a real TLS/IMAP round trip.
#[async_trait]
pub trait ImapTransport: Send + Sync {
    /// Fetch up to `limit` most-recent messages from `folder`,
    /// newest first.
    ///
    /// # Errors
    ///
    /// Returns `Error::Imap` on any connection, authentication,
    /// SELECT, or SEARCH failure; `Error::Parse` if a fetched body
    /// cannot be parsed as RFC 5322.
    async fn fetch_recent(
        &self,
        config: &ImapConfig,
        folder: &str,
        limit: usize,
    ) -> Result<Vec<Message>>;
}

/// Production transport: real TLS, real XOAUTH2, real wire protocol.
pub struct Rfc3501ImapClient;

impl Default for Rfc3501ImapClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Rfc3501ImapClient {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn tls_connector(&self) -> Result<TlsConnector> {
        let mut roots = rustls::RootCertStore::empty();
        if let Ok(native) = rustls_native_certs::load_native_certs().certs.into_iter().try_fold(
            Vec::new(),
            |mut acc, cert| -> std::result::Result<Vec<_>, ()> {
                acc.push(cert);
                Ok(acc)
            },
        ) {
            for cert in native {
                let _ = roots.add(cert);
            }
        }
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        Ok(TlsConnector::from(Arc::new(config)))
    }

    async fn connect(&self, config: &ImapConfig) -> Result<ImapSession> {
        let addr = format!("{}:{}", config.host, config.port);
        debug!("connecting to imap server at {addr}");

        let tcp_stream = TcpStream::connect(&addr).await?;

        let connector = self.tls_connector()?;
        let server_name = ServerName::try_from(config.host.clone())
            .map_err(|e| Error::Tls(format!("invalid server name: {e}")))?;

        let tls_stream = connector
            .connect(server_name, tcp_stream)
            .await
            .map_err(|e| Error::Tls(e.to_string()))?;

        let client = async_imap::Client::new(tls_stream.compat());

        let mut authenticator = XOAuth2Authenticator::new(&config.address, &config.access_token);
        let session = client
            .authenticate("XOAUTH2", &mut authenticator)
            .await
            .map_err(|(e, _)| Error::Imap(format!("XOAUTH2 authentication failed: {e}")))?;

        info!("authenticated imap session for {}", config.address);
        Ok(session)
    }
}

#[async_trait]
impl ImapTransport for Rfc3501ImapClient {
    async fn fetch_recent(
        &self,
        config: &ImapConfig,
        folder: &str,
        limit: usize,
    ) -> Result<Vec<Message>> {
        let mut session = self.connect(config).await?;
        let result = fetch_recent_inner(&mut session, folder, limit).await;
        // Connection must close on every exit path, success or error.
        session.logout().await.ok();
        result
    }
}

async fn fetch_recent_inner(
    session: &mut ImapSession,
    folder: &str,
    limit: usize,
) -> Result<Vec<Message>> {
    session
        .examine(folder)
        .await
        .map_err(|e| Error::Imap(format!("failed to select {folder} read-only: {e}")))?;

    let uids = session
        .uid_search("ALL")
        .await
        .map_err(|e| Error::Imap(format!("search failed: {e}")))?;

    let mut uid_list: Vec<u32> = uids.into_iter().collect();
    uid_list.sort_unstable();
    let start = uid_list.len().saturating_sub(limit);
    let recent_uids = &uid_list[start..];

    if recent_uids.is_empty() {
        return Ok(Vec::new());
    }

    let uid_set = recent_uids
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");

    let mut stream = session
        .uid_fetch(&uid_set, "(UID BODY.PEEK[])")
        .await
        .map_err(|e| Error::Imap(format!("fetch failed: {e}")))?;

    let mut messages = Vec::with_capacity(recent_uids.len());
    while let Some(item) = stream.next().await {
        match item {
            Ok(fetch) => {
                let Some(uid) = fetch.uid else { continue };
                let Some(body) = fetch.body() else { continue };
                match project(uid, body) {
                    Ok(msg) => messages.push(msg),
                    Err(e) => warn!("failed to parse message uid {uid}: {e}"),
                }
            }
            Err(e) => warn!("fetch stream error: {e}"),
        }
    }
    drop(stream);

    messages.sort_by(|a, b| b.date.cmp(&a.date));
    Ok(messages)
}

fn project(uid: u32, body: &[u8]) -> Result<Message> {
    let parsed = MessageParser::default()
        .parse(body)
        .ok_or_else(|| Error::Parse(format!("unparseable rfc 5322 message, uid {uid}")))?;

    let millis = Utc::now().timestamp_millis();
    let from = parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(ToString::to_string);
    let date: Option<DateTime<Utc>> = parsed
        .date()
        .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0));

    Ok(Message {
        id: format!("imap_{millis}_{uid}"),
        from,
        subject: parsed.subject().map(ToString::to_string),
        text: parsed.body_text(0).map(|s| s.to_string()),
        html: parsed.body_html(0).map(|s| s.to_string()),
        date,
    })
}

/// SASL XOAUTH2 authenticator: `user={email}\x01auth=Bearer
/// {token}\x01\x01`, base64-encoded by `async_imap` on our behalf.
struct XOAuth2Authenticator {
    response: Vec<u8>,
}

impl XOAuth2Authenticator {
    fn new(address: &str, access_token: &str) -> Self {
        Self {
            response: format!("user={address}\x01auth=Bearer {access_token}\x01\x01").into_bytes(),
        }
    }
}

impl async_imap::Authenticator for &mut XOAuth2Authenticator {
    type Response = Vec<u8>;

    fn process(&mut self, _challenge: &[u8]) -> Self::Response {
        std::mem::take(&mut self.response)
    }
}

/// Canned-response transport used by orchestrator tests.
#[derive(Default)]
pub struct MockImapClient {
    pub messages: Vec<Message>,
    pub fail: bool,
}

#[async_trait]
impl ImapTransport for MockImapClient {
    async fn fetch_recent(
        &self,
        _config: &ImapConfig,
        _folder: &str,
        limit: usize,
    ) -> Result<Vec<Message>> {
        if self.fail {
            return Err(Error::Imap("mock imap failure".to_string()));
        }
        let mut messages: Vec<Message> = self.messages.iter().take(limit).cloned().collect();
        messages.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(messages)
    }
}
