//! Demo/smoke-test CLI: exercises the Pool Allocator (C9) and Mail
//! Orchestrator (C13) against in-memory backends seeded on startup.
//!
//! Kept in the teacher's `clap` + `anyhow` + `tracing-subscriber`
//! style (derive subcommands, a global `--json` flag, an env-filtered
//! subscriber). There is no real database or Microsoft tenant behind
//! this binary — it seeds a handful of mailboxes in memory and a mock
//! OAuth/Graph/IMAP transport, so it can demonstrate the allocate →
//! fetch → clear flow without network access.

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mailgate_core::{
    FetchMethod, FetchParams, FetchStrategy, Mailbox, MailboxGroup, MailboxId, MailboxStatus,
    MailOrchestrator, MailboxStatusRepo, MemPoolRepo, MockGraphTransport, MockImapClient,
    MockTokenExchanger, OAuthBroker, PoolAllocator, ScopeFilter, SecretBox,
};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gateway-cli", about = "mailgate-core demo CLI")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Emit machine-readable JSON instead of plain text.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Allocate an unused demo mailbox to a fixed demo credential.
    AllocateEmail {
        #[arg(long)]
        group: Option<String>,
    },
    /// Fetch messages for a demo mailbox via the mock Graph/IMAP transports.
    Fetch {
        #[arg(long)]
        address: String,
        #[arg(long, default_value = "inbox")]
        folder: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Print pool statistics for the demo credential.
    PoolStats {
        #[arg(long)]
        group: Option<String>,
    },
    /// Reset the demo credential's pool assignments.
    ResetPool {
        #[arg(long)]
        group: Option<String>,
    },
}

const DEMO_CREDENTIAL_ID: i64 = 1;

struct NoopStatusRepo;

#[async_trait::async_trait]
impl MailboxStatusRepo for NoopStatusRepo {
    async fn update_status(
        &self,
        mailbox_id: MailboxId,
        status: MailboxStatus,
        error_message: Option<String>,
    ) -> mailgate_core::Result<()> {
        info!("mailbox {mailbox_id} status -> {status:?} ({error_message:?})");
        Ok(())
    }
}

fn seeded_pool_repo() -> Arc<MemPoolRepo> {
    let repo = Arc::new(MemPoolRepo::new());
    let secret_box = SecretBox::new("demo-encryption-key-not-for-prod");

    repo.seed_group(MailboxGroup {
        id: 1,
        name: "default".to_string(),
        description: None,
        fetch_strategy: FetchStrategy::GraphFirst,
    });

    for (id, address) in [(1, "a@example.com"), (2, "b@example.com"), (3, "c@example.com")] {
        repo.seed_mailbox(Mailbox {
            id,
            address: address.to_string(),
            oauth_client_id: "demo-client-id".to_string(),
            refresh_token_cipher: secret_box.encrypt_str("demo-refresh-token"),
            password_cipher: None,
            status: MailboxStatus::Active,
            group_id: Some(1),
            last_check_at: None,
            last_error_message: None,
        });
    }

    repo
}

#[tokio::main]
async fn main() -> Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("rustls ring provider installs exactly once");
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let pool_repo = seeded_pool_repo();
    let secret_box = Arc::new(SecretBox::new("demo-encryption-key-not-for-prod"));
    let scope = ScopeFilter::unrestricted();

    match args.command {
        Command::AllocateEmail { group } => {
            let allocator = PoolAllocator::new(pool_repo, secret_box);
            let cancel = CancellationToken::new();
            let mailbox = allocator
                .allocate_and_mark(DEMO_CREDENTIAL_ID, group.as_deref(), &scope, &cancel)
                .await?;
            print_result(args.json, &format!("{{\"email\":\"{}\"}}", mailbox.address), &format!("allocated {}", mailbox.address));
        }
        Command::Fetch { address, folder, limit } => {
            let mailbox = Mailbox {
                id: 99,
                address: address.clone(),
                oauth_client_id: "demo-client-id".to_string(),
                refresh_token_cipher: secret_box.encrypt_str("demo-refresh-token"),
                password_cipher: None,
                status: MailboxStatus::Active,
                group_id: None,
                last_check_at: None,
                last_error_message: None,
            };

            let exchanger = Arc::new(MockTokenExchanger::new());
            exchanger.set_graph_response(Some(mailgate_core::TokenResponse {
                access_token: "demo-graph-token".to_string(),
                expires_in: 3600,
                scope: Some("https://graph.microsoft.com/Mail.Read".to_string()),
            }));
            let store = Arc::new(mailgate_core::LocalSharedStore::new());
            let oauth = Arc::new(OAuthBroker::new(exchanger, store));
            let orchestrator = MailOrchestrator::new(
                Arc::new(NoopStatusRepo),
                secret_box,
                oauth,
                Arc::new(MockGraphTransport::default()),
                Arc::new(MockImapClient::default()),
            );

            let cancel = CancellationToken::new();
            let outcome = orchestrator
                .fetch(
                    &mailbox,
                    FetchStrategy::GraphFirst,
                    FetchParams { folder: &folder, limit, proxy: None },
                    &cancel,
                )
                .await?;
            let method = match outcome.method {
                FetchMethod::GraphApi => "graph_api",
                FetchMethod::Imap => "imap",
            };
            print_result(
                args.json,
                &format!("{{\"count\":{},\"method\":\"{method}\"}}", outcome.messages.len()),
                &format!("fetched {} messages via {method}", outcome.messages.len()),
            );
        }
        Command::PoolStats { group } => {
            let allocator = PoolAllocator::new(pool_repo, secret_box);
            let stats = allocator
                .stats(DEMO_CREDENTIAL_ID, group.as_deref(), &scope)
                .await?;
            print_result(
                args.json,
                &format!(
                    "{{\"total\":{},\"used\":{},\"remaining\":{}}}",
                    stats.total, stats.used, stats.remaining
                ),
                &format!(
                    "total={} used={} remaining={}",
                    stats.total, stats.used, stats.remaining
                ),
            );
        }
        Command::ResetPool { group } => {
            let allocator = PoolAllocator::new(pool_repo, secret_box);
            let removed = allocator
                .reset(DEMO_CREDENTIAL_ID, group.as_deref(), &scope)
                .await?;
            print_result(
                args.json,
                &format!("{{\"removed\":{removed}}}"),
                &format!("reset pool, removed {removed} assignments"),
            );
        }
    }

    Ok(())
}

fn print_result(json: bool, json_body: &str, plain: &str) {
    if json {
        println!("{json_body}");
    } else {
        println!("{plain}");
    }
}
