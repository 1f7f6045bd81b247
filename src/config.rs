//! Configuration Loader (C20).
//!
//! `GatewayConfig::from_env` follows the shape of the teacher's
//! `ImapConfig::from_env`: read everything up front, return one
//! `Result`. Unlike the teacher, every field is validated in a single
//! pass and every violation is collected, not just the first — an
//! operator fixing a broken `.env` wants the whole list at once.

use std::env;

use crate::error::{Error, Result};

/// One field that failed validation: its name and why.
pub type ConfigViolation = (&'static str, String);

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub node_env: String,
    pub port: u16,
    pub database_url: String,
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub jwt_expires_in_secs: i64,
    pub encryption_key: String,
    pub admin_username: String,
    pub admin_password: String,
    pub admin_login_max_attempts: u32,
    pub admin_login_lock_minutes: i64,
    pub admin_2fa_secret: Option<String>,
    pub admin_2fa_window: u32,
    pub api_log_retention_days: i64,
    pub api_log_cleanup_interval_minutes: u64,
    pub cors_origin: Option<Vec<String>>,
}

/// The well-known placeholder value shipped in example `.env` files.
/// Production deployments must override it.
const DEFAULT_ADMIN_PASSWORD: &str = "changeme";

impl GatewayConfig {
    /// Load and validate configuration from the process environment
    /// (and `.env` if present).
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` listing every violated field if any
    /// required value is missing or malformed, or if running with
    /// `NODE_ENV=production` and the default admin password.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut violations: Vec<ConfigViolation> = Vec::new();

        let node_env = env::var("NODE_ENV").unwrap_or_else(|_| "development".to_string());

        let port = parse_with_default(&mut violations, "PORT", "3000");

        let database_url = require(&mut violations, "DATABASE_URL");
        if let Some(url) = &database_url {
            if !url.contains("://") {
                violations.push(("DATABASE_URL", "must be a parseable URL".to_string()));
            }
        }

        let redis_url = env::var("REDIS_URL").ok();

        let jwt_secret = require(&mut violations, "JWT_SECRET");
        if let Some(secret) = &jwt_secret {
            if secret.len() < 32 {
                violations.push(("JWT_SECRET", "must be at least 32 characters".to_string()));
            }
        }

        let jwt_expires_in_secs = env::var("JWT_EXPIRES_IN")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(2 * 60 * 60);

        let encryption_key = require(&mut violations, "ENCRYPTION_KEY");
        if let Some(key) = &encryption_key {
            if key.len() != 32 {
                violations.push(("ENCRYPTION_KEY", "must be exactly 32 characters".to_string()));
            }
        }

        let admin_username = env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin".to_string());
        let admin_password =
            env::var("ADMIN_PASSWORD").unwrap_or_else(|_| DEFAULT_ADMIN_PASSWORD.to_string());

        if node_env == "production" && admin_password == DEFAULT_ADMIN_PASSWORD {
            violations.push((
                "ADMIN_PASSWORD",
                "default admin password must be overridden in production".to_string(),
            ));
        }

        let admin_login_max_attempts =
            parse_with_default(&mut violations, "ADMIN_LOGIN_MAX_ATTEMPTS", "5");
        let admin_login_lock_minutes =
            parse_with_default(&mut violations, "ADMIN_LOGIN_LOCK_MINUTES", "15");

        let admin_2fa_secret = env::var("ADMIN_2FA_SECRET").ok();
        if let Some(secret) = &admin_2fa_secret {
            if secret.len() < 16 {
                violations.push((
                    "ADMIN_2FA_SECRET",
                    "must be at least 16 base32 characters".to_string(),
                ));
            }
        }

        let admin_2fa_window = parse_with_default(&mut violations, "ADMIN_2FA_WINDOW", "1");
        let api_log_retention_days =
            parse_with_default(&mut violations, "API_LOG_RETENTION_DAYS", "30");
        let api_log_cleanup_interval_minutes =
            parse_with_default(&mut violations, "API_LOG_CLEANUP_INTERVAL_MINUTES", "60");

        let cors_origin = env::var("CORS_ORIGIN").ok().map(|csv| {
            csv.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        });

        if !violations.is_empty() {
            let message = violations
                .iter()
                .map(|(field, reason)| format!("{field}: {reason}"))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(Error::Config(message));
        }

        Ok(Self {
            node_env,
            port,
            database_url: database_url.unwrap_or_default(),
            redis_url,
            jwt_secret: jwt_secret.unwrap_or_default(),
            jwt_expires_in_secs,
            encryption_key: encryption_key.unwrap_or_default(),
            admin_username,
            admin_password,
            admin_login_max_attempts,
            admin_login_lock_minutes,
            admin_2fa_secret,
            admin_2fa_window,
            api_log_retention_days,
            api_log_cleanup_interval_minutes,
            cors_origin,
        })
    }

    #[must_use]
    pub fn is_production(&self) -> bool {
        self.node_env == "production"
    }
}

fn require(violations: &mut Vec<ConfigViolation>, name: &'static str) -> Option<String> {
    match env::var(name) {
        Ok(v) if !v.is_empty() => Some(v),
        _ => {
            violations.push((name, "is required".to_string()));
            None
        }
    }
}

fn parse_with_default<T>(
    violations: &mut Vec<ConfigViolation>,
    name: &'static str,
    default: &str,
) -> T
where
    T: std::str::FromStr,
{
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    match raw.parse() {
        Ok(v) => v,
        Err(_) => {
            violations.push((name, format!("could not parse {raw:?}")));
            default
                .parse()
                .unwrap_or_else(|_| unreachable!("default literal must parse"))
        }
    }
}

/// IMAP connection parameters derived from a `Mailbox` and the broker's
/// XOAUTH2 token, used by `ImapMailClient`.
#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub address: String,
    pub access_token: String,
}
