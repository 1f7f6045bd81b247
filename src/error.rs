//! Crate-wide error type.
//!
//! One `thiserror`-derived enum covers every failure mode named in
//! `spec.md`'s error-handling table, plus the lower-level transport
//! errors (IMAP, TLS, message parsing) that the mail clients raise on
//! their way up to the business-level kinds. Each business variant
//! knows its own HTTP status code and short code so the (external)
//! route layer can build the JSON envelope without a second mapping
//! table.

use thiserror::Error;

/// A single error surfaced by any component in this crate.
#[derive(Error, Debug)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("invalid session token")]
    InvalidToken,

    #[error("invalid api key")]
    InvalidApiKey,

    #[error("invalid one-time password")]
    InvalidOtp,

    #[error("account locked, try again in {minutes} minute(s)")]
    AccountLocked { minutes: i64 },

    #[error("account disabled")]
    AccountDisabled,

    #[error("api key disabled")]
    ApiKeyDisabled,

    #[error("api key expired")]
    ApiKeyExpired,

    #[error("forbidden")]
    Forbidden,

    #[error("group {0} is outside the credential's scope")]
    GroupForbidden(String),

    #[error("mailbox {0} is outside the credential's scope")]
    EmailForbidden(String),

    #[error("not found")]
    NotFound,

    #[error("group not found: {0}")]
    GroupNotFound(String),

    #[error("mailbox not found: {0}")]
    EmailNotFound(String),

    #[error("duplicate email address")]
    DuplicateEmail,

    #[error("duplicate username")]
    DuplicateUsername,

    #[error("group already exists")]
    GroupExists,

    #[error("mailbox already assigned to this credential")]
    AlreadyUsed,

    #[error("too many concurrent allocation attempts")]
    ConcurrencyLimit,

    #[error("rate limit exceeded")]
    RateLimitExceeded,

    #[error("no unused mailbox available")]
    NoUnusedEmail,

    #[error("imap token exchange failed")]
    ImapTokenFailed,

    #[error("graph api call failed: {0}")]
    GraphApiFailed(String),

    #[error("stored ciphertext is invalid")]
    CryptoInvalid,

    #[error("two-factor secret is invalid")]
    TwoFactorSecretInvalid,

    #[error("imap error: {0}")]
    Imap(String),

    #[error("message parsing error: {0}")]
    Parse(String),

    #[error("tls error: {0}")]
    Tls(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// The HTTP status code an external route should answer with.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Unauthorized | Self::InvalidToken | Self::InvalidApiKey | Self::InvalidOtp => {
                401
            }
            Self::AccountLocked { .. } | Self::ConcurrencyLimit | Self::RateLimitExceeded => 429,
            Self::AccountDisabled
            | Self::ApiKeyDisabled
            | Self::ApiKeyExpired
            | Self::Forbidden
            | Self::GroupForbidden(_)
            | Self::EmailForbidden(_) => 403,
            Self::NotFound | Self::GroupNotFound(_) | Self::EmailNotFound(_) => 404,
            Self::DuplicateEmail | Self::DuplicateUsername | Self::GroupExists => 409,
            Self::AlreadyUsed => 409,
            Self::NoUnusedEmail => 400,
            Self::ImapTokenFailed
            | Self::GraphApiFailed(_)
            | Self::CryptoInvalid
            | Self::TwoFactorSecretInvalid
            | Self::Imap(_)
            | Self::Parse(_)
            | Self::Tls(_)
            | Self::Config(_)
            | Self::Io(_)
            | Self::Internal(_) => 500,
        }
    }

    /// A short machine-readable code for the JSON error envelope, e.g.
    /// `"RATE_LIMIT_EXCEEDED"`.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::InvalidApiKey => "INVALID_API_KEY",
            Self::InvalidOtp => "INVALID_OTP",
            Self::AccountLocked { .. } => "ACCOUNT_LOCKED",
            Self::AccountDisabled => "ACCOUNT_DISABLED",
            Self::ApiKeyDisabled => "API_KEY_DISABLED",
            Self::ApiKeyExpired => "API_KEY_EXPIRED",
            Self::Forbidden => "FORBIDDEN",
            Self::GroupForbidden(_) => "GROUP_FORBIDDEN",
            Self::EmailForbidden(_) => "EMAIL_FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::GroupNotFound(_) => "GROUP_NOT_FOUND",
            Self::EmailNotFound(_) => "EMAIL_NOT_FOUND",
            Self::DuplicateEmail => "DUPLICATE_EMAIL",
            Self::DuplicateUsername => "DUPLICATE_USERNAME",
            Self::GroupExists => "GROUP_EXISTS",
            Self::AlreadyUsed => "ALREADY_USED",
            Self::ConcurrencyLimit => "CONCURRENCY_LIMIT",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::NoUnusedEmail => "NO_UNUSED_EMAIL",
            Self::ImapTokenFailed => "IMAP_TOKEN_FAILED",
            Self::GraphApiFailed(_) => "GRAPH_API_FAILED",
            Self::CryptoInvalid => "CRYPTO_INVALID",
            Self::TwoFactorSecretInvalid => "TWO_FACTOR_SECRET_INVALID",
            Self::Imap(_) => "IMAP_ERROR",
            Self::Parse(_) => "PARSE_ERROR",
            Self::Tls(_) => "TLS_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
