//! Admin Authenticator (C18): session-token extraction, login flow,
//! and the admin 2FA state machine.
//!
//! Wires the Login Lock-out (C6), Password Hasher (C2), TOTP Verifier
//! (C3), and Token JWT Issuer (C4) behind the login/verify entry
//! points `spec.md` §4.18 describes. `trait AdminRepo` is the
//! persistence boundary, following the same `Arc<dyn Trait>` seam as
//! `PoolRepo`/`CredentialRepo`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::jwt::{Claims, JwtIssuer};
use crate::lockout::LoginLockout;
use crate::model::{AdminAccount, AdminId, AdminRole, AdminStatus};
use crate::secret_box::SecretBox;
use crate::{password, totp};

/// Extraction sources for a session token, mirroring C17's
/// header-priority pattern.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenSources<'a> {
    pub bearer: Option<&'a str>,
    pub cookie: Option<&'a str>,
}

/// Extract the raw session token from `Authorization: Bearer …` or a
/// `token` cookie, in that priority order.
#[must_use]
pub fn extract_token(sources: TokenSources<'_>) -> Option<String> {
    if let Some(bearer) = sources.bearer {
        let trimmed = bearer.strip_prefix("Bearer ").unwrap_or(bearer);
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }
    if let Some(cookie) = sources.cookie {
        if !cookie.is_empty() {
            return Some(cookie.to_string());
        }
    }
    None
}

#[async_trait]
pub trait AdminRepo: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<AdminAccount>>;
    async fn find_by_id(&self, id: AdminId) -> Result<Option<AdminAccount>>;
    async fn record_login(&self, id: AdminId, ip: Option<&str>) -> Result<()>;
    async fn set_pending_secret(&self, id: AdminId, secret_cipher: Option<String>) -> Result<()>;
    async fn enable_two_factor(&self, id: AdminId, secret_cipher: String) -> Result<()>;
    async fn disable_two_factor(&self, id: AdminId) -> Result<()>;
}

pub struct AdminAuthenticator {
    repo: Arc<dyn AdminRepo>,
    lockout: Arc<LoginLockout>,
    jwt: Arc<JwtIssuer>,
    secret_box: Arc<SecretBox>,
    otp_window: u32,
    /// Legacy env-configured 2FA secret (cleartext base32), checked
    /// alongside a per-admin secret for installs predating
    /// per-account 2FA.
    legacy_env_secret: Option<String>,
}

impl AdminAuthenticator {
    #[must_use]
    pub const fn new(
        repo: Arc<dyn AdminRepo>,
        lockout: Arc<LoginLockout>,
        jwt: Arc<JwtIssuer>,
        secret_box: Arc<SecretBox>,
        otp_window: u32,
        legacy_env_secret: Option<String>,
    ) -> Self {
        Self {
            repo,
            lockout,
            jwt,
            secret_box,
            otp_window,
            legacy_env_secret,
        }
    }

    /// Authenticate `username`/`password`, consulting `otp` when the
    /// account has 2FA enabled (or the legacy env secret is
    /// configured). On success, mints a JWT and records the login.
    ///
    /// # Errors
    ///
    /// - `Error::AccountLocked` if C6's threshold is currently active.
    /// - `Error::Unauthorized` on a bad username/password.
    /// - `Error::AccountDisabled` if the account's status isn't
    ///   `Active`.
    /// - `Error::InvalidOtp` if 2FA is required but `otp` is missing
    ///   or wrong.
    pub async fn login(
        &self,
        username: &str,
        password_input: &str,
        otp: Option<&str>,
        ip: Option<&str>,
    ) -> Result<String> {
        self.lockout.check_locked(username, ip).await?;

        let Some(admin) = self.repo.find_by_username(username).await? else {
            self.lockout.record_failure(username, ip).await;
            return Err(Error::Unauthorized);
        };

        if !password::verify(password_input, &admin.password_digest) {
            self.lockout.record_failure(username, ip).await;
            return Err(Error::Unauthorized);
        }

        if admin.status != AdminStatus::Active {
            return Err(Error::AccountDisabled);
        }

        let requires_otp = admin.two_factor_enabled || self.legacy_env_secret.is_some();
        if requires_otp {
            let Some(code) = otp else {
                return Err(Error::InvalidOtp);
            };
            if !self.verify_otp(&admin, code)? {
                self.lockout.record_failure(username, ip).await;
                return Err(Error::InvalidOtp);
            }
        }

        self.lockout.clear(username, ip).await;
        self.repo.record_login(admin.id, ip).await?;

        self.jwt.mint(admin.id, &admin.username, admin.role)
    }

    fn verify_otp(&self, admin: &AdminAccount, code: &str) -> Result<bool> {
        let now = Utc::now().timestamp().unsigned_abs();

        if let Some(cipher) = &admin.two_factor_secret_cipher {
            let secret = self.secret_box.decrypt_str(cipher)?;
            if totp::verify(&secret, code, self.otp_window, now)? {
                return Ok(true);
            }
        }

        if let Some(legacy_secret) = &self.legacy_env_secret {
            if totp::verify(legacy_secret, code, self.otp_window, now)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Verify a session token and return the attached claims.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidToken` if `token` is missing, expired,
    /// or signature-invalid.
    pub fn verify_session(&self, sources: TokenSources<'_>) -> Result<Claims> {
        let token = extract_token(sources).ok_or(Error::InvalidToken)?;
        self.jwt.verify(&token)
    }

    /// Assert `claims` belongs to a `SuperAdmin`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Forbidden` otherwise.
    pub fn require_super_admin(claims: &Claims) -> Result<()> {
        if claims.role == AdminRole::SuperAdmin {
            Ok(())
        } else {
            Err(Error::Forbidden)
        }
    }

    /// Begin 2FA setup: generate a fresh secret, seal it, and store it
    /// as the admin's pending secret. Returns the cleartext secret and
    /// provisioning URI for display to the admin once.
    ///
    /// # Errors
    ///
    /// Propagates repo errors.
    pub async fn begin_two_factor_setup(
        &self,
        admin_id: AdminId,
        issuer: &str,
        account: &str,
    ) -> Result<(String, String)> {
        let secret = totp::generate_secret();
        let uri = totp::provisioning_uri(issuer, account, &secret);
        let cipher = self.secret_box.encrypt_str(&secret);
        self.repo.set_pending_secret(admin_id, Some(cipher)).await?;
        Ok((secret, uri))
    }

    /// Complete 2FA setup: move the pending secret to active if
    /// `otp` verifies against it.
    ///
    /// # Errors
    ///
    /// - `Error::TwoFactorSecretInvalid` if no setup is in progress.
    /// - `Error::InvalidOtp` if `otp` doesn't verify.
    pub async fn enable_two_factor(&self, admin: &AdminAccount, otp: &str) -> Result<()> {
        let Some(pending_cipher) = &admin.two_factor_pending_secret_cipher else {
            return Err(Error::TwoFactorSecretInvalid);
        };
        let secret = self.secret_box.decrypt_str(pending_cipher)?;
        let now = Utc::now().timestamp().unsigned_abs();
        if !totp::verify(&secret, otp, self.otp_window, now)? {
            return Err(Error::InvalidOtp);
        }
        self.repo.enable_two_factor(admin.id, pending_cipher.clone()).await?;
        self.repo.set_pending_secret(admin.id, None).await?;
        Ok(())
    }

    /// Disable 2FA: requires the current password and a valid OTP.
    ///
    /// # Errors
    ///
    /// - `Error::Unauthorized` on a bad password.
    /// - `Error::InvalidOtp` if `otp` doesn't verify.
    pub async fn disable_two_factor(
        &self,
        admin: &AdminAccount,
        password_input: &str,
        otp: &str,
    ) -> Result<()> {
        if !password::verify(password_input, &admin.password_digest) {
            return Err(Error::Unauthorized);
        }
        if !self.verify_otp(admin, otp)? {
            return Err(Error::InvalidOtp);
        }
        self.repo.disable_two_factor(admin.id).await?;
        Ok(())
    }
}

/// In-memory reference `AdminRepo`.
#[derive(Default)]
pub struct MemAdminRepo {
    admins: Mutex<Vec<AdminAccount>>,
}

impl MemAdminRepo {
    #[must_use]
    pub fn new(admins: Vec<AdminAccount>) -> Self {
        Self {
            admins: Mutex::new(admins),
        }
    }
}

#[async_trait]
impl AdminRepo for MemAdminRepo {
    async fn find_by_username(&self, username: &str) -> Result<Option<AdminAccount>> {
        Ok(self
            .admins
            .lock()
            .iter()
            .find(|a| a.username == username)
            .cloned())
    }

    async fn find_by_id(&self, id: AdminId) -> Result<Option<AdminAccount>> {
        Ok(self.admins.lock().iter().find(|a| a.id == id).cloned())
    }

    async fn record_login(&self, id: AdminId, ip: Option<&str>) -> Result<()> {
        let mut admins = self.admins.lock();
        if let Some(a) = admins.iter_mut().find(|a| a.id == id) {
            a.last_login_at = Some(Utc::now());
            a.last_login_ip = ip.map(ToString::to_string);
        }
        Ok(())
    }

    async fn set_pending_secret(&self, id: AdminId, secret_cipher: Option<String>) -> Result<()> {
        let mut admins = self.admins.lock();
        if let Some(a) = admins.iter_mut().find(|a| a.id == id) {
            a.two_factor_pending_secret_cipher = secret_cipher;
        }
        Ok(())
    }

    async fn enable_two_factor(&self, id: AdminId, secret_cipher: String) -> Result<()> {
        let mut admins = self.admins.lock();
        if let Some(a) = admins.iter_mut().find(|a| a.id == id) {
            a.two_factor_secret_cipher = Some(secret_cipher);
            a.two_factor_enabled = true;
        }
        Ok(())
    }

    async fn disable_two_factor(&self, id: AdminId) -> Result<()> {
        let mut admins = self.admins.lock();
        if let Some(a) = admins.iter_mut().find(|a| a.id == id) {
            a.two_factor_secret_cipher = None;
            a.two_factor_enabled = false;
        }
        Ok(())
    }
}
