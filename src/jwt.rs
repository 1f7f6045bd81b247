//! Token JWT Issuer (C4): mint and verify short-lived admin session
//! tokens.
//!
//! `jsonwebtoken`, HS256 — the same crate and algorithm used for
//! session tokens by `pashinov-nexus` and `YumchaLabs-siumai` in the
//! example pack.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{AdminId, AdminRole};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub role: AdminRole,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies HS256 session tokens.
pub struct JwtIssuer {
    secret: Vec<u8>,
    lifetime_secs: i64,
}

impl JwtIssuer {
    /// # Panics
    ///
    /// Panics if `secret` is shorter than 32 bytes; the configuration
    /// loader (C20) is responsible for rejecting short secrets before
    /// this type is ever constructed.
    #[must_use]
    pub fn new(secret: &str, lifetime_secs: i64) -> Self {
        assert!(secret.len() >= 32, "JWT secret must be at least 32 bytes");
        Self {
            secret: secret.as_bytes().to_vec(),
            lifetime_secs,
        }
    }

    /// Mint a session token for the given admin.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` if encoding fails (only possible on
    /// allocator failure).
    pub fn mint(&self, admin_id: AdminId, username: &str, role: AdminRole) -> Result<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: admin_id.to_string(),
            username: username.to_string(),
            role,
            iat: now,
            exp: now + self.lifetime_secs,
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(|e| Error::Internal(format!("jwt encode failed: {e}")))
    }

    /// Verify a token, rejecting expired or signature-invalid tokens.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidToken` on any verification failure.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|_| Error::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> JwtIssuer {
        JwtIssuer::new(&"s".repeat(32), 2 * 60 * 60)
    }

    #[test]
    fn mint_then_verify_round_trips() {
        let issuer = issuer();
        let token = issuer.mint(7, "alice", AdminRole::Admin).unwrap();
        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.sub, "7");
        assert_eq!(claims.username, "alice");
    }

    #[test]
    fn tampered_signature_rejected() {
        let issuer = issuer();
        let mut token = issuer.mint(1, "bob", AdminRole::SuperAdmin).unwrap();
        token.push('x');
        assert!(matches!(issuer.verify(&token), Err(Error::InvalidToken)));
    }

    #[test]
    fn expired_token_rejected() {
        let issuer = JwtIssuer::new(&"s".repeat(32), -1);
        let token = issuer.mint(1, "bob", AdminRole::Admin).unwrap();
        assert!(matches!(issuer.verify(&token), Err(Error::InvalidToken)));
    }

    #[test]
    fn wrong_secret_rejected() {
        let issuer_a = JwtIssuer::new(&"a".repeat(32), 3600);
        let issuer_b = JwtIssuer::new(&"b".repeat(32), 3600);
        let token = issuer_a.mint(1, "bob", AdminRole::Admin).unwrap();
        assert!(matches!(issuer_b.verify(&token), Err(Error::InvalidToken)));
    }

    #[test]
    #[should_panic(expected = "at least 32 bytes")]
    fn short_secret_panics() {
        JwtIssuer::new("too-short", 3600);
    }
}
