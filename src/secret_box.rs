//! Secret Box (C1): authenticated symmetric encryption of refresh
//! tokens and 2FA secrets at rest.
//!
//! AES-256-GCM via the `aes-gcm` crate. `spec.md` describes a "128-bit
//! nonce"; this uses the cipher's native 96-bit GCM nonce instead (the
//! industry-standard size for this construction) — see `DESIGN.md` for
//! the resolved open question. The configured key string is hashed
//! once with SHA-256 to produce uniform 256-bit key material regardless
//! of the configured string's byte distribution.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// An AES-256-GCM secret box keyed from a configured passphrase.
pub struct SecretBox {
    cipher: Aes256Gcm,
}

impl SecretBox {
    /// Derive a box from the configured `ENCRYPTION_KEY` string.
    #[must_use]
    pub fn new(configured_key: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(configured_key.as_bytes());
        let derived: [u8; 32] = hasher.finalize().into();
        let key = Key::<Aes256Gcm>::from_slice(&derived);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    /// Seal `plaintext`, returning `nonce:tag:ciphertext` as lowercase
    /// hex, colon-separated.
    #[must_use]
    pub fn encrypt(&self, plaintext: &[u8]) -> String {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        // `aes-gcm` appends the 16-byte tag to the ciphertext; split it
        // back out so the wire format keeps them as separate segments.
        let mut sealed = self
            .cipher
            .encrypt(nonce, plaintext)
            .expect("AES-GCM encryption over a bounded buffer cannot fail");
        let tag = sealed.split_off(sealed.len() - TAG_LEN);

        format!(
            "{}:{}:{}",
            hex_encode(&nonce_bytes),
            hex_encode(&tag),
            hex_encode(&sealed)
        )
    }

    /// Open a blob produced by [`encrypt`](Self::encrypt).
    ///
    /// # Errors
    ///
    /// Returns `Error::CryptoInvalid` if the format is malformed, the
    /// nonce is the wrong length, or the auth tag fails to verify.
    pub fn decrypt(&self, blob: &str) -> Result<Vec<u8>> {
        let mut parts = blob.splitn(3, ':');
        let (Some(nonce_hex), Some(tag_hex), Some(ct_hex)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::CryptoInvalid);
        };

        let nonce_bytes = hex_decode(nonce_hex).ok_or(Error::CryptoInvalid)?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(Error::CryptoInvalid);
        }
        let tag_bytes = hex_decode(tag_hex).ok_or(Error::CryptoInvalid)?;
        if tag_bytes.len() != TAG_LEN {
            return Err(Error::CryptoInvalid);
        }
        let ct_bytes = hex_decode(ct_hex).ok_or(Error::CryptoInvalid)?;

        let mut combined = ct_bytes;
        combined.extend_from_slice(&tag_bytes);

        let nonce = Nonce::from_slice(&nonce_bytes);
        self.cipher
            .decrypt(nonce, combined.as_ref())
            .map_err(|_| Error::CryptoInvalid)
    }

    /// Convenience wrapper for sealing UTF-8 strings.
    #[must_use]
    pub fn encrypt_str(&self, plaintext: &str) -> String {
        self.encrypt(plaintext.as_bytes())
    }

    /// Convenience wrapper for opening UTF-8 strings.
    ///
    /// # Errors
    ///
    /// As `decrypt`, plus `Error::CryptoInvalid` if the opened bytes
    /// are not valid UTF-8.
    pub fn decrypt_str(&self, blob: &str) -> Result<String> {
        let bytes = self.decrypt(blob)?;
        String::from_utf8(bytes).map_err(|_| Error::CryptoInvalid)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(out, "{b:02x}").unwrap();
    }
    out
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}
