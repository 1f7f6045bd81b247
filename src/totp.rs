//! TOTP Verifier (C3): base32 secret handling, time-step HOTP, and the
//! skew window.
//!
//! Hand-rolled rather than built on the `totp-rs` crate: `spec.md`
//! pins an exact algorithm (counter formula, dynamic truncation,
//! window semantics) that is easiest to keep bit-exact and
//! independently unit-testable as plain functions. `hmac` + `sha1` do
//! the HOTP step; the base32 codec below matches `spec.md`'s `A-Z2-7`
//! alphabet exactly, since nothing in the pack already depends on a
//! base32 crate for this alphabet.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;

use crate::error::{Error, Result};

type HmacSha1 = Hmac<Sha1>;

const PERIOD_SECS: u64 = 30;
const DIGITS: u32 = 6;
const BASE32_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Generate a fresh random secret of at least 16 bytes, base32-encoded.
#[must_use]
pub fn generate_secret() -> String {
    let mut raw = [0u8; 20];
    rand::thread_rng().fill_bytes(&mut raw);
    base32_encode(&raw)
}

/// Build the `otpauth://` provisioning URI for an authenticator app.
#[must_use]
pub fn provisioning_uri(issuer: &str, account: &str, secret: &str) -> String {
    format!(
        "otpauth://totp/{issuer}:{account}?secret={secret}&issuer={issuer}&algorithm=SHA1&digits=6&period=30"
    )
}

/// Compute the 6-digit code for `secret` at the time step containing
/// `unix_time`.
///
/// # Errors
///
/// Returns `Error::TwoFactorSecretInvalid` if `secret` is not valid
/// base32.
pub fn code_at(secret: &str, unix_time: u64) -> Result<String> {
    let key = base32_decode(secret).ok_or(Error::TwoFactorSecretInvalid)?;
    let counter = unix_time / PERIOD_SECS;
    Ok(hotp(&key, counter))
}

/// Verify `code` against `secret` at `unix_time`, allowing a symmetric
/// window of `window` steps (each step is 30s) either side of the
/// current one. `window` is clamped to the spec's supported range of
/// 0–5.
///
/// # Errors
///
/// Returns `Error::TwoFactorSecretInvalid` if `secret` is not valid
/// base32.
pub fn verify(secret: &str, code: &str, window: u32, unix_time: u64) -> Result<bool> {
    let key = base32_decode(secret).ok_or(Error::TwoFactorSecretInvalid)?;
    let window = window.min(5) as i64;
    let counter = (unix_time / PERIOD_SECS) as i64;

    for delta in -window..=window {
        let step = counter + delta;
        if step < 0 {
            continue;
        }
        #[allow(clippy::cast_sign_loss)]
        let candidate = hotp(&key, step as u64);
        if constant_time_eq(candidate.as_bytes(), code.as_bytes()) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn hotp(key: &[u8], counter: u64) -> String {
    let mut mac = HmacSha1::new_from_slice(key).expect("HMAC accepts a key of any length");
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let truncated = u32::from_be_bytes([
        digest[offset] & 0x7f,
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]);

    let code = truncated % 10u32.pow(DIGITS);
    format!("{code:0width$}", width = DIGITS as usize)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.len() == b.len() && a.ct_eq(b).into()
}

fn base32_encode(data: &[u8]) -> String {
    let mut out = String::new();
    let mut bits = 0u32;
    let mut bit_count = 0u32;

    for &byte in data {
        bits = (bits << 8) | u32::from(byte);
        bit_count += 8;
        while bit_count >= 5 {
            bit_count -= 5;
            let idx = ((bits >> bit_count) & 0x1f) as usize;
            out.push(BASE32_ALPHABET[idx] as char);
        }
    }
    if bit_count > 0 {
        let idx = ((bits << (5 - bit_count)) & 0x1f) as usize;
        out.push(BASE32_ALPHABET[idx] as char);
    }
    out
}

fn base32_decode(s: &str) -> Option<Vec<u8>> {
    let mut bits = 0u32;
    let mut bit_count = 0u32;
    let mut out = Vec::new();

    for ch in s.trim_end_matches('=').chars() {
        let upper = ch.to_ascii_uppercase();
        let value = BASE32_ALPHABET.iter().position(|&c| c == upper as u8)?;
        bits = (bits << 5) | value as u32;
        bit_count += 5;
        if bit_count >= 8 {
            bit_count -= 8;
            out.push(((bits >> bit_count) & 0xff) as u8);
        }
    }
    Some(out)
}
