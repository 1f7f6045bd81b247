//! Password Hasher (C2): adaptive-cost password hashing and
//! constant-time verification.
//!
//! Argon2id via the `argon2` + `password-hash` crates, the same pair
//! the stalwart-family directory crates use for principal secrets.
//! Parameters target roughly 100ms per verification on commodity
//! hardware.

use argon2::{Argon2, Params, PasswordHasher, PasswordVerifier};
use password_hash::{PasswordHash, SaltString, rand_core::OsRng};

use crate::error::{Error, Result};

/// 19 MiB memory cost, 2 iterations, 1-lane parallelism: Argon2id
/// parameters landing close to 100ms on commodity hardware.
fn argon2() -> Argon2<'static> {
    let params = Params::new(19 * 1024, 2, 1, None).expect("static Argon2 params are valid");
    Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params)
}

/// Hash `password`, returning a self-describing PHC string that
/// [`verify`] can parse back out (embeds algorithm, parameters, salt).
///
/// # Errors
///
/// Returns `Error::Internal` only if the underlying hasher rejects the
/// input (e.g. a password containing a NUL byte is still fine; Argon2
/// itself can fail only on pathological allocator conditions).
pub fn hash(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    argon2()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| Error::Internal(format!("password hashing failed: {e}")))
}

/// Verify `password` against a digest produced by [`hash`].
///
/// Constant-time with respect to mismatched characters: the
/// `password-hash` crate's comparison is constant time by
/// construction. Malformed digests are treated as a non-match rather
/// than propagated as an error, since callers only care whether
/// authentication succeeded.
#[must_use]
pub fn verify(password: &str, digest: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(digest) else {
        return false;
    };
    argon2()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}
