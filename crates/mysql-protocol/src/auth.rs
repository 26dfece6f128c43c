//! Authentication scrambles.
//!
//! Two plugins cover every server version this library targets:
//!
//! - `mysql_native_password` (pre-8.0 default):
//!   `SHA1(password) XOR SHA1(nonce + SHA1(SHA1(password)))`
//! - `caching_sha2_password` (8.0+ default), fast path:
//!   `SHA256(password) XOR SHA256(SHA256(SHA256(password)) + nonce)`
//!
//! The caching_sha2 full-auth path (RSA key exchange) is only usable over
//! TLS in this library; over an encrypted stream the cleartext password is
//! sent instead, as the protocol allows.

use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Plugin names as they appear on the wire.
pub mod plugin {
    /// SHA1 scramble, default before MySQL 8.0.
    pub const NATIVE_PASSWORD: &str = "mysql_native_password";
    /// SHA256 scramble with server-side caching, default since 8.0.
    pub const CACHING_SHA2_PASSWORD: &str = "caching_sha2_password";
    /// Cleartext password; only acceptable over TLS.
    pub const CLEAR_PASSWORD: &str = "mysql_clear_password";
}

/// Status bytes inside caching_sha2_password AuthMoreData packets.
pub mod caching_sha2 {
    /// The server found a cached entry; an OK packet follows.
    pub const FAST_AUTH_OK: u8 = 0x03;
    /// The server needs the full exchange (TLS or RSA).
    pub const FULL_AUTH_REQUIRED: u8 = 0x04;
}

/// Length of the server scramble both plugins operate on.
pub const NONCE_LEN: usize = 20;

fn clip_nonce(nonce: &[u8]) -> &[u8] {
    // Servers send the 20-byte scramble with a trailing NUL; use the
    // first 20 bytes only.
    if nonce.len() > NONCE_LEN {
        &nonce[..NONCE_LEN]
    } else {
        nonce
    }
}

/// Compute the `mysql_native_password` response (20 bytes, or empty for an
/// empty password).
#[must_use]
pub fn native_password_scramble(password: &str, nonce: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }
    let nonce = clip_nonce(nonce);

    let pw_hash = Sha1::digest(password.as_bytes());
    let pw_hash_hash = Sha1::digest(pw_hash);

    let mut outer = Sha1::new();
    outer.update(nonce);
    outer.update(pw_hash_hash);
    let mask = outer.finalize();

    pw_hash.iter().zip(mask.iter()).map(|(a, b)| a ^ b).collect()
}

/// Compute the `caching_sha2_password` fast-auth response (32 bytes, or
/// empty for an empty password).
#[must_use]
pub fn caching_sha2_scramble(password: &str, nonce: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }
    let nonce = clip_nonce(nonce);

    let pw_hash = Sha256::digest(password.as_bytes());
    let pw_hash_hash = Sha256::digest(pw_hash);

    let mut outer = Sha256::new();
    outer.update(pw_hash_hash);
    outer.update(nonce);
    let mask = outer.finalize();

    pw_hash.iter().zip(mask.iter()).map(|(a, b)| a ^ b).collect()
}

/// Build the response for a given plugin name.
///
/// Unknown plugins fall back to `mysql_native_password`; if the server
/// disagrees it answers with an auth-switch request.
#[must_use]
pub fn scramble_for(plugin_name: &str, password: &str, nonce: &[u8]) -> Vec<u8> {
    match plugin_name {
        plugin::CACHING_SHA2_PASSWORD => caching_sha2_scramble(password, nonce),
        plugin::CLEAR_PASSWORD => {
            let mut out = password.as_bytes().to_vec();
            out.push(0);
            out
        }
        _ => native_password_scramble(password, nonce),
    }
}
