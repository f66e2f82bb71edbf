//! Cryptographic pieces of the tunnel handshake
//!
//! This module provides:
//! - RSA key material loading (PEM: PKCS#1, PKCS#8, PKIX SubjectPublicKeyInfo)
//! - the one-shot shared-secret proof exchanged right after the tunnel
//!   transport is established
//!
//! The handshake is deliberately minimal: the private peer writes exactly one
//! RSAES-PKCS1-v1_5 ciphertext of the shared secret, the public peer decrypts
//! and compares. There is no server nonce, so a recorded ciphertext replays;
//! the transport is otherwise treated as untrusted plumbing and payload bytes
//! are never transformed.

mod keys;
mod token;

pub use keys::{load_private_key, load_public_key};
pub use token::{send_token, verify_token};

use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no PEM block found in {0}")]
    MissingPem(String),

    #[error("unsupported key material in {0}: {1}")]
    UnsupportedKey(String, String),

    #[error("invalid key in {0}: {1}")]
    InvalidKey(String, String),

    #[error("failed to encrypt token: {0}")]
    Encrypt(String),

    #[error("failed to decrypt token")]
    Decrypt,

    #[error("peer token does not match the configured secret")]
    TokenMismatch,
}

#[cfg(test)]
pub(crate) mod tests {
    use rsa::RsaPrivateKey;
    use std::sync::OnceLock;

    // 2048-bit key generation is slow in debug builds; every test shares one.
    pub(crate) fn test_key() -> RsaPrivateKey {
        static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
        KEY.get_or_init(|| {
            RsaPrivateKey::new(&mut rand::thread_rng(), 2048).expect("RSA key generation")
        })
        .clone()
    }
}
