//! One-shot shared-secret proof
//!
//! Runs on the freshly established tunnel transport, before the multiplex
//! session exists. The private peer encrypts the shared secret with the
//! public key and writes exactly one ciphertext (the RSA modulus size in
//! bytes, 256 for 2048-bit keys); the public peer reads exactly that many
//! bytes, decrypts, and compares. No retry, no response beyond keeping or
//! closing the connection.

use super::CryptoError;
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Encrypt the shared secret and present it to the peer (private side).
pub async fn send_token<S>(
    transport: &mut S,
    key: &RsaPublicKey,
    secret: &str,
) -> Result<(), CryptoError>
where
    S: AsyncWrite + Unpin,
{
    let sealed = {
        let mut rng = rand::thread_rng();
        key.encrypt(&mut rng, Pkcs1v15Encrypt, secret.as_bytes())
            .map_err(|e| CryptoError::Encrypt(e.to_string()))?
    };

    transport.write_all(&sealed).await?;
    Ok(())
}

/// Read one ciphertext from the peer and check it against the configured
/// secret (public side). A short read, a decryption failure, and a mismatch
/// are all authentication failures; the caller closes the transport.
pub async fn verify_token<S>(
    transport: &mut S,
    key: &RsaPrivateKey,
    secret: &str,
) -> Result<(), CryptoError>
where
    S: AsyncRead + Unpin,
{
    let mut sealed = vec![0u8; key.size()];
    transport.read_exact(&mut sealed).await?;

    let token = key
        .decrypt(Pkcs1v15Encrypt, &sealed)
        .map_err(|_| CryptoError::Decrypt)?;

    if token != secret.as_bytes() {
        return Err(CryptoError::TokenMismatch);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::tests::test_key;

    #[tokio::test]
    async fn test_token_roundtrip() {
        let key = test_key();
        let public = key.to_public_key();
        let (mut sender, mut receiver) = tokio::io::duplex(1024);

        send_token(&mut sender, &public, "hunter2").await.unwrap();
        verify_token(&mut receiver, &key, "hunter2").await.unwrap();
    }

    #[tokio::test]
    async fn test_wrong_secret_rejected() {
        let key = test_key();
        let public = key.to_public_key();
        let (mut sender, mut receiver) = tokio::io::duplex(1024);

        send_token(&mut sender, &public, "wrong").await.unwrap();
        assert!(matches!(
            verify_token(&mut receiver, &key, "right").await,
            Err(CryptoError::TokenMismatch)
        ));
    }

    #[tokio::test]
    async fn test_garbage_ciphertext_rejected() {
        let key = test_key();
        let (mut sender, mut receiver) = tokio::io::duplex(1024);

        let garbage = vec![0x5a; key.size()];
        sender.write_all(&garbage).await.unwrap();

        assert!(matches!(
            verify_token(&mut receiver, &key, "s").await,
            Err(CryptoError::Decrypt)
        ));
    }

    #[tokio::test]
    async fn test_short_read_rejected() {
        let key = test_key();
        let (mut sender, mut receiver) = tokio::io::duplex(1024);

        sender.write_all(&[1, 2, 3]).await.unwrap();
        drop(sender);

        assert!(matches!(
            verify_token(&mut receiver, &key, "s").await,
            Err(CryptoError::Io(_))
        ));
    }

    #[test]
    fn test_ciphertext_is_modulus_size() {
        let key = test_key();
        let public = key.to_public_key();
        let mut rng = rand::thread_rng();

        let sealed = public
            .encrypt(&mut rng, Pkcs1v15Encrypt, b"s")
            .unwrap();
        assert_eq!(sealed.len(), 256); // 2048-bit modulus
    }
}
