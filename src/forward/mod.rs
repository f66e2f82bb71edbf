//! Point-to-point forwarders
//!
//! The degenerate members of the family: no multiplexing, no handshake, no
//! supervision. Each accepted connection is paired with one dialed upstream
//! connection and spliced by the shared relay.
//!
//! - [`run_forwarder`] — plain TCP on both legs
//! - [`run_entry`] — plaintext in, TLS out to the receiver (certificate
//!   verification disabled, as the pair is expected to run with self-signed
//!   material)
//! - [`run_receiver`] — TLS in from the entry, plaintext out to the target
//!
//! Setup failures (bind, certificate material) are fatal; per-connection
//! failures are logged and only cost that connection.

use crate::config::{EntryConfig, ForwardConfig, ReceiverConfig};
use crate::relay;
use rustls::pki_types::ServerName;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tracing::{debug, info, warn};

/// Forwarder errors
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),
}

/// Run the plain TCP port forwarder.
pub async fn run_forwarder(cfg: &ForwardConfig) -> crate::Result<()> {
    let listener = TcpListener::bind(&cfg.local_addr)
        .await
        .map_err(ForwardError::Io)?;
    info!(
        "forwarding {} -> {}",
        cfg.local_addr, cfg.remote_addr
    );

    loop {
        let (client, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("failed to accept connection: {}", e);
                continue;
            }
        };
        debug!("accepted connection from {}", peer);

        let remote_addr = cfg.remote_addr.clone();
        tokio::spawn(async move {
            client.set_nodelay(true).ok();
            let remote = match TcpStream::connect(&remote_addr).await {
                Ok(remote) => remote,
                Err(e) => {
                    warn!("failed to dial {}: {}", remote_addr, e);
                    return;
                }
            };
            remote.set_nodelay(true).ok();
            relay::link(client, remote).await;
            debug!("closed connection from {}", peer);
        });
    }
}

/// Run the entry side of the TLS forwarder pair: accept plaintext locally
/// and relay it TLS-encrypted to the receiver.
pub async fn run_entry(cfg: &EntryConfig) -> crate::Result<()> {
    let connector = TlsConnector::from(insecure_client_config());
    let server_name = receiver_server_name(&cfg.receiver_addr)?;

    let listener = TcpListener::bind(&cfg.local_addr)
        .await
        .map_err(ForwardError::Io)?;
    info!(
        "entry forwarding {} -> tls://{}",
        cfg.local_addr, cfg.receiver_addr
    );

    loop {
        let (client, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("failed to accept connection: {}", e);
                continue;
            }
        };
        debug!("accepted connection from {}", peer);

        let connector = connector.clone();
        let server_name = server_name.clone();
        let receiver_addr = cfg.receiver_addr.clone();
        tokio::spawn(async move {
            client.set_nodelay(true).ok();
            let upstream = match TcpStream::connect(&receiver_addr).await {
                Ok(upstream) => upstream,
                Err(e) => {
                    warn!("failed to dial receiver {}: {}", receiver_addr, e);
                    return;
                }
            };
            upstream.set_nodelay(true).ok();

            let tls = match connector.connect(server_name, upstream).await {
                Ok(tls) => tls,
                Err(e) => {
                    warn!("TLS handshake with receiver failed: {}", e);
                    return;
                }
            };
            relay::link(client, tls).await;
        });
    }
}

/// Run the receiver side of the TLS forwarder pair: terminate TLS and relay
/// plaintext to the target service.
pub async fn run_receiver(cfg: &ReceiverConfig) -> crate::Result<()> {
    let certs = load_certs(&cfg.cert_file)?;
    let key = load_tls_key(&cfg.key_file)?;
    let tls_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ForwardError::Tls(e.to_string()))?;
    let acceptor = TlsAcceptor::from(Arc::new(tls_config));

    let listener = TcpListener::bind(&cfg.listen_addr)
        .await
        .map_err(ForwardError::Io)?;
    info!(
        "receiver forwarding tls://{} -> {}",
        cfg.listen_addr, cfg.forward_addr
    );

    loop {
        let (entry, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("failed to accept connection: {}", e);
                continue;
            }
        };
        debug!("accepted entry connection from {}", peer);

        let acceptor = acceptor.clone();
        let forward_addr = cfg.forward_addr.clone();
        tokio::spawn(async move {
            entry.set_nodelay(true).ok();
            let tls = match acceptor.accept(entry).await {
                Ok(tls) => tls,
                Err(e) => {
                    warn!("TLS handshake with entry failed: {}", e);
                    return;
                }
            };

            let target = match TcpStream::connect(&forward_addr).await {
                Ok(target) => target,
                Err(e) => {
                    warn!("failed to dial target {}: {}", forward_addr, e);
                    return;
                }
            };
            target.set_nodelay(true).ok();
            relay::link(tls, target).await;
        });
    }
}

/// Load a TLS certificate chain from a PEM file.
fn load_certs(path: &str) -> Result<Vec<rustls::pki_types::CertificateDer<'static>>, ForwardError> {
    let mut file = std::io::BufReader::new(std::fs::File::open(path)?);
    let certs: Vec<_> = rustls_pemfile::certs(&mut file)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ForwardError::Tls(format!("failed to parse {}: {}", path, e)))?;
    if certs.is_empty() {
        return Err(ForwardError::Tls(format!("no certificates found in {}", path)));
    }
    Ok(certs)
}

/// Load a TLS private key from a PEM file.
fn load_tls_key(path: &str) -> Result<rustls::pki_types::PrivateKeyDer<'static>, ForwardError> {
    let mut file = std::io::BufReader::new(std::fs::File::open(path)?);
    rustls_pemfile::private_key(&mut file)
        .map_err(|e| ForwardError::Tls(format!("failed to parse {}: {}", path, e)))?
        .ok_or_else(|| ForwardError::Tls(format!("no private key found in {}", path)))
}

/// Derive the SNI to present from the receiver's dial address.
fn receiver_server_name(addr: &str) -> Result<ServerName<'static>, ForwardError> {
    let host = addr.rsplit_once(':').map_or(addr, |(host, _)| host);
    let host = host.trim_start_matches('[').trim_end_matches(']');
    ServerName::try_from(host.to_string())
        .map_err(|e| ForwardError::Tls(format!("invalid receiver address {}: {}", addr, e)))
}

fn insecure_client_config() -> Arc<rustls::ClientConfig> {
    let config = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(SkipVerification::new())
        .with_no_client_auth();
    Arc::new(config)
}

// Certificate verifier that accepts anything. The entry/receiver pair runs
// on self-signed material; confidentiality against passive observers is the
// goal, not receiver authentication.
#[derive(Debug)]
struct SkipVerification;

impl SkipVerification {
    fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

impl rustls::client::danger::ServerCertVerifier for SkipVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        use rustls::SignatureScheme;
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receiver_server_name_from_host_port() {
        assert!(receiver_server_name("receiver.example.com:9443").is_ok());
        assert!(receiver_server_name("10.0.0.7:9443").is_ok());
        assert!(receiver_server_name("[::1]:9443").is_ok());
    }
}
