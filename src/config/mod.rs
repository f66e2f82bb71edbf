//! Configuration management
//!
//! Every daemon loads a small JSON file once per supervisor iteration. The
//! key names are camelCase on disk; both tunnel peers must carry identical
//! `yamux` settings.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio_yamux::config::Config as SessionConfig;

/// Multiplex session settings, shared verbatim by both tunnel peers.
///
/// All durations are milliseconds on disk. A `maxStreamWindowSize` of zero
/// keeps the library default; a `maxConcurrentConnections` of zero means
/// unlimited streams.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MuxSettings {
    pub accept_backlog: u32,
    pub enable_keep_alive: bool,
    pub keep_alive_interval: u64,
    pub connection_write_timeout: u64,
    pub max_stream_window_size: u32,
    pub max_concurrent_connections: u32,
}

impl Default for MuxSettings {
    fn default() -> Self {
        Self {
            accept_backlog: 256,
            enable_keep_alive: true,
            keep_alive_interval: 30_000,
            connection_write_timeout: 10_000,
            max_stream_window_size: 0,
            max_concurrent_connections: 0,
        }
    }
}

impl MuxSettings {
    /// Build the session configuration handed to the multiplexer.
    pub fn session_config(&self) -> SessionConfig {
        let mut cfg = SessionConfig::default();
        if self.accept_backlog > 0 {
            cfg.accept_backlog = self.accept_backlog as usize;
        }
        cfg.enable_keepalive = self.enable_keep_alive;
        cfg.keepalive_interval = Duration::from_millis(self.keep_alive_interval);
        cfg.connection_write_timeout = Duration::from_millis(self.connection_write_timeout);
        if self.max_stream_window_size > 0 {
            cfg.max_stream_window_size = self.max_stream_window_size;
        }
        cfg
    }
}

/// Public endpoint configuration (the reachable peer).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicConfig {
    /// Bind address for the single inbound tunnel connection
    pub tunnel_listen_addr: String,
    /// Bind addresses for external users; each is opened independently
    #[serde(default)]
    pub user_listen_addr: Vec<String>,
    #[serde(default)]
    pub yamux: MuxSettings,
    /// RSA private key, PEM (PKCS#1 or PKCS#8)
    pub private_key_path: String,
    pub secret_token: String,
    /// When false, the tunnel carries exactly one user session at a time
    #[serde(default)]
    pub use_mux: bool,
}

impl PublicConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let cfg: Self = read_json(path.as_ref())?;
        if !cfg.use_mux && cfg.user_listen_addr.len() > 1 {
            return Err(crate::Error::Config(
                "useMux = false supports a single userListenAddr entry".to_string(),
            ));
        }
        Ok(cfg)
    }
}

/// Private endpoint configuration (the peer behind NAT).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateConfig {
    /// Address of the public endpoint's tunnel listener
    pub tunnel_server_addr: String,
    /// Local target services, selected round-robin per stream
    pub local_listen_addr: Vec<String>,
    #[serde(default)]
    pub yamux: MuxSettings,
    /// RSA public key, PEM (PKIX SubjectPublicKeyInfo)
    pub public_key_path: String,
    pub secret_token: String,
    #[serde(default)]
    pub use_mux: bool,
}

impl PrivateConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let cfg: Self = read_json(path.as_ref())?;
        if cfg.local_listen_addr.is_empty() {
            return Err(crate::Error::Config(
                "localListenAddr must name at least one target".to_string(),
            ));
        }
        Ok(cfg)
    }
}

/// Entry-side configuration of the TLS forwarder pair.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryConfig {
    /// Plaintext bind address
    pub local_addr: String,
    /// TLS dial target (the receiver daemon)
    pub receiver_addr: String,
}

impl EntryConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        read_json(path.as_ref())
    }
}

/// Receiver-side configuration of the TLS forwarder pair.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiverConfig {
    /// TLS bind address
    pub listen_addr: String,
    /// Plaintext dial target (the exposed service)
    pub forward_addr: String,
    pub cert_file: String,
    pub key_file: String,
}

impl ReceiverConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        read_json(path.as_ref())
    }
}

/// Plain TCP forwarder configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardConfig {
    pub local_addr: String,
    pub remote_addr: String,
}

impl ForwardConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        read_json(path.as_ref())
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> crate::Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| crate::Error::Config(format!("failed to read {}: {}", path.display(), e)))?;

    serde_json::from_str(&content)
        .map_err(|e| crate::Error::Config(format!("failed to parse {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("burrow-cfg-{}-{}", std::process::id(), name));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_public_config_camel_case() {
        let path = write_temp(
            "public.json",
            r#"{
                "tunnelListenAddr": "0.0.0.0:7000",
                "userListenAddr": ["0.0.0.0:8080", "0.0.0.0:8081"],
                "yamux": { "keepAliveInterval": 15000, "maxConcurrentConnections": 8 },
                "privateKeyPath": "/etc/burrow/private.pem",
                "secretToken": "s",
                "useMux": true
            }"#,
        );

        let cfg = PublicConfig::load(&path).unwrap();
        assert_eq!(cfg.tunnel_listen_addr, "0.0.0.0:7000");
        assert_eq!(cfg.user_listen_addr.len(), 2);
        assert!(cfg.use_mux);
        assert_eq!(cfg.yamux.keep_alive_interval, 15_000);
        assert_eq!(cfg.yamux.max_concurrent_connections, 8);
        // Untouched fields keep their defaults
        assert_eq!(cfg.yamux.accept_backlog, 256);
        assert!(cfg.yamux.enable_keep_alive);
    }

    #[test]
    fn test_use_mux_defaults_off() {
        let path = write_temp(
            "public-nomux.json",
            r#"{
                "tunnelListenAddr": "0.0.0.0:7000",
                "userListenAddr": ["0.0.0.0:8080"],
                "privateKeyPath": "k.pem",
                "secretToken": "s"
            }"#,
        );

        let cfg = PublicConfig::load(&path).unwrap();
        assert!(!cfg.use_mux);
    }

    #[test]
    fn test_reject_multiple_listeners_without_mux() {
        let path = write_temp(
            "public-bad.json",
            r#"{
                "tunnelListenAddr": "0.0.0.0:7000",
                "userListenAddr": ["0.0.0.0:8080", "0.0.0.0:8081"],
                "privateKeyPath": "k.pem",
                "secretToken": "s",
                "useMux": false
            }"#,
        );

        assert!(PublicConfig::load(&path).is_err());
    }

    #[test]
    fn test_reject_empty_local_targets() {
        let path = write_temp(
            "private-bad.json",
            r#"{
                "tunnelServerAddr": "example.com:7000",
                "localListenAddr": [],
                "publicKeyPath": "k.pem",
                "secretToken": "s",
                "useMux": true
            }"#,
        );

        assert!(PrivateConfig::load(&path).is_err());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = PublicConfig::load("/nonexistent/burrow.json").unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_session_config_conversion() {
        let settings = MuxSettings {
            keep_alive_interval: 5_000,
            connection_write_timeout: 2_000,
            max_stream_window_size: 512 * 1024,
            ..MuxSettings::default()
        };

        let cfg = settings.session_config();
        assert_eq!(cfg.keepalive_interval, Duration::from_secs(5));
        assert_eq!(cfg.connection_write_timeout, Duration::from_secs(2));
        assert_eq!(cfg.max_stream_window_size, 512 * 1024);
    }
}
