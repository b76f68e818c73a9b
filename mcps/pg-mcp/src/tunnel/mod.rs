//! SSH tunnel engine
//!
//! Authenticates once to a bastion host, listens on a local port, and for
//! every accepted connection opens a `direct-tcpip` channel to the
//! destination and relays bytes both ways until either side closes.
//!
//! Setup runs in a fixed order (key, bastion, bind) and any failure there
//! is fatal. After setup, failures are confined to the connection that
//! caused them.

mod bastion;
mod engine;
mod keys;
mod registry;
mod relay;

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub use bastion::SshBastion;
pub use engine::{AsyncStream, ChannelOpener, RemoteStream, TunnelEngine, TunnelHandle};
pub use keys::{decode_private_key, load_private_key};
pub use registry::{ConnectionGuard, ConnectionInfo, ConnectionRegistry};
pub use relay::{relay, Direction, RelayOutcome};

/// Everything needed to bring a tunnel up; fixed once the engine starts
#[derive(Clone)]
pub struct TunnelConfig {
    /// `host:port` of the bastion
    pub bastion_addr: String,
    pub bastion_user: String,
    pub private_key_path: PathBuf,
    pub key_passphrase: Option<String>,
    /// Destination as resolved by the bastion
    pub remote_host: String,
    pub remote_port: u16,
    pub local_addr: SocketAddr,
    /// Upper bound for connecting and authenticating to the bastion
    pub connect_timeout: Duration,
}

impl fmt::Debug for TunnelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunnelConfig")
            .field("bastion_addr", &self.bastion_addr)
            .field("bastion_user", &self.bastion_user)
            .field("private_key_path", &self.private_key_path)
            .field(
                "key_passphrase",
                &self.key_passphrase.as_ref().map(|_| "<redacted>"),
            )
            .field("remote_host", &self.remote_host)
            .field("remote_port", &self.remote_port)
            .field("local_addr", &self.local_addr)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// Tunnel failures
///
/// Everything except `ChannelOpen` is a setup failure and stops the engine.
#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("failed to read private key {}: {source}", path.display())]
    KeyRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse private key: {0}")]
    KeyParse(#[source] russh_keys::Error),

    #[error("failed to connect to bastion host {addr}: {reason}")]
    BastionConnect { addr: String, reason: String },

    #[error("bastion rejected public key authentication for user {0}")]
    AuthRejected(String),

    #[error("failed to bind local port {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read listener address: {0}")]
    ListenerAddr(#[source] std::io::Error),

    #[error("failed to open channel to {host}:{port}: {reason}")]
    ChannelOpen {
        host: String,
        port: u16,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_passphrase() {
        let config = TunnelConfig {
            bastion_addr: "bastion:22".to_string(),
            bastion_user: "ops".to_string(),
            private_key_path: PathBuf::from("/keys/id"),
            key_passphrase: Some("hunter2".to_string()),
            remote_host: "db".to_string(),
            remote_port: 5432,
            local_addr: "127.0.0.1:3333".parse().unwrap(),
            connect_timeout: Duration::from_secs(10),
        };
        let printed = format!("{:?}", config);
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn test_error_messages() {
        let err = TunnelError::AuthRejected("ops".to_string());
        assert_eq!(
            err.to_string(),
            "bastion rejected public key authentication for user ops"
        );

        let err = TunnelError::KeyRead {
            path: PathBuf::from("/missing"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(err.to_string().starts_with("failed to read private key /missing"));
    }
}
