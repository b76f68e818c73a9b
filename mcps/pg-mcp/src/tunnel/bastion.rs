//! Authenticated SSH session to the bastion host

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use russh::client;
use russh::Disconnect;
use russh_keys::key::{KeyPair, PublicKey};
use tracing::{info, warn};

use super::engine::{ChannelOpener, RemoteStream};
use super::{TunnelConfig, TunnelError};

/// Client-side session callbacks
pub struct BastionHandler {
    addr: String,
}

#[async_trait]
impl client::Handler for BastionHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        // TODO: check against a known_hosts file once one can be configured
        info!(
            bastion = %self.addr,
            fingerprint = %server_public_key.fingerprint(),
            "Accepting bastion host key"
        );
        Ok(true)
    }
}

/// One authenticated session shared by every forwarded connection
pub struct SshBastion {
    session: client::Handle<BastionHandler>,
    remote_host: String,
    remote_port: u16,
}

impl SshBastion {
    /// Connect and authenticate with `key` within the configured timeout
    pub async fn connect(config: &TunnelConfig, key: KeyPair) -> Result<Self, TunnelError> {
        let addr = config.bastion_addr.clone();
        info!(bastion = %addr, user = %config.bastion_user, "Connecting to bastion host");

        let handshake = async {
            let ssh_config = Arc::new(client::Config::default());
            let handler = BastionHandler { addr: addr.clone() };

            let mut session = client::connect(ssh_config, addr.as_str(), handler)
                .await
                .map_err(|e| TunnelError::BastionConnect {
                    addr: addr.clone(),
                    reason: e.to_string(),
                })?;

            let accepted = session
                .authenticate_publickey(config.bastion_user.clone(), Arc::new(key))
                .await
                .map_err(|e| TunnelError::BastionConnect {
                    addr: addr.clone(),
                    reason: e.to_string(),
                })?;
            if !accepted {
                return Err(TunnelError::AuthRejected(config.bastion_user.clone()));
            }
            Ok::<_, TunnelError>(session)
        };

        let session = tokio::time::timeout(config.connect_timeout, handshake)
            .await
            .map_err(|_| TunnelError::BastionConnect {
                addr: addr.clone(),
                reason: format!("timed out after {}s", config.connect_timeout.as_secs()),
            })??;

        info!(bastion = %addr, "Authenticated to bastion host");

        Ok(Self {
            session,
            remote_host: config.remote_host.clone(),
            remote_port: config.remote_port,
        })
    }
}

#[async_trait]
impl ChannelOpener for SshBastion {
    async fn open_channel(&self, originator: SocketAddr) -> Result<RemoteStream, TunnelError> {
        let channel = self
            .session
            .channel_open_direct_tcpip(
                self.remote_host.clone(),
                u32::from(self.remote_port),
                originator.ip().to_string(),
                u32::from(originator.port()),
            )
            .await
            .map_err(|e| TunnelError::ChannelOpen {
                host: self.remote_host.clone(),
                port: self.remote_port,
                reason: e.to_string(),
            })?;
        Ok(Box::pin(channel.into_stream()))
    }

    fn destination(&self) -> String {
        format!("{}:{}", self.remote_host, self.remote_port)
    }

    async fn close(&self) {
        if let Err(e) = self
            .session
            .disconnect(Disconnect::ByApplication, "tunnel shutdown", "en")
            .await
        {
            warn!("Failed to disconnect from bastion: {}", e);
        }
    }
}
