//! Accept loop and per-connection supervision

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::info;

use super::bastion::SshBastion;
use super::keys::load_private_key;
use super::registry::{ConnectionGuard, ConnectionInfo, ConnectionRegistry};
use super::relay::relay;
use super::{TunnelConfig, TunnelError};
use crate::diagnostics::{DiagnosticEvent, Diagnostics};

/// Pause after a failed accept so a persistent error does not spin
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Byte stream usable as the remote end of a pair
pub trait AsyncStream: AsyncRead + AsyncWrite + Send {}

impl<T: AsyncRead + AsyncWrite + Send> AsyncStream for T {}

pub type RemoteStream = Pin<Box<dyn AsyncStream>>;

/// Opens the remote end for each accepted local connection
#[async_trait]
pub trait ChannelOpener: Send + Sync {
    async fn open_channel(&self, originator: SocketAddr) -> Result<RemoteStream, TunnelError>;

    /// Where channels lead, for diagnostics
    fn destination(&self) -> String;

    /// Release the underlying session
    async fn close(&self) {}
}

pub struct TunnelEngine;

impl TunnelEngine {
    /// Load the key, authenticate to the bastion, bind, then start accepting
    ///
    /// Nothing is bound unless the key and the bastion session are good.
    pub async fn start(
        config: &TunnelConfig,
        diagnostics: Arc<dyn Diagnostics>,
    ) -> Result<TunnelHandle, TunnelError> {
        let key = load_private_key(&config.private_key_path, config.key_passphrase.as_deref())
            .await?;
        let bastion = SshBastion::connect(config, key).await?;

        let listener = match TcpListener::bind(config.local_addr).await {
            Ok(listener) => listener,
            Err(source) => {
                bastion.close().await;
                return Err(TunnelError::Bind {
                    addr: config.local_addr,
                    source,
                });
            }
        };

        Self::serve(listener, Arc::new(bastion), diagnostics)
    }

    /// Run the accept loop on an already bound listener
    pub fn serve(
        listener: TcpListener,
        opener: Arc<dyn ChannelOpener>,
        diagnostics: Arc<dyn Diagnostics>,
    ) -> Result<TunnelHandle, TunnelError> {
        let local_addr = listener.local_addr().map_err(TunnelError::ListenerAddr)?;
        let registry = Arc::new(ConnectionRegistry::new());

        diagnostics.emit(DiagnosticEvent::TunnelListening {
            addr: local_addr,
            destination: opener.destination(),
        });

        let accept_task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&opener),
            Arc::clone(&registry),
            diagnostics,
        ));

        Ok(TunnelHandle {
            local_addr,
            registry,
            opener,
            accept_task,
        })
    }
}

async fn accept_loop(
    listener: TcpListener,
    opener: Arc<dyn ChannelOpener>,
    registry: Arc<ConnectionRegistry>,
    diagnostics: Arc<dyn Diagnostics>,
) {
    loop {
        match listener.accept().await {
            Ok((local, peer)) => {
                let guard = registry.register(peer);
                let conn_id = guard.id();
                let task = tokio::spawn(serve_connection(
                    guard,
                    local,
                    peer,
                    Arc::clone(&opener),
                    Arc::clone(&diagnostics),
                ));
                registry.attach(conn_id, task.abort_handle());
            }
            Err(e) => {
                diagnostics.emit(DiagnosticEvent::AcceptFailed {
                    error: e.to_string(),
                });
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

/// Own one pair from channel open to teardown
async fn serve_connection(
    guard: ConnectionGuard,
    local: TcpStream,
    peer: SocketAddr,
    opener: Arc<dyn ChannelOpener>,
    diagnostics: Arc<dyn Diagnostics>,
) {
    let conn_id = guard.id();

    let remote = match opener.open_channel(peer).await {
        Ok(remote) => remote,
        Err(e) => {
            diagnostics.emit(DiagnosticEvent::ChannelOpenFailed {
                conn_id,
                peer,
                error: e.to_string(),
            });
            return;
        }
    };

    diagnostics.emit(DiagnosticEvent::ConnectionOpened { conn_id, peer });

    let outcome = relay(local, remote).await;

    diagnostics.emit(DiagnosticEvent::ConnectionClosed {
        conn_id,
        peer,
        finished: outcome.finished,
        bytes: outcome.bytes,
        error: outcome.error,
    });
    drop(guard);
}

/// Control handle for a running tunnel
///
/// Dropping the handle leaves the tunnel running; call
/// [`TunnelHandle::shutdown`] to stop it.
pub struct TunnelHandle {
    local_addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    opener: Arc<dyn ChannelOpener>,
    accept_task: JoinHandle<()>,
}

impl TunnelHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn active_connections(&self) -> usize {
        self.registry.len()
    }

    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.registry.snapshot()
    }

    /// Stop accepting, abort every live pair and close the session
    pub async fn shutdown(self) {
        self.accept_task.abort();
        let _ = self.accept_task.await;

        let aborted = self.registry.abort_all();
        info!(
            addr = %self.local_addr,
            aborted,
            "SSH tunnel shut down"
        );

        self.opener.close().await;
    }
}
