//! Tunnel engine tests over loopback TCP
//!
//! A plain TCP opener stands in for the SSH session so the accept loop,
//! relay and supervision run exactly as in production.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pg_mcp::tunnel::{ChannelOpener, RemoteStream};
use pg_mcp::{DiagnosticEvent, RecordingDiagnostics, TunnelConfig, TunnelEngine, TunnelError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const WAIT: Duration = Duration::from_secs(5);

/// Connects every channel to a fixed TCP address
struct TcpOpener {
    target: SocketAddr,
    fail_first: AtomicUsize,
}

impl TcpOpener {
    fn new(target: SocketAddr) -> Arc<Self> {
        Self::failing_first(target, 0)
    }

    fn failing_first(target: SocketAddr, failures: usize) -> Arc<Self> {
        Arc::new(Self {
            target,
            fail_first: AtomicUsize::new(failures),
        })
    }
}

#[async_trait]
impl ChannelOpener for TcpOpener {
    async fn open_channel(&self, _originator: SocketAddr) -> Result<RemoteStream, TunnelError> {
        let remaining = self.fail_first.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_first.store(remaining - 1, Ordering::SeqCst);
            return Err(TunnelError::ChannelOpen {
                host: self.target.ip().to_string(),
                port: self.target.port(),
                reason: "administratively prohibited".to_string(),
            });
        }
        let stream = TcpStream::connect(self.target)
            .await
            .map_err(|e| TunnelError::ChannelOpen {
                host: self.target.ip().to_string(),
                port: self.target.port(),
                reason: e.to_string(),
            })?;
        Ok(Box::pin(stream))
    }

    fn destination(&self) -> String {
        self.target.to_string()
    }
}

async fn echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut rd, mut wr) = stream.split();
                let _ = tokio::io::copy(&mut rd, &mut wr).await;
            });
        }
    });
    addr
}

/// Accepts connections and closes them right away
async fn hangup_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            drop(stream);
        }
    });
    addr
}

async fn local_listener() -> TcpListener {
    TcpListener::bind("127.0.0.1:0").await.unwrap()
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_forwarded_bytes_keep_order() {
    let target = echo_server().await;
    let diagnostics = Arc::new(RecordingDiagnostics::new());
    let handle =
        TunnelEngine::serve(local_listener().await, TcpOpener::new(target), diagnostics.clone())
            .unwrap();

    let payload: Vec<u8> = (0..64 * 1024).map(|i| (i % 251) as u8).collect();
    let client = TcpStream::connect(handle.local_addr()).await.unwrap();
    let (mut rd, mut wr) = client.into_split();

    let to_send = payload.clone();
    let writer = tokio::spawn(async move {
        wr.write_all(&to_send).await.unwrap();
        wr
    });

    let mut echoed = vec![0u8; payload.len()];
    tokio::time::timeout(WAIT, rd.read_exact(&mut echoed))
        .await
        .expect("echo within timeout")
        .unwrap();
    assert_eq!(echoed, payload);

    assert_eq!(handle.active_connections(), 1);
    assert_eq!(handle.connections()[0].id, 1);

    drop(writer.await.unwrap());
    drop(rd);
    wait_until(|| handle.active_connections() == 0).await;

    assert!(diagnostics
        .events()
        .iter()
        .any(|e| matches!(e, DiagnosticEvent::TunnelListening { .. })));
    handle.shutdown().await;
}

#[tokio::test]
async fn test_remote_close_closes_local() {
    let target = hangup_server().await;
    let diagnostics = Arc::new(RecordingDiagnostics::new());
    let handle =
        TunnelEngine::serve(local_listener().await, TcpOpener::new(target), diagnostics.clone())
            .unwrap();

    let mut client = TcpStream::connect(handle.local_addr()).await.unwrap();
    let mut rest = Vec::new();
    let read = tokio::time::timeout(WAIT, client.read_to_end(&mut rest))
        .await
        .expect("local side should close");
    assert!(read.is_ok());
    assert!(rest.is_empty());

    wait_until(|| {
        diagnostics.count(|e| matches!(e, DiagnosticEvent::ConnectionClosed { .. })) == 1
    })
    .await;
    handle.shutdown().await;
}

#[tokio::test]
async fn test_channel_failure_is_isolated() {
    let target = echo_server().await;
    let diagnostics = Arc::new(RecordingDiagnostics::new());
    let handle = TunnelEngine::serve(
        local_listener().await,
        TcpOpener::failing_first(target, 1),
        diagnostics.clone(),
    )
    .unwrap();

    // First connection: channel refused, only this socket is closed
    let mut rejected = TcpStream::connect(handle.local_addr()).await.unwrap();
    let mut buf = [0u8; 16];
    let n = tokio::time::timeout(WAIT, rejected.read(&mut buf))
        .await
        .expect("rejected connection should close")
        .unwrap_or(0);
    assert_eq!(n, 0);
    assert_eq!(
        diagnostics.count(|e| matches!(e, DiagnosticEvent::ChannelOpenFailed { conn_id: 1, .. })),
        1
    );

    // Second connection: the accept loop is still serving
    let mut client = TcpStream::connect(handle.local_addr()).await.unwrap();
    client.write_all(b"still alive").await.unwrap();
    let mut echoed = [0u8; 11];
    tokio::time::timeout(WAIT, client.read_exact(&mut echoed))
        .await
        .expect("echo within timeout")
        .unwrap();
    assert_eq!(&echoed, b"still alive");

    handle.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_closes_live_pairs() {
    let target = echo_server().await;
    let diagnostics = Arc::new(RecordingDiagnostics::new());
    let handle =
        TunnelEngine::serve(local_listener().await, TcpOpener::new(target), diagnostics)
            .unwrap();
    let local_addr = handle.local_addr();

    let mut client = TcpStream::connect(local_addr).await.unwrap();
    client.write_all(b"x").await.unwrap();
    let mut one = [0u8; 1];
    client.read_exact(&mut one).await.unwrap();
    assert_eq!(handle.active_connections(), 1);

    handle.shutdown().await;

    let mut rest = Vec::new();
    let _ = tokio::time::timeout(WAIT, client.read_to_end(&mut rest))
        .await
        .expect("pair should be torn down");

    // The listener is gone too
    assert!(TcpListener::bind(local_addr).await.is_ok());
}

fn tunnel_config(local_addr: SocketAddr, key: PathBuf) -> TunnelConfig {
    TunnelConfig {
        bastion_addr: "127.0.0.1:1".to_string(),
        bastion_user: "ops".to_string(),
        private_key_path: key,
        key_passphrase: None,
        remote_host: "db.internal".to_string(),
        remote_port: 5432,
        local_addr,
        connect_timeout: Duration::from_secs(1),
    }
}

/// An address that was free a moment ago
async fn free_addr() -> SocketAddr {
    local_listener().await.local_addr().unwrap()
}

#[tokio::test]
async fn test_missing_key_binds_nothing() {
    let local_addr = free_addr().await;
    let dir = tempfile::tempdir().unwrap();
    let config = tunnel_config(local_addr, dir.path().join("id_missing"));

    let diagnostics = Arc::new(RecordingDiagnostics::new());
    let err = match TunnelEngine::start(&config, diagnostics.clone()).await {
        Ok(_) => panic!("tunnel should not start"),
        Err(e) => e,
    };

    assert!(matches!(err, TunnelError::KeyRead { .. }));
    assert!(err.to_string().contains("failed to read private key"));
    assert!(diagnostics.events().is_empty());
    assert!(TcpListener::bind(local_addr).await.is_ok());
}

#[tokio::test]
async fn test_garbage_key_binds_nothing() {
    let local_addr = free_addr().await;
    let dir = tempfile::tempdir().unwrap();
    let key = dir.path().join("id_garbage");
    std::fs::write(&key, "-----BEGIN NOTHING-----\nAAAA\n-----END NOTHING-----\n").unwrap();

    let diagnostics = Arc::new(RecordingDiagnostics::new());
    let err = match TunnelEngine::start(&tunnel_config(local_addr, key), diagnostics).await {
        Ok(_) => panic!("tunnel should not start"),
        Err(e) => e,
    };

    assert!(matches!(err, TunnelError::KeyParse(_)));
    assert!(TcpListener::bind(local_addr).await.is_ok());
}
