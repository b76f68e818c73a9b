//! Bidirectional byte relay between a local and a remote stream

use std::fmt;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound for flushing and closing both ends once one direction ends
const CLOSE_GRACE: Duration = Duration::from_secs(5);

const COPY_BUF: usize = 16 * 1024;

/// Which half of a pair finished first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    LocalToRemote,
    RemoteToLocal,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::LocalToRemote => f.write_str("local->remote"),
            Direction::RemoteToLocal => f.write_str("remote->local"),
        }
    }
}

/// How a relay ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    pub finished: Direction,
    /// Bytes copied by the direction that finished
    pub bytes: u64,
    /// Set when that direction ended with an error instead of EOF
    pub error: Option<String>,
}

/// Copy bytes both ways until either direction reaches EOF or fails
///
/// Whichever direction ends first shuts down and drops both streams, so
/// the peer of the other side observes the close too.
pub async fn relay<L, R>(local: L, remote: R) -> RelayOutcome
where
    L: AsyncRead + AsyncWrite,
    R: AsyncRead + AsyncWrite,
{
    let (mut local_rd, mut local_wr) = tokio::io::split(local);
    let (mut remote_rd, mut remote_wr) = tokio::io::split(remote);

    let (finished, (bytes, copied)) = tokio::select! {
        r = pump(&mut local_rd, &mut remote_wr) => (Direction::LocalToRemote, r),
        r = pump(&mut remote_rd, &mut local_wr) => (Direction::RemoteToLocal, r),
    };

    let _ = tokio::time::timeout(CLOSE_GRACE, async {
        let _ = local_wr.shutdown().await;
        let _ = remote_wr.shutdown().await;
    })
    .await;

    RelayOutcome {
        finished,
        bytes,
        error: copied.err().map(|e| e.to_string()),
    }
}

/// Copy `reader` into `writer` until EOF or the first error
///
/// The byte count covers everything written before the copy stopped, even
/// when it stopped on an error.
async fn pump<Rd, Wr>(reader: &mut Rd, writer: &mut Wr) -> (u64, io::Result<()>)
where
    Rd: AsyncRead + Unpin,
    Wr: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; COPY_BUF];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => return (total, Ok(())),
            Ok(n) => n,
            Err(e) => return (total, Err(e)),
        };
        if let Err(e) = writer.write_all(&buf[..n]).await {
            return (total, Err(e));
        }
        total += n as u64;
        if let Err(e) = writer.flush().await {
            return (total, Err(e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    /// Serves `data` once, then fails every read with a reset
    struct ResetAfter {
        data: Option<Vec<u8>>,
    }

    impl AsyncRead for ResetAfter {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            match self.data.take() {
                Some(data) => {
                    buf.put_slice(&data);
                    Poll::Ready(Ok(()))
                }
                None => Poll::Ready(Err(io::ErrorKind::ConnectionReset.into())),
            }
        }
    }

    impl AsyncWrite for ResetAfter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_bytes_flow_both_ways() {
        let (local, mut client) = tokio::io::duplex(64);
        let (remote, mut server) = tokio::io::duplex(64);
        let relay_task = tokio::spawn(relay(local, remote));

        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        server.write_all(b"pong").await.unwrap();
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");

        drop(client);
        let outcome = relay_task.await.unwrap();
        assert_eq!(outcome.finished, Direction::LocalToRemote);
        assert_eq!(outcome.bytes, 4);
        assert!(outcome.error.is_none());

        // The remote side sees EOF once the local side is gone
        let mut rest = Vec::new();
        server.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_remote_close_closes_local() {
        let (local, mut client) = tokio::io::duplex(64);
        let (remote, server) = tokio::io::duplex(64);
        let relay_task = tokio::spawn(relay(local, remote));

        drop(server);
        let outcome = tokio::time::timeout(Duration::from_secs(5), relay_task)
            .await
            .expect("relay should end")
            .unwrap();
        assert_eq!(outcome.finished, Direction::RemoteToLocal);

        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_error_keeps_bytes_already_copied() {
        let local = ResetAfter {
            data: Some(b"hello".to_vec()),
        };
        let (remote, mut server) = tokio::io::duplex(64);

        let outcome = tokio::time::timeout(Duration::from_secs(5), relay(local, remote))
            .await
            .expect("relay should end");
        assert_eq!(outcome.finished, Direction::LocalToRemote);
        assert_eq!(outcome.bytes, 5);
        assert!(outcome.error.is_some());

        let mut forwarded = Vec::new();
        server.read_to_end(&mut forwarded).await.unwrap();
        assert_eq!(forwarded, b"hello");
    }
}
