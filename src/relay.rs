//! Bidirectional relay between two streams
//!
//! A session is two half-duplex pumps, one per direction, each owning one
//! read half and the opposite stream's write half. A pump loops reading
//! into a pooled buffer under an optional deadline and writing exactly what
//! it read. When a pump stops, for EOF, timeout or write failure, it shuts
//! down its sink so the companion pump unblocks promptly. The session is
//! over when both pumps have returned.

use crate::framed::{EncryptedReadHalf, EncryptedWriteHalf};
use crate::pool;
use async_trait::async_trait;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tracing::debug;

/// Source side of a relay pump
#[async_trait]
pub trait RelayRead: Send {
    /// Read up to `buf.len()` bytes; `Ok(0)` means EOF
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Read exactly `buf.len()` bytes or fail with `UnexpectedEof`
    async fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..]).await?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream ended mid-record",
                ));
            }
            filled += n;
        }
        Ok(())
    }
}

/// Sink side of a relay pump
#[async_trait]
pub trait RelayWrite: Send {
    /// Write all of `buf`
    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Close the write direction; duplicate shutdown is tolerated
    async fn shutdown(&mut self);
}

#[async_trait]
impl<S: AsyncRead + Send> RelayRead for ReadHalf<S> {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        AsyncReadExt::read(self, buf).await
    }
}

#[async_trait]
impl<S: AsyncWrite + Send> RelayWrite for WriteHalf<S> {
    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        AsyncWriteExt::write_all(self, buf).await
    }

    async fn shutdown(&mut self) {
        let _ = AsyncWriteExt::shutdown(self).await;
    }
}

#[async_trait]
impl<S: AsyncRead + Unpin + Send> RelayRead for EncryptedReadHalf<S> {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        EncryptedReadHalf::read(self, buf).await
    }
}

#[async_trait]
impl<S: AsyncWrite + Unpin + Send> RelayWrite for EncryptedWriteHalf<S> {
    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        EncryptedWriteHalf::write_all(self, buf).await
    }

    async fn shutdown(&mut self) {
        EncryptedWriteHalf::shutdown(self).await;
    }
}

// In-memory source, used to re-parse captured wire bytes
#[async_trait]
impl RelayRead for &[u8] {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.len().min(buf.len());
        let (head, tail) = self.split_at(n);
        buf[..n].copy_from_slice(head);
        *self = tail;
        Ok(n)
    }
}

/// Run `fut` under the configured read deadline, if any.
///
/// Expiry surfaces as a `TimedOut` I/O error, exactly like any other read
/// failure.
pub async fn with_read_deadline<F: Future>(
    deadline: Option<Duration>,
    fut: F,
) -> io::Result<F::Output> {
    match deadline {
        Some(d) => tokio::time::timeout(d, fut)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "read deadline exceeded")),
        None => Ok(fut.await),
    }
}

/// Copy from `src` to `dst` until EOF, timeout or error, then close `dst`.
async fn pump<R: RelayRead, W: RelayWrite>(mut src: R, mut dst: W, deadline: Option<Duration>) {
    let mut buf = pool::get();
    loop {
        let read = with_read_deadline(deadline, src.read(&mut buf))
            .await
            .and_then(|r| r);
        match read {
            Ok(0) => break,
            Ok(n) => {
                if let Err(e) = dst.write_all(&buf[..n]).await {
                    debug!("relay write: {}", e);
                    break;
                }
            }
            Err(e) => {
                debug!("relay read: {}", e);
                break;
            }
        }
    }
    pool::put(buf);
    dst.shutdown().await;
}

/// Relay bidirectionally between stream `a` (its read and write halves) and
/// stream `b`, returning once both directions have terminated.
pub async fn relay<AR, AW, BR, BW>(
    a_read: AR,
    a_write: AW,
    b_read: BR,
    b_write: BW,
    deadline: Option<Duration>,
) where
    AR: RelayRead + 'static,
    AW: RelayWrite + 'static,
    BR: RelayRead + 'static,
    BW: RelayWrite + 'static,
{
    let forward = tokio::spawn(pump(a_read, b_write, deadline));
    let backward = tokio::spawn(pump(b_read, a_write, deadline));
    let _ = tokio::join!(forward, backward);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_relay_passes_bytes_both_ways() {
        let (mut client, near) = duplex(4096);
        let (mut target, far) = duplex(4096);

        let (near_read, near_write) = tokio::io::split(near);
        let (far_read, far_write) = tokio::io::split(far);
        let session = tokio::spawn(relay(near_read, near_write, far_read, far_write, None));

        client.write_all(b"request bytes").await.unwrap();
        let mut buf = [0u8; 13];
        target.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"request bytes");

        target.write_all(b"response bytes").await.unwrap();
        let mut buf = [0u8; 14];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"response bytes");

        drop(client);
        drop(target);
        tokio::time::timeout(Duration::from_secs(1), session)
            .await
            .expect("relay should finish after both sides close")
            .unwrap();
    }

    #[tokio::test]
    async fn test_relay_is_binary_safe() {
        let (mut client, near) = duplex(16384);
        let (mut target, far) = duplex(16384);

        let (near_read, near_write) = tokio::io::split(near);
        let (far_read, far_write) = tokio::io::split(far);
        tokio::spawn(relay(near_read, near_write, far_read, far_write, None));

        let payload: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        client.write_all(&payload).await.unwrap();

        let mut received = vec![0u8; payload.len()];
        target.read_exact(&mut received).await.unwrap();
        assert_eq!(received, payload);
    }

    #[tokio::test]
    async fn test_relay_ends_when_idle_past_deadline() {
        let (client, near) = duplex(4096);
        let (target, far) = duplex(4096);

        let (near_read, near_write) = tokio::io::split(near);
        let (far_read, far_write) = tokio::io::split(far);
        let session = tokio::spawn(relay(
            near_read,
            near_write,
            far_read,
            far_write,
            Some(Duration::from_millis(50)),
        ));

        // no traffic at all: both pumps hit their read deadline
        tokio::time::timeout(Duration::from_secs(1), session)
            .await
            .expect("idle relay should tear down")
            .unwrap();
        drop(client);
        drop(target);
    }

    #[tokio::test]
    async fn test_relay_shuts_down_peer_after_one_side_closes() {
        let (mut client, near) = duplex(4096);
        let (mut target, far) = duplex(4096);

        let (near_read, near_write) = tokio::io::split(near);
        let (far_read, far_write) = tokio::io::split(far);
        tokio::spawn(relay(near_read, near_write, far_read, far_write, None));

        client.write_all(b"last words").await.unwrap();
        drop(client);

        // the target drains the payload and then observes EOF
        let mut collected = Vec::new();
        target.read_to_end(&mut collected).await.unwrap();
        assert_eq!(&collected, b"last words");
    }

    #[tokio::test]
    async fn test_read_exact_default_impl() {
        let mut src: &[u8] = b"abcdef";
        let mut buf = [0u8; 4];
        RelayRead::read_exact(&mut src, &mut buf).await.unwrap();
        assert_eq!(&buf, b"abcd");

        let mut short: &[u8] = b"xy";
        let err = RelayRead::read_exact(&mut short, &mut buf)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_with_read_deadline_none_never_times_out() {
        let value = with_read_deadline(None, async { 42 }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_with_read_deadline_expires() {
        let err = with_read_deadline(
            Some(Duration::from_millis(10)),
            std::future::pending::<()>(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }
}
