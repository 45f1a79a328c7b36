//! IV-prefixed AES-CFB framing over a byte stream
//!
//! [`EncryptedStream`] wraps a bidirectional stream and a
//! [`CipherSession`](crate::crypto::CipherSession). The first write emits a
//! fresh IV followed by ciphertext as one coalesced write; the first read
//! consumes exactly the peer's IV before decrypting. There is no length
//! framing, no trailer and no queueing: one read call maps to one underlying
//! read once the IV has been consumed.
//!
//! After an I/O failure the affected half is poisoned and every later call
//! on it returns an error without touching the socket.

use crate::crypto::{CipherSession, CipherTemplate, StreamDecryptor, StreamEncryptor, IV_LEN};
use bytes::BytesMut;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;

fn poisoned_error() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "encrypted stream previously failed")
}

/// A byte stream whose reads and writes are transparently IV-prefixed and
/// XOR-encrypted.
#[derive(Debug)]
pub struct EncryptedStream<S> {
    read: EncryptedReadHalf<S>,
    write: EncryptedWriteHalf<S>,
}

impl<S: AsyncRead + AsyncWrite> EncryptedStream<S> {
    /// Wrap `stream` with per-connection cipher state.
    pub fn new(stream: S, session: CipherSession) -> Self {
        let (read, write) = tokio::io::split(stream);
        EncryptedStream {
            read: EncryptedReadHalf {
                inner: read,
                decryptor: session.decryptor,
                poisoned: false,
            },
            write: EncryptedWriteHalf {
                inner: write,
                encryptor: session.encryptor,
                scratch: BytesMut::new(),
                poisoned: false,
            },
        }
    }
}

impl EncryptedStream<TcpStream> {
    /// Dial `addr` and wrap the connection with a fresh session from
    /// `template`.
    pub async fn connect(addr: &str, template: &CipherTemplate) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(EncryptedStream::new(stream, template.session()))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> EncryptedStream<S> {
    /// Read and decrypt up to `buf.len()` bytes; `Ok(0)` means EOF.
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read.read(buf).await
    }

    /// Encrypt and write all of `data`. The caller's buffer is never
    /// mutated; ciphertext is produced in an internal scratch buffer.
    pub async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.write.write_all(data).await
    }

    /// Split into independently owned halves, one per direction.
    ///
    /// Each half carries its own direction's cipher state, so the two relay
    /// pumps of a session never share mutable state.
    pub fn into_split(self) -> (EncryptedReadHalf<S>, EncryptedWriteHalf<S>) {
        (self.read, self.write)
    }
}

/// Decrypting read half of an [`EncryptedStream`]
#[derive(Debug)]
pub struct EncryptedReadHalf<S> {
    inner: ReadHalf<S>,
    decryptor: StreamDecryptor,
    poisoned: bool,
}

impl<S: AsyncRead + Unpin> EncryptedReadHalf<S> {
    /// Read and decrypt up to `buf.len()` bytes; `Ok(0)` means EOF.
    ///
    /// The first call reads exactly the peer's IV before anything else.
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.poisoned {
            return Err(poisoned_error());
        }
        let result = self.read_inner(buf).await;
        if result.is_err() {
            self.poisoned = true;
        }
        result
    }

    async fn read_inner(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.decryptor.is_started() {
            let mut iv = [0u8; IV_LEN];
            self.inner.read_exact(&mut iv).await?;
            self.decryptor.start(&iv);
        }
        let n = self.inner.read(buf).await?;
        self.decryptor.apply(&mut buf[..n]);
        Ok(n)
    }
}

/// Encrypting write half of an [`EncryptedStream`]
#[derive(Debug)]
pub struct EncryptedWriteHalf<S> {
    inner: WriteHalf<S>,
    encryptor: StreamEncryptor,
    scratch: BytesMut,
    poisoned: bool,
}

impl<S: AsyncWrite + Unpin> EncryptedWriteHalf<S> {
    /// Encrypt and write all of `data`.
    ///
    /// The first call prepends the freshly generated IV so that
    /// `iv || ciphertext` leaves in a single write.
    pub async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        if self.poisoned {
            return Err(poisoned_error());
        }
        let result = self.write_inner(data).await;
        if result.is_err() {
            self.poisoned = true;
        }
        result
    }

    async fn write_inner(&mut self, data: &[u8]) -> io::Result<()> {
        self.scratch.clear();
        if !self.encryptor.is_started() {
            let iv = self.encryptor.start();
            self.scratch.extend_from_slice(&iv);
        }
        let header = self.scratch.len();
        self.scratch.extend_from_slice(data);
        self.encryptor.apply(&mut self.scratch[header..]);
        self.inner.write_all(&self.scratch).await
    }

    /// Shut down the write direction. Errors are ignored; shutting down an
    /// already-closed stream is tolerated.
    pub async fn shutdown(&mut self) {
        let _ = self.inner.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    fn template() -> CipherTemplate {
        CipherTemplate::new("aes-256-cfb", "framed test pw").unwrap()
    }

    #[tokio::test]
    async fn test_first_write_emits_iv_then_ciphertext() {
        let (near, mut far) = duplex(4096);
        let mut stream = EncryptedStream::new(near, template().session());

        stream.write_all(b"hello").await.unwrap();

        let mut wire = [0u8; IV_LEN + 5];
        far.read_exact(&mut wire).await.unwrap();

        // decrypting with the received IV recovers the plaintext
        let mut session = template().session();
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&wire[..IV_LEN]);
        session.decryptor.start(&iv);
        let mut body = wire[IV_LEN..].to_vec();
        session.decryptor.apply(&mut body);
        assert_eq!(&body, b"hello");
    }

    #[tokio::test]
    async fn test_iv_sent_exactly_once() {
        let (near, mut far) = duplex(4096);
        let mut stream = EncryptedStream::new(near, template().session());

        stream.write_all(b"first").await.unwrap();
        stream.write_all(b"second").await.unwrap();
        drop(stream);

        let mut wire = Vec::new();
        far.read_to_end(&mut wire).await.unwrap();
        // 16-byte IV + 5 + 6 bytes of ciphertext, nothing else
        assert_eq!(wire.len(), IV_LEN + 11);

        let mut session = template().session();
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&wire[..IV_LEN]);
        session.decryptor.start(&iv);
        let mut body = wire[IV_LEN..].to_vec();
        session.decryptor.apply(&mut body);
        assert_eq!(&body, b"firstsecond");
    }

    #[tokio::test]
    async fn test_write_does_not_mutate_caller_buffer() {
        let (near, _far) = duplex(4096);
        let mut stream = EncryptedStream::new(near, template().session());

        let data = b"immutable plaintext".to_vec();
        stream.write_all(&data).await.unwrap();
        assert_eq!(data, b"immutable plaintext".to_vec());
    }

    #[tokio::test]
    async fn test_round_trip_between_paired_streams() {
        let (a, b) = duplex(4096);
        let mut alice = EncryptedStream::new(a, template().session());
        let mut bob = EncryptedStream::new(b, template().session());

        alice.write_all(b"ping from alice").await.unwrap();
        let mut buf = [0u8; 64];
        let n = bob.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping from alice");

        bob.write_all(b"pong from bob").await.unwrap();
        let n = alice.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"pong from bob");
    }

    #[tokio::test]
    async fn test_binary_safe_payload() {
        let (a, b) = duplex(8192);
        let mut alice = EncryptedStream::new(a, template().session());
        let mut bob = EncryptedStream::new(b, template().session());

        let payload: Vec<u8> = (0..=255u8).cycle().take(5000).collect();
        alice.write_all(&payload).await.unwrap();

        let mut received = vec![0u8; payload.len()];
        let mut filled = 0;
        while filled < received.len() {
            let n = bob.read(&mut received[filled..]).await.unwrap();
            assert!(n > 0);
            filled += n;
        }
        assert_eq!(received, payload);
    }

    #[tokio::test]
    async fn test_read_eof_before_iv() {
        let (near, far) = duplex(64);
        drop(far);
        let mut stream = EncryptedStream::new(near, template().session());
        let mut buf = [0u8; 16];
        assert!(stream.read(&mut buf).await.is_err());
    }

    #[tokio::test]
    async fn test_poisoned_read_half_stays_failed() {
        let (near, far) = duplex(64);
        drop(far);
        let mut stream = EncryptedStream::new(near, template().session());
        let mut buf = [0u8; 16];
        assert!(stream.read(&mut buf).await.is_err());

        let err = stream.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_split_halves_relay_independently() {
        let (a, b) = duplex(4096);
        let alice = EncryptedStream::new(a, template().session());
        let mut bob = EncryptedStream::new(b, template().session());

        let (mut alice_read, mut alice_write) = alice.into_split();

        alice_write.write_all(b"split write").await.unwrap();
        let mut buf = [0u8; 32];
        let n = bob.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"split write");

        bob.write_all(b"split reply").await.unwrap();
        let n = alice_read.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"split reply");
    }

    #[tokio::test]
    async fn test_shutdown_twice_is_tolerated() {
        let (a, _b) = duplex(64);
        let stream = EncryptedStream::new(a, template().session());
        let (_read, mut write) = stream.into_split();
        write.shutdown().await;
        write.shutdown().await;
    }
}
