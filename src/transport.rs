// Distributed under the MIT software license.

//! One-envelope-per-send/recv framing over a TCP stream.
//!
//! Grounded on `original_source/src/autoc/client.cpp` (`fd_wait::waitFor`:
//! a ~1s readability wait, short/zero read means the peer closed) and
//! `net/encrypted.rs` (`tokio::io::{split, AsyncReadExt, AsyncWriteExt}`,
//! `EncryptedStream`-style owned read/write halves).
//!
//! No length prefix is used — the receiver reads up to the fixed envelope
//! size and decrypts whatever arrived, preserving the original's
//! one-envelope-per-TCP-segment assumption. Under segment coalescing or
//! fragmentation this can misframe; a length-prefix upgrade is out of
//! scope.

use crate::types::ENVELOPE_LEN;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// How long [`recv`] waits for a readable envelope before reporting
/// [`TransportError::Timeout`].
pub const RECV_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("peer closed the connection")]
    PeerClosed,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Thin framing layer around one TCP stream: exactly one sealed envelope
/// per `send`/`recv`.
pub struct FramedTransport {
    stream: TcpStream,
}

impl FramedTransport {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub fn into_inner(self) -> TcpStream {
        self.stream
    }

    /// Wait up to [`RECV_TIMEOUT`] for one envelope. `Ok(None)` on timeout
    /// (not an error — the caller simply has nothing to process yet).
    pub async fn recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut buf = vec![0u8; ENVELOPE_LEN];
        match tokio::time::timeout(RECV_TIMEOUT, self.stream.read_exact(&mut buf)).await {
            Ok(Ok(_)) => Ok(Some(buf)),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(TransportError::PeerClosed)
            }
            Ok(Err(e)) => Err(TransportError::Io(e)),
            Err(_elapsed) => Ok(None),
        }
    }

    /// Send exactly one envelope.
    pub async fn send(&mut self, envelope: &[u8]) -> Result<(), TransportError> {
        self.stream.write_all(envelope).await?;
        self.stream.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn send_then_recv_round_trips() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut t = FramedTransport::new(stream);
            t.recv().await.unwrap().unwrap()
        });

        let client_stream = TcpStream::connect(addr).await.unwrap();
        let mut client = FramedTransport::new(client_stream);
        let payload = vec![7u8; ENVELOPE_LEN];
        client.send(&payload).await.unwrap();

        let received = server.await.unwrap();
        assert_eq!(received, payload);
    }

    #[tokio::test]
    async fn recv_times_out_with_no_data() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut t = FramedTransport::new(stream);
            t.recv().await
        });

        let _client_stream = TcpStream::connect(addr).await.unwrap();
        let result = server.await.unwrap().unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn peer_close_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut t = FramedTransport::new(stream);
            t.recv().await
        });

        let client_stream = TcpStream::connect(addr).await.unwrap();
        drop(client_stream);

        let result = server.await.unwrap();
        assert!(matches!(result, Err(TransportError::PeerClosed)));
    }
}
