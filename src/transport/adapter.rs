//! Session transport adapter.
//!
//! Owns at most one stream plus the inbound byte buffer, and turns every
//! platform failure into [`BurrowError::ServerDown`].

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::{BoxedStream, Connector, Endpoint};
use crate::codec::{Frame, FrameDecoder};
use crate::error::{BurrowError, Result};

const READ_CHUNK: usize = 8 * 1024;

/// Duplex stream to the broker with connect/close policy.
pub struct SessionTransport {
    stream: Option<BoxedStream>,
    inbound: BytesMut,
    decoder: FrameDecoder,
}

impl Default for SessionTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTransport {
    /// Create a transport with no stream.
    pub fn new() -> Self {
        Self {
            stream: None,
            inbound: BytesMut::with_capacity(READ_CHUNK),
            decoder: FrameDecoder::default(),
        }
    }

    /// Wrap an already open stream.
    pub fn from_stream(stream: BoxedStream) -> Self {
        let mut transport = Self::new();
        transport.stream = Some(stream);
        transport
    }

    /// Open a stream to `endpoint`, replacing any current one.
    pub async fn connect(
        &mut self,
        connector: &dyn Connector,
        endpoint: &Endpoint,
        timeout: Duration,
    ) -> Result<()> {
        self.close().await;

        tracing::info!("Connecting to {} via {}", endpoint, connector.name());
        let stream = tokio::time::timeout(timeout, connector.connect(endpoint))
            .await
            .map_err(|_| {
                BurrowError::ServerDown(format!(
                    "Timed out after {}s connecting to {endpoint}",
                    timeout.as_secs_f32()
                ))
            })??;

        self.stream = Some(stream);
        Ok(())
    }

    /// Close the stream. Closing an absent stream is a no-op.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                tracing::debug!("Ignoring error on stream shutdown: {}", e);
            }
        }
        self.inbound.clear();
        self.decoder = FrameDecoder::default();
    }

    /// Whether a stream is currently held.
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Limit inbound frame size (0 = unlimited).
    pub fn set_max_frame(&mut self, max_frame: u32) {
        self.decoder.set_max_frame(max_frame);
    }

    fn stream_mut(&mut self) -> Result<&mut BoxedStream> {
        self.stream.as_mut().ok_or_else(|| {
            BurrowError::Connection("No connection - socket has not been created".to_string())
        })
    }

    /// Write all bytes and flush.
    ///
    /// A failed write drops the stream; [`is_open`](Self::is_open) is false
    /// afterwards.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let stream = self.stream_mut()?;
        let written = match stream.write_all(bytes).await {
            Ok(()) => stream.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            self.discard();
            return Err(e.into());
        }
        Ok(())
    }

    /// Forget a stream that has failed or hit end of stream.
    fn discard(&mut self) {
        self.stream = None;
        self.inbound.clear();
    }

    /// Read until one full frame is buffered and parse it.
    ///
    /// `Ok(None)` means the broker closed the stream cleanly between frames.
    /// End of stream and read failures both drop the stream.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = self.decoder.decode(&mut self.inbound)? {
                return Ok(Some(frame));
            }

            let stream = self.stream.as_mut().ok_or_else(|| {
                BurrowError::Connection("No connection - socket has not been created".to_string())
            })?;
            let n = match stream.read_buf(&mut self.inbound).await {
                Ok(n) => n,
                Err(e) => {
                    self.discard();
                    return Err(e.into());
                },
            };
            if n == 0 {
                let partial = !self.inbound.is_empty();
                self.discard();
                if partial {
                    return Err(BurrowError::ServerDown(
                        "Connection closed in the middle of a frame".to_string(),
                    ));
                }
                return Ok(None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Method;
    use futures::future::BoxFuture;

    struct NeverConnects;

    impl Connector for NeverConnects {
        fn connect<'a>(&'a self, _: &'a Endpoint) -> BoxFuture<'a, Result<BoxedStream>> {
            Box::pin(futures::future::pending())
        }

        fn name(&self) -> &'static str {
            "never"
        }
    }

    #[tokio::test]
    async fn test_connect_timeout_is_server_down() {
        let mut transport = SessionTransport::new();
        let err = transport
            .connect(&NeverConnects, &Endpoint::new("x", 1), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(err.is_server_down());
        assert!(!transport.is_open());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (client, _server) = tokio::io::duplex(64);
        let mut transport = SessionTransport::from_stream(Box::new(client));
        assert!(transport.is_open());
        transport.close().await;
        transport.close().await;
        assert!(!transport.is_open());
    }

    #[tokio::test]
    async fn test_write_without_stream_is_connection_error() {
        let mut transport = SessionTransport::new();
        assert!(transport.write(b"x").await.unwrap_err().is_connection());
    }

    #[tokio::test]
    async fn test_read_frame_across_chunks() {
        let (client, mut server) = tokio::io::duplex(1024);
        let mut transport = SessionTransport::from_stream(Box::new(client));

        let bytes = Frame::method(1, Method::TxSelectOk).encode();
        let (head, tail) = bytes.split_at(5);
        let (head, tail) = (head.to_vec(), tail.to_vec());
        let writer = tokio::spawn(async move {
            server.write_all(&head).await.unwrap();
            tokio::task::yield_now().await;
            server.write_all(&tail).await.unwrap();
            server
        });

        let frame = transport.read_frame().await.unwrap().unwrap();
        assert_eq!(frame, Frame::method(1, Method::TxSelectOk));
        drop(writer.await.unwrap());

        assert!(transport.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_eof_mid_frame_is_server_down() {
        let (client, mut server) = tokio::io::duplex(1024);
        let mut transport = SessionTransport::from_stream(Box::new(client));

        server.write_all(&[1, 0, 1, 0]).await.unwrap();
        drop(server);

        assert!(transport.read_frame().await.unwrap_err().is_server_down());
    }

    #[tokio::test]
    async fn test_failed_write_drops_stream() {
        let (client, server) = tokio::io::duplex(64);
        let mut transport = SessionTransport::from_stream(Box::new(client));
        drop(server);

        assert!(transport.write(b"AMQP").await.unwrap_err().is_server_down());
        assert!(!transport.is_open());
        assert!(transport.write(b"AMQP").await.unwrap_err().is_connection());
    }

    #[tokio::test]
    async fn test_end_of_stream_drops_stream() {
        let (client, server) = tokio::io::duplex(64);
        let mut transport = SessionTransport::from_stream(Box::new(client));
        drop(server);

        assert!(transport.read_frame().await.unwrap().is_none());
        assert!(!transport.is_open());
    }
}
