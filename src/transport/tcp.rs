//! TCP transport implementation.
//!
//! Plain TCP to the broker with Nagle's algorithm disabled where the
//! platform allows it.

use futures::future::BoxFuture;
use tokio::net::TcpStream;

use super::{BoxedStream, Connector, Endpoint};
use crate::error::{BurrowError, Result};

/// TCP connector using tokio's `TcpStream`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl TcpConnector {
    /// Create a new TCP connector.
    pub fn new() -> Self {
        Self
    }
}

impl Connector for TcpConnector {
    fn connect<'a>(&'a self, endpoint: &'a Endpoint) -> BoxFuture<'a, Result<BoxedStream>> {
        Box::pin(async move {
            let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
                .await
                .map_err(|e| BurrowError::ServerDown(format!("Failed to connect to {endpoint}: {e}")))?;

            if let Err(e) = stream.set_nodelay(true) {
                tracing::debug!("TCP_NODELAY not applied on {}: {}", endpoint, e);
            }

            Ok(Box::new(stream) as BoxedStream)
        })
    }

    fn name(&self) -> &'static str {
        "TCP"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tcp_connect_local_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let endpoint = Endpoint::new("127.0.0.1", port);
        let connector = TcpConnector::new();
        let (stream, accepted) = tokio::join!(connector.connect(&endpoint), listener.accept());
        assert!(stream.is_ok());
        assert!(accepted.is_ok());
        assert_eq!(connector.name(), "TCP");
    }

    #[tokio::test]
    async fn test_tcp_connect_refused_is_server_down() {
        // Grab a free port, then close the listener so nothing is there.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let endpoint = Endpoint::new("127.0.0.1", port);
        let err = TcpConnector::new().connect(&endpoint).await.err().unwrap();
        assert!(err.is_server_down());
    }
}
