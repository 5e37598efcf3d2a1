//! Transport layer for the session.
//!
//! The session talks to the broker over a single duplex byte stream.
//! [`Connector`] is the seam that produces those streams:
//! - **TCP**: [`TcpConnector`], the production backend
//! - **In-memory**: any `AsyncRead + AsyncWrite` pair, e.g. `tokio::io::duplex`
//!   in tests
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │               Session                    │
//! └──────────────────┬──────────────────────┘
//!                    │ frames
//!          ┌─────────┴─────────┐
//!          │ SessionTransport  │  timeout, buffering, error mapping
//!          └─────────┬─────────┘
//!                    │ bytes
//!          ┌─────────┴─────────┐
//!          │    Connector      │  TcpConnector / test doubles
//!          └───────────────────┘
//! ```

mod adapter;
mod tcp;

pub use adapter::SessionTransport;
pub use tcp::TcpConnector;

use std::fmt;

use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::codec::PORT;
use crate::error::{BurrowError, Result};

/// A duplex byte stream to the broker.
pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

/// Owned, type-erased stream.
pub type BoxedStream = Box<dyn Stream>;

/// Broker address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host name or IP
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl Endpoint {
    /// Create an endpoint.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse a `host[:port]` string as carried by connection.redirect.
    ///
    /// IPv6 literals take a port only in bracketed form (`[::1]:5673`); a
    /// bare literal such as `::1` is a host on the default port. A missing
    /// port falls back to the default broker port.
    pub fn parse(s: &str) -> Result<Self> {
        let invalid_port = || BurrowError::Protocol(format!("Invalid port in address '{s}'"));

        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| BurrowError::Protocol(format!("Unclosed '[' in address '{s}'")))?;
            let port = match tail {
                "" => PORT,
                _ => tail
                    .strip_prefix(':')
                    .and_then(|p| p.parse::<u16>().ok())
                    .ok_or_else(invalid_port)?,
            };
            (host, port)
        } else {
            match s.rsplit_once(':') {
                Some((host, _)) if host.contains(':') => (s, PORT),
                Some((host, port)) => (host, port.parse::<u16>().map_err(|_| invalid_port())?),
                None => (s, PORT),
            }
        };

        if host.is_empty() {
            return Err(BurrowError::Protocol(format!("Missing host in address '{s}'")));
        }

        Ok(Self::new(host, port))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Opens streams to a broker.
///
/// Implementations do not apply the connect timeout themselves;
/// [`SessionTransport::connect`] wraps every attempt in one.
pub trait Connector: Send + Sync {
    /// Open a new stream to `endpoint`.
    fn connect<'a>(&'a self, endpoint: &'a Endpoint) -> BoxFuture<'a, Result<BoxedStream>>;

    /// Get the connector name for logging.
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_parse_with_port() {
        let ep = Endpoint::parse("broker2:5673").unwrap();
        assert_eq!(ep, Endpoint::new("broker2", 5673));
        assert_eq!(ep.to_string(), "broker2:5673");
    }

    #[test]
    fn test_endpoint_parse_default_port() {
        assert_eq!(Endpoint::parse("broker3").unwrap().port, 5672);
    }

    #[test]
    fn test_endpoint_parse_rejects_garbage() {
        assert!(Endpoint::parse("broker:http").unwrap_err().is_protocol());
        assert!(Endpoint::parse(":5672").unwrap_err().is_protocol());
    }

    #[test]
    fn test_endpoint_parse_ipv6() {
        let ep = Endpoint::parse("[::1]:5673").unwrap();
        assert_eq!(ep, Endpoint::new("::1", 5673));
        assert_eq!(ep.to_string(), "[::1]:5673");

        assert_eq!(Endpoint::parse("[fe80::2]").unwrap(), Endpoint::new("fe80::2", 5672));
        assert_eq!(Endpoint::parse("::1").unwrap(), Endpoint::new("::1", 5672));
    }

    #[test]
    fn test_endpoint_parse_rejects_bad_brackets() {
        assert!(Endpoint::parse("[::1").unwrap_err().is_protocol());
        assert!(Endpoint::parse("[::1]5673").unwrap_err().is_protocol());
        assert!(Endpoint::parse("[]:5672").unwrap_err().is_protocol());
    }
}
