//! Burrow error types.
//!
//! # Error Classification
//!
//! Session operations fail with one of three kinds:
//!
//! - **ServerDown**: the transport failed (connect timeout, broken pipe,
//!   read/write error). Terminal for the current connection attempt; the
//!   caller may reconnect.
//! - **Protocol**: the broker replied with something the current protocol
//!   step does not allow (wrong method, no reply, undecodable frame).
//! - **Connection**: the broker redirected while `insist` was requested, or
//!   an operation needed a socket that does not exist.
//!
//! `Config` covers option loading and is never raised by the session itself.

use thiserror::Error;

/// Burrow session errors.
#[derive(Error, Debug)]
pub enum BurrowError {
    /// Transport-level failure.
    #[error("Server down: {0}")]
    ServerDown(String),

    /// A received command did not match what the protocol step required.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Redirect refused under `insist`, or no socket available.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias for Burrow operations
pub type Result<T> = std::result::Result<T, BurrowError>;

impl BurrowError {
    /// True for transport failures.
    pub fn is_server_down(&self) -> bool {
        matches!(self, Self::ServerDown(_))
    }

    /// True for protocol violations.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }

    /// True for refused redirects and missing sockets.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

// Platform I/O errors never escape the session layer as-is.
impl From<std::io::Error> for BurrowError {
    fn from(err: std::io::Error) -> Self {
        BurrowError::ServerDown(err.to_string())
    }
}

impl From<toml::de::Error> for BurrowError {
    fn from(err: toml::de::Error) -> Self {
        BurrowError::Config(err.to_string())
    }
}
