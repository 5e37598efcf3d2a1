//! # Burrow - AMQP 0-8 Client Session Core
//!
//! Async client side of an AMQP 0-8 broker connection: handshake, tuning,
//! redirects, access tickets, channel multiplexing and the small synchronous
//! sub-protocols (quality of service, transactions, recover).
//!
//! ## Features
//!
//! - **Handshake**: protocol header, start/start-ok, tune/tune-ok, open
//! - **Redirects**: follows `connection.redirect` unless `insist` is set
//! - **Access tickets**: requested after the first channel opens, stamped on
//!   every method that carries one
//! - **Channel registry**: closed channel numbers are reused before new ones
//! - **Traffic logging**: every frame in and out, toggled at runtime
//!
//! ## Protocol Overview
//!
//! ### Architecture
//!
//! ```text
//! Application                   Session                          Broker
//!    |                             |                               |
//!    |------ connect() ----------->|------ handshake ------------->|
//!    |                             |<----- open-ok / redirect -----|
//!    |                             |------ channel.open ---------->|
//!    |                             |------ access.request -------->|
//!    |<----- Connected ------------|                               |
//!    |                             |                               |
//!    |------ qos()/tx_*() -------->|====== request / reply ======>|
//!    |<----- Confirmation ---------|                               |
//!    |                             |                               |
//!    |------ close() ------------->|------ channel/connection.close|
//! ```
//!
//! ### Frame Types
//!
//! | Type      | Code | Channel     | Purpose                      |
//! |-----------|------|-------------|------------------------------|
//! | Method    | 1    | any         | Class/method call            |
//! | Header    | 2    | non-control | Content header               |
//! | Body      | 3    | non-control | Content body                 |
//! | Heartbeat | 8    | 0           | Keep-alive                   |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use burrow::{Config, QosOptions, Session};
//!
//! let mut config = Config::default();
//! config.connection = config.connection.with_addr("broker.local", 5672);
//!
//! let mut session = Session::new(config);
//! session.connect().await?;
//! println!("ticket: {:?}", session.ticket());
//!
//! session.qos(QosOptions { prefetch_count: 10, ..Default::default() }).await?;
//! session.tx_select().await?;
//! session.tx_commit().await?;
//! session.close().await?;
//! ```
//!
//! ## Modules
//!
//! - [`codec`]: Frame, method and field-table encoding
//! - [`transport`]: Stream connectors and the framed session transport
//! - [`session`]: Handshake, channels and the session lifecycle
//! - [`config`]: Configuration management
//! - [`logging`]: Tracing subscriber setup
//! - [`error`]: Error types and result aliases

pub mod codec;
pub mod config;
pub mod error;
pub mod logging;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use codec::{FieldTable, FieldValue, Frame, FramePayload, Method, MethodKind};
pub use config::{Config, ConnectionConfig, LoggingConfig, Mechanism, TunePolicy};
pub use error::{BurrowError, Result};
pub use session::{
    Channel, ChannelId, ChannelRegistry, Confirmation, QosOptions, RecoverOptions, Session,
    SessionState, Tuning, CONTROL_CHANNEL,
};
pub use transport::{Connector, Endpoint, TcpConnector};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// AMQP protocol version spoken
pub const PROTOCOL_VERSION: &str = "0-8";
