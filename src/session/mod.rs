//! Session management and channel multiplexing.
//!
//! Implements the AMQP 0-8 connection lifecycle: protocol header, broker
//! negotiation, redirects, access tickets and channel reuse, all over one
//! duplex stream with one request in flight at a time.
//!
//! # Protocol Overview
//!
//! ## Message Flow
//!
//! ```text
//! Client                                   Broker
//!    |                                       |
//!    |------ "AMQP" 1 1 8 0 --------------->|  Protocol header
//!    |<----- connection.start --------------|
//!    |------ connection.start-ok ---------->|  Credentials
//!    |<----- connection.tune ---------------|
//!    |------ connection.tune-ok ----------->|  Limits
//!    |------ connection.open -------------->|  Virtual host, insist
//!    |<----- connection.open-ok ------------|  or connection.redirect
//!    |                                       |
//!    |------ channel.open (ch N) ---------->|
//!    |<----- channel.open-ok ---------------|
//!    |------ access.request (ch N) -------->|
//!    |<----- access.request-ok (ticket) ----|
//!    |                                       |
//!    |====== qos / tx / recover ===========>|  Synchronous sub-protocols
//!    |                                       |
//!    |------ heartbeat (ch 0) ------------->|  Keep-alive
//!    |                                       |
//!    |------ channel.close / close-ok ----->|  Per open channel
//!    |------ connection.close ------------->|
//!    |<----- connection.close-ok -----------|
//! ```
//!
//! ## State Machine
//!
//! | State          | Description                              | Valid Transitions |
//! |----------------|------------------------------------------|-------------------|
//! | `NotConnected` | No socket, or handshake not yet finished | → Connected       |
//! | `Connected`    | Channel open and ticket held             | → NotConnected    |
//!
//! # Usage
//!
//! ```rust,ignore
//! use burrow::{Config, QosOptions, Session};
//!
//! let mut session = Session::new(Config::default());
//! session.connect().await?;
//! session.qos(QosOptions::default()).await?;
//! session.tx_select().await?;
//! session.tx_commit().await?;
//! session.close().await?;
//! ```

mod channel;
mod client;
mod correlator;
mod dispatcher;
mod handshake;

pub use channel::{Channel, ChannelId, ChannelRegistry, CONTROL_CHANNEL};
pub use client::{QosOptions, RecoverOptions, Session, SessionState};
pub use correlator::Confirmation;
pub use dispatcher::Dispatcher;
pub use handshake::{Handshake, HandshakeOutcome, HandshakeState, Tuning};
