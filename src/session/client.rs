//! Session lifecycle.
//!
//! Composes the transport, dispatcher, handshake and channel registry into
//! the caller-facing [`Session`].

use serde::Serialize;

use crate::codec::{FieldTable, Frame, Method, MethodKind};
use crate::config::{Config, ConnectionConfig};
use crate::error::{BurrowError, Result};
use crate::transport::{Connector, Endpoint, SessionTransport, TcpConnector};

use super::channel::{ChannelId, ChannelRegistry, CONTROL_CHANNEL};
use super::correlator::Confirmation;
use super::dispatcher::Dispatcher;
use super::handshake::{self, Handshake, Tuning};

/// Session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No handshake completed on the current transport
    NotConnected,
    /// Handshake done, channel open, ticket held
    Connected,
}

/// basic.qos arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QosOptions {
    /// Prefetch window in octets (0 = no limit)
    pub prefetch_size: u32,
    /// Prefetch window in messages
    pub prefetch_count: u16,
    /// Apply to the whole connection instead of the current channel
    pub global: bool,
}

impl Default for QosOptions {
    fn default() -> Self {
        Self {
            prefetch_size: 0,
            prefetch_count: 1,
            global: false,
        }
    }
}

/// basic.recover arguments
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoverOptions {
    /// Requeue instead of redelivering to the original consumer
    pub requeue: bool,
}

/// A broker connection with its channels.
///
/// All operations take `&mut self`: one request is in flight at a time.
/// Share across tasks behind a `tokio::sync::Mutex`.
pub struct Session {
    /// Session ID
    id: String,
    /// Connection parameters
    config: ConnectionConfig,
    /// Stream factory
    connector: Box<dyn Connector>,
    /// Broker address, updated when a redirect is followed
    endpoint: Endpoint,
    /// Current state
    state: SessionState,
    /// Access ticket from access.request-ok
    ticket: Option<u16>,
    /// All channels, control channel included
    channels: ChannelRegistry,
    /// Channel used by sub-protocol requests
    active: ChannelId,
    /// Frame layer
    dispatcher: Dispatcher,
    /// Values sent in tune-ok
    tuning: Option<Tuning>,
    /// Properties from connection.start
    server_properties: FieldTable,
}

impl Session {
    /// Create a session that connects over TCP.
    pub fn new(config: Config) -> Self {
        Self::with_connector(config, TcpConnector::new())
    }

    /// Create a session using a custom stream connector.
    pub fn with_connector(config: Config, connector: impl Connector + 'static) -> Self {
        let endpoint = Endpoint::new(config.connection.host.clone(), config.connection.port);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            config: config.connection,
            connector: Box::new(connector),
            endpoint,
            state: SessionState::NotConnected,
            ticket: None,
            channels: ChannelRegistry::new(),
            active: CONTROL_CHANNEL,
            dispatcher: Dispatcher::new(SessionTransport::new(), config.logging.enabled),
            tuning: None,
            server_properties: FieldTable::new(),
        }
    }

    /// Get session ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Check if session is connected
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// Connection parameters
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Broker address currently targeted
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Active access ticket
    pub fn ticket(&self) -> Option<u16> {
        self.ticket
    }

    /// Negotiated tuning, once connected
    pub fn tuning(&self) -> Option<Tuning> {
        self.tuning
    }

    /// Properties the broker announced in connection.start
    pub fn server_properties(&self) -> &FieldTable {
        &self.server_properties
    }

    /// Channel registry
    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    /// Channel used by qos, tx and recover requests
    pub fn active_channel(&self) -> ChannelId {
        self.active
    }

    /// Make `id` the active channel.
    pub fn set_active_channel(&mut self, id: ChannelId) -> Result<()> {
        if self.channels.get(id).is_none() {
            return Err(BurrowError::Connection(format!("No channel {id}")));
        }
        self.active = id;
        Ok(())
    }

    /// Whether frames are being logged
    pub fn logging(&self) -> bool {
        self.dispatcher.logging()
    }

    /// Toggle frame logging while running
    pub fn set_logging(&mut self, enabled: bool) {
        self.dispatcher.set_logging(enabled);
    }

    /// Handshake, open a channel and obtain an access ticket.
    ///
    /// On failure the transport is closed and the session stays
    /// [`SessionState::NotConnected`].
    pub async fn connect(&mut self) -> Result<SessionState> {
        if self.is_connected() && self.dispatcher.transport().is_open() {
            return Ok(self.state);
        }

        match self.establish().await {
            Ok(()) => {
                self.state = SessionState::Connected;
                tracing::info!("Session {} connected to {}", self.id, self.endpoint);
                Ok(self.state)
            },
            Err(e) => {
                self.reset().await;
                Err(e)
            },
        }
    }

    /// Alias for [`connect`](Self::connect).
    pub async fn start(&mut self) -> Result<SessionState> {
        self.connect().await
    }

    async fn establish(&mut self) -> Result<()> {
        let mut handshake = Handshake::new(self.endpoint.clone());
        let outcome = match handshake
            .run(&self.config, &mut self.dispatcher, self.connector.as_ref())
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                // Keep the redirect target even when a later broker fails.
                self.endpoint = handshake.target().clone();
                return Err(e);
            },
        };

        if outcome.redirects > 0 {
            tracing::info!(
                "Reached {} after {} redirect(s)",
                outcome.endpoint,
                outcome.redirects
            );
        }
        self.endpoint = outcome.endpoint;
        self.tuning = Some(outcome.tuning);
        self.server_properties = outcome.server_properties;
        if let Some(control) = self.channels.get_mut(CONTROL_CHANNEL) {
            control.set_open(true);
        }

        let channel = self.open_channel().await?;
        let ticket = handshake
            .request_access(&self.config, &mut self.dispatcher, channel)
            .await?;
        self.ticket = Some(ticket);
        Ok(())
    }

    /// Close every open channel, then the connection.
    pub async fn close(&mut self) -> Result<SessionState> {
        for id in self.channels.open_ids() {
            if let Err(e) = self.close_channel(id).await {
                self.reset().await;
                return Err(e);
            }
        }

        self.active = CONTROL_CHANNEL;

        let close = Method::ConnectionClose {
            reply_code: 200,
            reply_text: "Goodbye".to_string(),
            class_id: 0,
            method_id: 0,
        };
        let result = self
            .dispatcher
            .confirm(
                close,
                CONTROL_CHANNEL,
                self.ticket,
                MethodKind::ConnectionCloseOk,
                Confirmation::CloseOk,
                "Error closing connection",
            )
            .await;

        self.reset().await;
        result?;
        tracing::info!("Session {} closed", self.id);
        Ok(self.state)
    }

    /// Alias for [`close`](Self::close).
    pub async fn stop(&mut self) -> Result<SessionState> {
        self.close().await
    }

    async fn reset(&mut self) {
        self.dispatcher.transport_mut().close().await;
        self.state = SessionState::NotConnected;
        self.ticket = None;
        self.tuning = None;
        self.channels.close_all();
        self.active = CONTROL_CHANNEL;
    }

    /// Tear the session down if `result` failed because the transport died.
    ///
    /// Keeps the connected-implies-open-stream invariant after broken pipes
    /// and broker hang-ups, so the next [`connect`](Self::connect) redials.
    async fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() && self.is_connected() && !self.dispatcher.transport().is_open() {
            tracing::warn!("Session {} lost its connection to {}", self.id, self.endpoint);
            self.reset().await;
        }
        result
    }

    /// Send a heartbeat. Always on channel 0; the active channel becomes 0.
    pub async fn heartbeat(&mut self) -> Result<()> {
        if self.active != CONTROL_CHANNEL {
            self.active = CONTROL_CHANNEL;
        }
        let result = self.dispatcher.send_frame(&Frame::heartbeat()).await;
        self.settle(result).await
    }

    /// Allocate a channel (reusing a closed one), open it and make it active.
    pub async fn open_channel(&mut self) -> Result<ChannelId> {
        let id = self.channels.allocate()?;

        let limit = self.tuning.map_or(0, |t| t.channel_max);
        if limit != 0 && id > limit {
            return Err(BurrowError::Connection(format!(
                "Channel {id} exceeds negotiated channel-max {limit}"
            )));
        }

        let reply = self
            .dispatcher
            .request(
                Method::ChannelOpen {
                    out_of_band: String::new(),
                },
                id,
                self.ticket,
                &[MethodKind::ChannelOpenOk],
                "Cannot open channel",
            )
            .await;
        self.settle(reply).await?;

        if let Some(channel) = self.channels.get_mut(id) {
            channel.set_open(true);
        }
        self.active = id;
        tracing::debug!("Opened channel {}", id);
        Ok(id)
    }

    /// Close channel `id` with channel.close / close-ok.
    pub async fn close_channel(&mut self, id: ChannelId) -> Result<Confirmation> {
        match self.channels.get(id) {
            None => return Err(BurrowError::Connection(format!("No channel {id}"))),
            Some(c) if c.is_control() => {
                return Err(BurrowError::Connection(
                    "The control channel closes with the connection".to_string(),
                ))
            },
            Some(_) => {},
        }

        let close = Method::ChannelClose {
            reply_code: 200,
            reply_text: "Goodbye".to_string(),
            class_id: 0,
            method_id: 0,
        };
        let reply = self
            .dispatcher
            .confirm(
                close,
                id,
                self.ticket,
                MethodKind::ChannelCloseOk,
                Confirmation::CloseOk,
                "Error closing channel",
            )
            .await;
        let confirmation = self.settle(reply).await?;

        if let Some(channel) = self.channels.get_mut(id) {
            channel.set_open(false);
        }
        if self.active == id {
            self.active = CONTROL_CHANNEL;
        }
        tracing::debug!("Closed channel {}", id);
        Ok(confirmation)
    }

    /// Request a fresh access ticket on the active channel.
    pub async fn request_access(&mut self) -> Result<u16> {
        let reply = handshake::request_access(&self.config, &mut self.dispatcher, self.active).await;
        let ticket = self.settle(reply).await?;
        self.ticket = Some(ticket);
        Ok(ticket)
    }

    /// Send a method on the active channel.
    pub async fn send_method(&mut self, method: Method) -> Result<()> {
        let result = self
            .dispatcher
            .send_method(method, self.active, self.ticket)
            .await;
        self.settle(result).await
    }

    /// Send a frame, retagged to the active channel.
    pub async fn send_frame(&mut self, mut frame: Frame) -> Result<()> {
        frame.channel = self.active;
        let result = self.dispatcher.send_frame(&frame).await;
        self.settle(result).await
    }

    /// Wait for the next frame from the broker.
    ///
    /// `Ok(None)` means the broker hung up; the session is then disconnected.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>> {
        let result = self.dispatcher.next_frame().await;
        self.settle_read(result).await
    }

    /// Wait for the next method from the broker, skipping heartbeats.
    pub async fn next_method(&mut self) -> Result<Option<Method>> {
        let result = self.dispatcher.next_method().await;
        self.settle_read(result).await
    }

    async fn settle_read<T>(&mut self, result: Result<Option<T>>) -> Result<Option<T>> {
        if matches!(result, Ok(None)) && self.is_connected() {
            tracing::warn!("Broker {} closed the connection", self.endpoint);
            self.reset().await;
            return result;
        }
        self.settle(result).await
    }

    /// Send `method` on the active channel and require one of `expected`.
    pub async fn request(&mut self, method: Method, expected: &[MethodKind]) -> Result<Method> {
        let context = format!("Unexpected reply to {}", method.kind());
        let reply = self
            .dispatcher
            .request(method, self.active, self.ticket, expected, &context)
            .await;
        self.settle(reply).await
    }

    /// Set prefetch limits (basic.qos / qos-ok).
    pub async fn qos(&mut self, options: QosOptions) -> Result<Confirmation> {
        let qos = Method::BasicQos {
            prefetch_size: options.prefetch_size,
            prefetch_count: options.prefetch_count,
            global: options.global,
        };
        self.confirm(
            qos,
            MethodKind::BasicQosOk,
            Confirmation::QosOk,
            "Error specifying Quality of Service",
        )
        .await
    }

    /// Put the active channel in transaction mode.
    pub async fn tx_select(&mut self) -> Result<Confirmation> {
        self.confirm(
            Method::TxSelect,
            MethodKind::TxSelectOk,
            Confirmation::SelectOk,
            "Error initiating transactions for current channel",
        )
        .await
    }

    /// Commit the current transaction.
    pub async fn tx_commit(&mut self) -> Result<Confirmation> {
        self.confirm(
            Method::TxCommit,
            MethodKind::TxCommitOk,
            Confirmation::CommitOk,
            "Error commiting transaction",
        )
        .await
    }

    /// Abandon the current transaction.
    pub async fn tx_rollback(&mut self) -> Result<Confirmation> {
        self.confirm(
            Method::TxRollback,
            MethodKind::TxRollbackOk,
            Confirmation::RollbackOk,
            "Error rolling back transaction",
        )
        .await
    }

    async fn confirm(
        &mut self,
        method: Method,
        expected: MethodKind,
        confirmation: Confirmation,
        context: &str,
    ) -> Result<Confirmation> {
        let reply = self
            .dispatcher
            .confirm(method, self.active, self.ticket, expected, confirmation, context)
            .await;
        self.settle(reply).await
    }

    /// Ask for redelivery of unacknowledged messages. No reply is expected.
    pub async fn recover(&mut self, options: RecoverOptions) -> Result<()> {
        self.send_method(Method::BasicRecover {
            requeue: options.requeue,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use crate::transport::BoxedStream;

    struct Refused;

    impl Connector for Refused {
        fn connect<'a>(&'a self, endpoint: &'a Endpoint) -> BoxFuture<'a, Result<BoxedStream>> {
            Box::pin(async move { Err(BurrowError::ServerDown(format!("refused: {endpoint}"))) })
        }

        fn name(&self) -> &'static str {
            "refused"
        }
    }

    #[test]
    fn test_new_session_state() {
        let session = Session::with_connector(Config::default(), Refused);
        assert_eq!(session.state(), SessionState::NotConnected);
        assert_eq!(session.active_channel(), CONTROL_CHANNEL);
        assert!(session.channels().get(CONTROL_CHANNEL).is_some());
        assert!(session.ticket().is_none());
        assert_eq!(session.endpoint(), &Endpoint::new("localhost", 5672));
    }

    #[test]
    fn test_qos_defaults() {
        let qos = QosOptions::default();
        assert_eq!(qos.prefetch_size, 0);
        assert_eq!(qos.prefetch_count, 1);
        assert!(!qos.global);
        assert!(!RecoverOptions::default().requeue);
    }

    #[tokio::test]
    async fn test_connect_refused_is_server_down() {
        let mut session = Session::with_connector(Config::default(), Refused);
        let err = session.connect().await.unwrap_err();
        assert!(err.is_server_down());
        assert_eq!(session.state(), SessionState::NotConnected);
    }

    #[tokio::test]
    async fn test_operations_without_socket_are_connection_errors() {
        let mut session = Session::with_connector(Config::default(), Refused);
        assert!(session.heartbeat().await.unwrap_err().is_connection());
        assert!(session.tx_select().await.unwrap_err().is_connection());
    }

    #[test]
    fn test_set_active_channel_unknown() {
        let mut session = Session::with_connector(Config::default(), Refused);
        assert!(session.set_active_channel(9).unwrap_err().is_connection());
    }

    #[test]
    fn test_logging_toggle() {
        let mut session = Session::with_connector(Config::default(), Refused);
        assert!(!session.logging());
        session.set_logging(true);
        assert!(session.logging());
    }
}
