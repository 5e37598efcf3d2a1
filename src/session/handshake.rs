//! Connection handshake.
//!
//! ```text
//!     [Idle] ── protocol header ──> [ProtocolHeaderSent]
//!                                          │ connection.start
//!                                          v
//!                                    [StartReceived] ── start-ok ──┐
//!                                                                  │ connection.tune / tune-ok
//!                                                                  v
//!   redirect (insist = false):                                 [Tuned]
//!   close transport, adopt new                                     │ connection.open
//!   address, back to [Idle] <──────────────────────────────────────┤
//!                                                                  │ connection.open-ok
//!                                                                  v
//!                                                              [Opened]
//!                                                                  │ access.request / request-ok
//!                                                                  v
//!                                                          [AccessGranted]
//! ```
//!
//! Access is requested on a non-control channel, so the session opens one
//! between [`Handshake::run`] and [`Handshake::request_access`].

use bytes::Bytes;

use crate::codec::{FieldTable, FieldValue, Method, MethodKind, PROTOCOL_HEADER, VERSION_MAJOR, VERSION_MINOR};
use crate::config::{ConnectionConfig, Mechanism, TunePolicy};
use crate::error::{BurrowError, Result};
use crate::transport::{Connector, Endpoint};
use crate::VERSION;

use super::channel::{ChannelId, CONTROL_CHANNEL};
use super::dispatcher::Dispatcher;

/// Handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Nothing sent on the current transport
    Idle,
    /// Protocol header written
    ProtocolHeaderSent,
    /// connection.start received
    StartReceived,
    /// tune-ok sent
    Tuned,
    /// connection.open-ok received
    Opened,
    /// Access ticket granted
    AccessGranted,
}

/// Tuning values sent in connection.tune-ok.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tuning {
    /// Highest usable channel number (0 = no limit)
    pub channel_max: u16,
    /// Largest frame in bytes (0 = no limit)
    pub frame_max: u32,
    /// Heartbeat interval in seconds (0 = disabled)
    pub heartbeat: u16,
}

impl Tuning {
    /// Values the client asked for.
    pub fn requested(config: &ConnectionConfig) -> Self {
        Self {
            channel_max: config.channel_max,
            frame_max: config.frame_max,
            heartbeat: config.heartbeat,
        }
    }

    /// Resolve the broker's proposal against the client request.
    pub fn resolve(policy: TunePolicy, requested: Self, proposed: Self) -> Self {
        match policy {
            TunePolicy::Requested => requested,
            TunePolicy::Negotiate => Self {
                channel_max: lower_limit(requested.channel_max, proposed.channel_max),
                frame_max: lower_limit(requested.frame_max, proposed.frame_max),
                heartbeat: lower_limit(requested.heartbeat, proposed.heartbeat),
            },
        }
    }
}

/// Smaller of two limits where 0 means unlimited.
fn lower_limit<T: Copy + Ord + Default>(a: T, b: T) -> T {
    let zero = T::default();
    match (a == zero, b == zero) {
        (true, _) => b,
        (_, true) => a,
        _ => a.min(b),
    }
}

/// What a completed handshake established.
#[derive(Debug, Clone)]
pub struct HandshakeOutcome {
    /// Broker the connection ended up on
    pub endpoint: Endpoint,
    /// Values sent in tune-ok
    pub tuning: Tuning,
    /// Properties from connection.start
    pub server_properties: FieldTable,
    /// Redirects followed
    pub redirects: u32,
}

enum OpenResult {
    Opened,
    Redirected(Endpoint),
}

/// Drives the handshake for one connect attempt.
pub struct Handshake {
    state: HandshakeState,
    target: Endpoint,
    redirects: u32,
    tuning: Tuning,
    server_properties: FieldTable,
    offered_mechanisms: Bytes,
}

impl Handshake {
    /// Start a handshake against `target`.
    pub fn new(target: Endpoint) -> Self {
        Self {
            state: HandshakeState::Idle,
            target,
            redirects: 0,
            tuning: Tuning::default(),
            server_properties: FieldTable::new(),
            offered_mechanisms: Bytes::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Current target address.
    pub fn target(&self) -> &Endpoint {
        &self.target
    }

    /// Connect and negotiate until connection.open-ok, following redirects.
    pub async fn run(
        &mut self,
        config: &ConnectionConfig,
        dispatcher: &mut Dispatcher,
        connector: &dyn Connector,
    ) -> Result<HandshakeOutcome> {
        loop {
            self.state = HandshakeState::Idle;
            dispatcher
                .transport_mut()
                .connect(connector, &self.target, config.connect_timeout())
                .await?;
            // Until tune, hold the broker to the frame size the client asks for.
            dispatcher.transport_mut().set_max_frame(config.frame_max);

            self.init_connection(dispatcher).await?;

            match self.open_connection(config, dispatcher).await? {
                OpenResult::Opened => break,
                OpenResult::Redirected(next) => {
                    self.redirects += 1;
                    if let Some(max) = config.max_redirects {
                        if self.redirects > max {
                            dispatcher.transport_mut().close().await;
                            return Err(BurrowError::Connection(format!(
                                "Gave up after {max} redirects (last: {next})"
                            )));
                        }
                    }

                    tracing::warn!("Broker {} redirected to {}", self.target, next);
                    dispatcher.transport_mut().close().await;
                    self.target = next;
                },
            }
        }

        Ok(HandshakeOutcome {
            endpoint: self.target.clone(),
            tuning: self.tuning,
            server_properties: self.server_properties.clone(),
            redirects: self.redirects,
        })
    }

    /// Write the protocol header and require connection.start.
    async fn init_connection(&mut self, dispatcher: &mut Dispatcher) -> Result<()> {
        dispatcher.write_raw(&PROTOCOL_HEADER).await?;
        self.state = HandshakeState::ProtocolHeaderSent;

        match dispatcher.next_method().await? {
            Some(Method::ConnectionStart {
                version_major,
                version_minor,
                server_properties,
                mechanisms,
                ..
            }) => {
                if (version_major, version_minor) != (VERSION_MAJOR, VERSION_MINOR) {
                    tracing::debug!(
                        "Broker announced protocol {}-{}, speaking {}-{}",
                        version_major,
                        version_minor,
                        VERSION_MAJOR,
                        VERSION_MINOR
                    );
                }
                self.server_properties = server_properties;
                self.offered_mechanisms = mechanisms;
                self.state = HandshakeState::StartReceived;
                Ok(())
            },
            _ => Err(BurrowError::Protocol("Connection initiation failed".to_string())),
        }
    }

    /// start-ok, tune/tune-ok, open; returns whether the broker redirected.
    async fn open_connection(
        &mut self,
        config: &ConnectionConfig,
        dispatcher: &mut Dispatcher,
    ) -> Result<OpenResult> {
        if !mechanism_offered(&self.offered_mechanisms, config.mechanism) {
            return Err(BurrowError::Protocol(format!(
                "Broker does not offer {} (offered: {})",
                config.mechanism.name(),
                String::from_utf8_lossy(&self.offered_mechanisms)
            )));
        }

        let start_ok = Method::ConnectionStartOk {
            client_properties: client_properties(),
            mechanism: config.mechanism.name().to_string(),
            response: login_response(config),
            locale: config.locale.clone(),
        };
        dispatcher.send_method(start_ok, CONTROL_CHANNEL, None).await?;

        match dispatcher.next_method().await? {
            None => {
                return Err(BurrowError::Protocol(format!(
                    "Connection failed - user: {}",
                    config.user
                )))
            },
            Some(Method::ConnectionTune {
                channel_max,
                frame_max,
                heartbeat,
            }) => {
                let proposed = Tuning {
                    channel_max,
                    frame_max,
                    heartbeat,
                };
                self.tuning = Tuning::resolve(config.tune_policy, Tuning::requested(config), proposed);
                let tune_ok = Method::ConnectionTuneOk {
                    channel_max: self.tuning.channel_max,
                    frame_max: self.tuning.frame_max,
                    heartbeat: self.tuning.heartbeat,
                };
                dispatcher.send_method(tune_ok, CONTROL_CHANNEL, None).await?;
                dispatcher.transport_mut().set_max_frame(self.tuning.frame_max);
                self.state = HandshakeState::Tuned;
            },
            Some(Method::ConnectionClose {
                reply_code,
                reply_text,
                ..
            }) => {
                return Err(BurrowError::Protocol(format!(
                    "Connection failed - user: {} ({reply_code} {reply_text})",
                    config.user
                )))
            },
            Some(other) => {
                tracing::debug!("No tune proposal, got {}; opening with defaults", other.kind());
            },
        }

        let open = Method::ConnectionOpen {
            virtual_host: config.vhost.clone(),
            capabilities: String::new(),
            insist: config.insist,
        };
        dispatcher.send_method(open, CONTROL_CHANNEL, None).await?;

        match dispatcher.next_method().await? {
            Some(Method::ConnectionOpenOk { .. }) => {
                self.state = HandshakeState::Opened;
                Ok(OpenResult::Opened)
            },
            Some(Method::ConnectionRedirect { host, .. }) => {
                if config.insist {
                    return Err(BurrowError::Connection(format!(
                        "Cannot connect to the specified server - host: {}, port: {}",
                        self.target.host, self.target.port
                    )));
                }
                Ok(OpenResult::Redirected(Endpoint::parse(&host)?))
            },
            other => Err(BurrowError::Protocol(format!(
                "Cannot open connection (got {})",
                other.map_or_else(|| "no response".to_string(), |m| m.kind().to_string())
            ))),
        }
    }

    /// Request an access ticket for the configured realm on `channel`.
    pub async fn request_access(
        &mut self,
        config: &ConnectionConfig,
        dispatcher: &mut Dispatcher,
        channel: ChannelId,
    ) -> Result<u16> {
        let ticket = request_access(config, dispatcher, channel).await?;
        self.state = HandshakeState::AccessGranted;
        Ok(ticket)
    }
}

/// access.request with read, write, active and passive rights.
pub(crate) async fn request_access(
    config: &ConnectionConfig,
    dispatcher: &mut Dispatcher,
    channel: ChannelId,
) -> Result<u16> {
    let request = Method::AccessRequest {
        realm: config.realm.clone(),
        exclusive: false,
        passive: true,
        active: true,
        write: true,
        read: true,
    };

    match dispatcher
        .request(request, channel, None, &[MethodKind::AccessRequestOk], "Access denied")
        .await?
    {
        Method::AccessRequestOk { ticket } => Ok(ticket),
        other => Err(BurrowError::Protocol(format!(
            "Access denied: unexpected {}",
            other.kind()
        ))),
    }
}

fn mechanism_offered(offered: &[u8], mechanism: Mechanism) -> bool {
    // An empty list is treated as "anything goes".
    offered.is_empty()
        || offered
            .split(|b| *b == b' ')
            .any(|m| m == mechanism.name().as_bytes())
}

fn client_properties() -> FieldTable {
    let mut props = FieldTable::new();
    props.insert("platform".into(), FieldValue::from("Rust"));
    props.insert("product".into(), FieldValue::from("burrow"));
    props.insert("version".into(), FieldValue::from(VERSION));
    props.insert(
        "information".into(),
        FieldValue::from("https://crates.io/crates/burrow-core"),
    );
    props
}

fn login_response(config: &ConnectionConfig) -> Bytes {
    match config.mechanism {
        Mechanism::AmqPlain => {
            let mut creds = FieldTable::new();
            creds.insert("LOGIN".into(), FieldValue::from(config.user.as_str()));
            creds.insert("PASSWORD".into(), FieldValue::from(config.password.as_str()));
            crate::codec::encode_table_entries(&creds)
        },
        Mechanism::Plain => {
            let mut raw = Vec::with_capacity(config.user.len() + config.password.len() + 2);
            raw.push(0);
            raw.extend_from_slice(config.user.as_bytes());
            raw.push(0);
            raw.extend_from_slice(config.password.as_bytes());
            Bytes::from(raw)
        },
    }
}
