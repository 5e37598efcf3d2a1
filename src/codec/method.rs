//! Protocol methods.
//!
//! Every method payload starts with a class id and a method id (both
//! shorts) followed by the method's arguments. [`Method`] is the decoded,
//! tagged form; [`MethodKind`] is the fieldless tag used to state which
//! replies a synchronous request accepts.

use std::fmt;

use bytes::Bytes;

use super::buffer::{ArgReader, ArgWriter};
use super::table::FieldTable;
use crate::error::{BurrowError, Result};

/// Class ids.
pub mod class {
    /// Connection class
    pub const CONNECTION: u16 = 10;
    /// Channel class
    pub const CHANNEL: u16 = 20;
    /// Access class
    pub const ACCESS: u16 = 30;
    /// Exchange class
    pub const EXCHANGE: u16 = 40;
    /// Queue class
    pub const QUEUE: u16 = 50;
    /// Basic class
    pub const BASIC: u16 = 60;
    /// Transaction class
    pub const TX: u16 = 90;
}

/// Method tag, one per [`Method`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum MethodKind {
    ConnectionStart,
    ConnectionStartOk,
    ConnectionTune,
    ConnectionTuneOk,
    ConnectionOpen,
    ConnectionOpenOk,
    ConnectionRedirect,
    ConnectionClose,
    ConnectionCloseOk,
    ChannelOpen,
    ChannelOpenOk,
    ChannelClose,
    ChannelCloseOk,
    AccessRequest,
    AccessRequestOk,
    ExchangeDeclare,
    ExchangeDeclareOk,
    QueueDeclare,
    QueueDeclareOk,
    BasicQos,
    BasicQosOk,
    BasicRecover,
    TxSelect,
    TxSelectOk,
    TxCommit,
    TxCommitOk,
    TxRollback,
    TxRollbackOk,
    Unknown,
}

const KIND_IDS: &[(MethodKind, u16, u16, &str)] = &[
    (MethodKind::ConnectionStart, class::CONNECTION, 10, "connection.start"),
    (MethodKind::ConnectionStartOk, class::CONNECTION, 11, "connection.start-ok"),
    (MethodKind::ConnectionTune, class::CONNECTION, 30, "connection.tune"),
    (MethodKind::ConnectionTuneOk, class::CONNECTION, 31, "connection.tune-ok"),
    (MethodKind::ConnectionOpen, class::CONNECTION, 40, "connection.open"),
    (MethodKind::ConnectionOpenOk, class::CONNECTION, 41, "connection.open-ok"),
    (MethodKind::ConnectionRedirect, class::CONNECTION, 50, "connection.redirect"),
    (MethodKind::ConnectionClose, class::CONNECTION, 60, "connection.close"),
    (MethodKind::ConnectionCloseOk, class::CONNECTION, 61, "connection.close-ok"),
    (MethodKind::ChannelOpen, class::CHANNEL, 10, "channel.open"),
    (MethodKind::ChannelOpenOk, class::CHANNEL, 11, "channel.open-ok"),
    (MethodKind::ChannelClose, class::CHANNEL, 40, "channel.close"),
    (MethodKind::ChannelCloseOk, class::CHANNEL, 41, "channel.close-ok"),
    (MethodKind::AccessRequest, class::ACCESS, 10, "access.request"),
    (MethodKind::AccessRequestOk, class::ACCESS, 11, "access.request-ok"),
    (MethodKind::ExchangeDeclare, class::EXCHANGE, 10, "exchange.declare"),
    (MethodKind::ExchangeDeclareOk, class::EXCHANGE, 11, "exchange.declare-ok"),
    (MethodKind::QueueDeclare, class::QUEUE, 10, "queue.declare"),
    (MethodKind::QueueDeclareOk, class::QUEUE, 11, "queue.declare-ok"),
    (MethodKind::BasicQos, class::BASIC, 10, "basic.qos"),
    (MethodKind::BasicQosOk, class::BASIC, 11, "basic.qos-ok"),
    (MethodKind::BasicRecover, class::BASIC, 100, "basic.recover"),
    (MethodKind::TxSelect, class::TX, 10, "tx.select"),
    (MethodKind::TxSelectOk, class::TX, 11, "tx.select-ok"),
    (MethodKind::TxCommit, class::TX, 20, "tx.commit"),
    (MethodKind::TxCommitOk, class::TX, 21, "tx.commit-ok"),
    (MethodKind::TxRollback, class::TX, 30, "tx.rollback"),
    (MethodKind::TxRollbackOk, class::TX, 31, "tx.rollback-ok"),
];

impl MethodKind {
    /// Look up the tag for a class/method id pair.
    pub fn from_ids(class_id: u16, method_id: u16) -> Self {
        KIND_IDS
            .iter()
            .find(|(_, c, m, _)| *c == class_id && *m == method_id)
            .map_or(MethodKind::Unknown, |(kind, ..)| *kind)
    }

    /// Class and method ids. `None` for [`MethodKind::Unknown`].
    pub fn ids(self) -> Option<(u16, u16)> {
        KIND_IDS
            .iter()
            .find(|(kind, ..)| *kind == self)
            .map(|(_, c, m, _)| (*c, *m))
    }

    /// Dotted protocol name, e.g. `basic.qos-ok`.
    pub fn name(self) -> &'static str {
        KIND_IDS
            .iter()
            .find(|(kind, ..)| *kind == self)
            .map_or("unknown", |(.., name)| name)
    }
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded protocol method.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum Method {
    ConnectionStart {
        version_major: u8,
        version_minor: u8,
        server_properties: FieldTable,
        mechanisms: Bytes,
        locales: Bytes,
    },
    ConnectionStartOk {
        client_properties: FieldTable,
        mechanism: String,
        response: Bytes,
        locale: String,
    },
    ConnectionTune {
        channel_max: u16,
        frame_max: u32,
        heartbeat: u16,
    },
    ConnectionTuneOk {
        channel_max: u16,
        frame_max: u32,
        heartbeat: u16,
    },
    ConnectionOpen {
        virtual_host: String,
        capabilities: String,
        insist: bool,
    },
    ConnectionOpenOk {
        known_hosts: String,
    },
    /// Broker asks the client to reconnect elsewhere. `host` is `name[:port]`.
    ConnectionRedirect {
        host: String,
        known_hosts: String,
    },
    ConnectionClose {
        reply_code: u16,
        reply_text: String,
        class_id: u16,
        method_id: u16,
    },
    ConnectionCloseOk,
    ChannelOpen {
        out_of_band: String,
    },
    ChannelOpenOk,
    ChannelClose {
        reply_code: u16,
        reply_text: String,
        class_id: u16,
        method_id: u16,
    },
    ChannelCloseOk,
    AccessRequest {
        realm: String,
        exclusive: bool,
        passive: bool,
        active: bool,
        write: bool,
        read: bool,
    },
    AccessRequestOk {
        ticket: u16,
    },
    ExchangeDeclare {
        ticket: u16,
        exchange: String,
        kind: String,
        passive: bool,
        durable: bool,
        auto_delete: bool,
        internal: bool,
        nowait: bool,
        arguments: FieldTable,
    },
    ExchangeDeclareOk,
    QueueDeclare {
        ticket: u16,
        queue: String,
        passive: bool,
        durable: bool,
        exclusive: bool,
        auto_delete: bool,
        nowait: bool,
        arguments: FieldTable,
    },
    QueueDeclareOk {
        queue: String,
        message_count: u32,
        consumer_count: u32,
    },
    BasicQos {
        prefetch_size: u32,
        prefetch_count: u16,
        global: bool,
    },
    BasicQosOk,
    BasicRecover {
        requeue: bool,
    },
    TxSelect,
    TxSelectOk,
    TxCommit,
    TxCommitOk,
    TxRollback,
    TxRollbackOk,
    /// A method this codec does not model; arguments are kept raw.
    Unknown {
        class_id: u16,
        method_id: u16,
        arguments: Bytes,
    },
}

impl Method {
    /// The tag for this method.
    pub fn kind(&self) -> MethodKind {
        match self {
            Method::ConnectionStart { .. } => MethodKind::ConnectionStart,
            Method::ConnectionStartOk { .. } => MethodKind::ConnectionStartOk,
            Method::ConnectionTune { .. } => MethodKind::ConnectionTune,
            Method::ConnectionTuneOk { .. } => MethodKind::ConnectionTuneOk,
            Method::ConnectionOpen { .. } => MethodKind::ConnectionOpen,
            Method::ConnectionOpenOk { .. } => MethodKind::ConnectionOpenOk,
            Method::ConnectionRedirect { .. } => MethodKind::ConnectionRedirect,
            Method::ConnectionClose { .. } => MethodKind::ConnectionClose,
            Method::ConnectionCloseOk => MethodKind::ConnectionCloseOk,
            Method::ChannelOpen { .. } => MethodKind::ChannelOpen,
            Method::ChannelOpenOk => MethodKind::ChannelOpenOk,
            Method::ChannelClose { .. } => MethodKind::ChannelClose,
            Method::ChannelCloseOk => MethodKind::ChannelCloseOk,
            Method::AccessRequest { .. } => MethodKind::AccessRequest,
            Method::AccessRequestOk { .. } => MethodKind::AccessRequestOk,
            Method::ExchangeDeclare { .. } => MethodKind::ExchangeDeclare,
            Method::ExchangeDeclareOk => MethodKind::ExchangeDeclareOk,
            Method::QueueDeclare { .. } => MethodKind::QueueDeclare,
            Method::QueueDeclareOk { .. } => MethodKind::QueueDeclareOk,
            Method::BasicQos { .. } => MethodKind::BasicQos,
            Method::BasicQosOk => MethodKind::BasicQosOk,
            Method::BasicRecover { .. } => MethodKind::BasicRecover,
            Method::TxSelect => MethodKind::TxSelect,
            Method::TxSelectOk => MethodKind::TxSelectOk,
            Method::TxCommit => MethodKind::TxCommit,
            Method::TxCommitOk => MethodKind::TxCommitOk,
            Method::TxRollback => MethodKind::TxRollback,
            Method::TxRollbackOk => MethodKind::TxRollbackOk,
            Method::Unknown { .. } => MethodKind::Unknown,
        }
    }

    /// Class and method ids as they appear on the wire.
    pub fn ids(&self) -> (u16, u16) {
        match self {
            Method::Unknown {
                class_id,
                method_id,
                ..
            } => (*class_id, *method_id),
            other => other.kind().ids().unwrap_or((0, 0)),
        }
    }

    /// Whether this method carries an access ticket field.
    pub fn accepts_ticket(&self) -> bool {
        matches!(
            self,
            Method::ExchangeDeclare { .. } | Method::QueueDeclare { .. }
        )
    }

    /// Overwrite the ticket field. No-op for methods without one.
    pub fn set_ticket(&mut self, value: u16) {
        match self {
            Method::ExchangeDeclare { ticket, .. } | Method::QueueDeclare { ticket, .. } => {
                *ticket = value;
            },
            _ => {},
        }
    }

    /// Encode class id, method id and arguments.
    pub fn encode(&self) -> Bytes {
        let (class_id, method_id) = self.ids();
        let mut w = ArgWriter::new();
        w.short(class_id).short(method_id);

        match self {
            Method::ConnectionStart {
                version_major,
                version_minor,
                server_properties,
                mechanisms,
                locales,
            } => {
                w.octet(*version_major)
                    .octet(*version_minor)
                    .table(server_properties)
                    .longstr(mechanisms)
                    .longstr(locales);
            },
            Method::ConnectionStartOk {
                client_properties,
                mechanism,
                response,
                locale,
            } => {
                w.table(client_properties)
                    .shortstr(mechanism)
                    .longstr(response)
                    .shortstr(locale);
            },
            Method::ConnectionTune {
                channel_max,
                frame_max,
                heartbeat,
            }
            | Method::ConnectionTuneOk {
                channel_max,
                frame_max,
                heartbeat,
            } => {
                w.short(*channel_max).long(*frame_max).short(*heartbeat);
            },
            Method::ConnectionOpen {
                virtual_host,
                capabilities,
                insist,
            } => {
                w.shortstr(virtual_host)
                    .shortstr(capabilities)
                    .bits(&[*insist]);
            },
            Method::ConnectionOpenOk { known_hosts } => {
                w.shortstr(known_hosts);
            },
            Method::ConnectionRedirect { host, known_hosts } => {
                w.shortstr(host).shortstr(known_hosts);
            },
            Method::ConnectionClose {
                reply_code,
                reply_text,
                class_id,
                method_id,
            }
            | Method::ChannelClose {
                reply_code,
                reply_text,
                class_id,
                method_id,
            } => {
                w.short(*reply_code)
                    .shortstr(reply_text)
                    .short(*class_id)
                    .short(*method_id);
            },
            Method::ChannelOpen { out_of_band } => {
                w.shortstr(out_of_band);
            },
            Method::AccessRequest {
                realm,
                exclusive,
                passive,
                active,
                write,
                read,
            } => {
                w.shortstr(realm)
                    .bits(&[*exclusive, *passive, *active, *write, *read]);
            },
            Method::AccessRequestOk { ticket } => {
                w.short(*ticket);
            },
            Method::ExchangeDeclare {
                ticket,
                exchange,
                kind,
                passive,
                durable,
                auto_delete,
                internal,
                nowait,
                arguments,
            } => {
                w.short(*ticket)
                    .shortstr(exchange)
                    .shortstr(kind)
                    .bits(&[*passive, *durable, *auto_delete, *internal, *nowait])
                    .table(arguments);
            },
            Method::QueueDeclare {
                ticket,
                queue,
                passive,
                durable,
                exclusive,
                auto_delete,
                nowait,
                arguments,
            } => {
                w.short(*ticket)
                    .shortstr(queue)
                    .bits(&[*passive, *durable, *exclusive, *auto_delete, *nowait])
                    .table(arguments);
            },
            Method::QueueDeclareOk {
                queue,
                message_count,
                consumer_count,
            } => {
                w.shortstr(queue).long(*message_count).long(*consumer_count);
            },
            Method::BasicQos {
                prefetch_size,
                prefetch_count,
                global,
            } => {
                w.long(*prefetch_size)
                    .short(*prefetch_count)
                    .bits(&[*global]);
            },
            Method::BasicRecover { requeue } => {
                w.bits(&[*requeue]);
            },
            Method::Unknown { arguments, .. } => {
                w.raw(arguments);
            },
            Method::ConnectionCloseOk
            | Method::ChannelOpenOk
            | Method::ChannelCloseOk
            | Method::ExchangeDeclareOk
            | Method::BasicQosOk
            | Method::TxSelect
            | Method::TxSelectOk
            | Method::TxCommit
            | Method::TxCommitOk
            | Method::TxRollback
            | Method::TxRollbackOk => {},
        }

        w.finish()
    }

    /// Decode a method frame payload.
    pub fn decode(payload: Bytes) -> Result<Self> {
        let mut r = ArgReader::new(payload);
        if r.remaining() < 4 {
            return Err(BurrowError::Protocol(
                "Method payload shorter than class/method header".to_string(),
            ));
        }
        let class_id = r.short()?;
        let method_id = r.short()?;

        let method = match MethodKind::from_ids(class_id, method_id) {
            MethodKind::ConnectionStart => Method::ConnectionStart {
                version_major: r.octet()?,
                version_minor: r.octet()?,
                server_properties: r.table()?,
                mechanisms: r.longstr()?,
                locales: r.longstr()?,
            },
            MethodKind::ConnectionStartOk => Method::ConnectionStartOk {
                client_properties: r.table()?,
                mechanism: r.shortstr()?,
                response: r.longstr()?,
                locale: r.shortstr()?,
            },
            MethodKind::ConnectionTune => Method::ConnectionTune {
                channel_max: r.short()?,
                frame_max: r.long()?,
                heartbeat: r.short()?,
            },
            MethodKind::ConnectionTuneOk => Method::ConnectionTuneOk {
                channel_max: r.short()?,
                frame_max: r.long()?,
                heartbeat: r.short()?,
            },
            MethodKind::ConnectionOpen => {
                let virtual_host = r.shortstr()?;
                let capabilities = r.shortstr()?;
                let [insist] = r.bits::<1>()?;
                Method::ConnectionOpen {
                    virtual_host,
                    capabilities,
                    insist,
                }
            },
            MethodKind::ConnectionOpenOk => Method::ConnectionOpenOk {
                known_hosts: r.shortstr()?,
            },
            MethodKind::ConnectionRedirect => Method::ConnectionRedirect {
                host: r.shortstr()?,
                known_hosts: r.shortstr()?,
            },
            MethodKind::ConnectionClose => Method::ConnectionClose {
                reply_code: r.short()?,
                reply_text: r.shortstr()?,
                class_id: r.short()?,
                method_id: r.short()?,
            },
            MethodKind::ConnectionCloseOk => Method::ConnectionCloseOk,
            MethodKind::ChannelOpen => Method::ChannelOpen {
                out_of_band: r.shortstr()?,
            },
            MethodKind::ChannelOpenOk => Method::ChannelOpenOk,
            MethodKind::ChannelClose => Method::ChannelClose {
                reply_code: r.short()?,
                reply_text: r.shortstr()?,
                class_id: r.short()?,
                method_id: r.short()?,
            },
            MethodKind::ChannelCloseOk => Method::ChannelCloseOk,
            MethodKind::AccessRequest => {
                let realm = r.shortstr()?;
                let [exclusive, passive, active, write, read] = r.bits::<5>()?;
                Method::AccessRequest {
                    realm,
                    exclusive,
                    passive,
                    active,
                    write,
                    read,
                }
            },
            MethodKind::AccessRequestOk => Method::AccessRequestOk { ticket: r.short()? },
            MethodKind::ExchangeDeclare => {
                let ticket = r.short()?;
                let exchange = r.shortstr()?;
                let kind = r.shortstr()?;
                let [passive, durable, auto_delete, internal, nowait] = r.bits::<5>()?;
                Method::ExchangeDeclare {
                    ticket,
                    exchange,
                    kind,
                    passive,
                    durable,
                    auto_delete,
                    internal,
                    nowait,
                    arguments: r.table()?,
                }
            },
            MethodKind::ExchangeDeclareOk => Method::ExchangeDeclareOk,
            MethodKind::QueueDeclare => {
                let ticket = r.short()?;
                let queue = r.shortstr()?;
                let [passive, durable, exclusive, auto_delete, nowait] = r.bits::<5>()?;
                Method::QueueDeclare {
                    ticket,
                    queue,
                    passive,
                    durable,
                    exclusive,
                    auto_delete,
                    nowait,
                    arguments: r.table()?,
                }
            },
            MethodKind::QueueDeclareOk => Method::QueueDeclareOk {
                queue: r.shortstr()?,
                message_count: r.long()?,
                consumer_count: r.long()?,
            },
            MethodKind::BasicQos => {
                let prefetch_size = r.long()?;
                let prefetch_count = r.short()?;
                let [global] = r.bits::<1>()?;
                Method::BasicQos {
                    prefetch_size,
                    prefetch_count,
                    global,
                }
            },
            MethodKind::BasicQosOk => Method::BasicQosOk,
            MethodKind::BasicRecover => {
                let [requeue] = r.bits::<1>()?;
                Method::BasicRecover { requeue }
            },
            MethodKind::TxSelect => Method::TxSelect,
            MethodKind::TxSelectOk => Method::TxSelectOk,
            MethodKind::TxCommit => Method::TxCommit,
            MethodKind::TxCommitOk => Method::TxCommitOk,
            MethodKind::TxRollback => Method::TxRollback,
            MethodKind::TxRollbackOk => Method::TxRollbackOk,
            MethodKind::Unknown => Method::Unknown {
                class_id,
                method_id,
                arguments: r.rest(),
            },
        };

        Ok(method)
    }
}
