//! Shared test doubles: an in-memory connector and a scripted broker.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use burrow::codec::{FieldTable, FieldValue, Frame, FrameDecoder, FramePayload, Method, PROTOCOL_HEADER};
use burrow::error::{BurrowError, Result};
use burrow::transport::{BoxedStream, Connector, Endpoint};
use bytes::{Bytes, BytesMut};
use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};

/// Hands out queued in-memory streams and records every address dialed.
#[derive(Clone, Default)]
pub struct MockConnector {
    streams: Arc<Mutex<VecDeque<DuplexStream>>>,
    dialed: Arc<Mutex<Vec<Endpoint>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a connection and return the broker's end of it.
    pub fn add_broker(&self) -> Broker {
        let (client, server) = tokio::io::duplex(64 * 1024);
        self.streams.lock().unwrap().push_back(client);
        Broker::over(server)
    }

    /// Addresses passed to `connect`, in order.
    pub fn dialed(&self) -> Vec<Endpoint> {
        self.dialed.lock().unwrap().clone()
    }
}

impl Connector for MockConnector {
    fn connect<'a>(&'a self, endpoint: &'a Endpoint) -> BoxFuture<'a, Result<BoxedStream>> {
        Box::pin(async move {
            self.dialed.lock().unwrap().push(endpoint.clone());
            match self.streams.lock().unwrap().pop_front() {
                Some(stream) => Ok(Box::new(stream) as BoxedStream),
                None => Err(BurrowError::ServerDown(format!(
                    "Connection refused: {endpoint}"
                ))),
            }
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Broker end of a connection.
pub struct Broker<S = DuplexStream> {
    stream: S,
    buf: BytesMut,
    decoder: FrameDecoder,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Broker<S> {
    pub fn over(stream: S) -> Self {
        Self {
            stream,
            buf: BytesMut::new(),
            decoder: FrameDecoder::default(),
        }
    }

    /// Read the 8-byte protocol header.
    pub async fn read_header(&mut self) -> [u8; 8] {
        while self.buf.len() < 8 {
            let n = self.stream.read_buf(&mut self.buf).await.unwrap();
            assert!(n > 0, "client hung up before the protocol header");
        }
        let header = self.buf.split_to(8);
        let mut out = [0u8; 8];
        out.copy_from_slice(&header);
        out
    }

    /// Next frame from the client, `None` on hang-up.
    pub async fn recv_frame(&mut self) -> Option<Frame> {
        loop {
            if let Some(frame) = self.decoder.decode(&mut self.buf).unwrap() {
                return Some(frame);
            }
            if self.stream.read_buf(&mut self.buf).await.unwrap() == 0 {
                return None;
            }
        }
    }

    /// Next method from the client with its channel.
    pub async fn recv(&mut self) -> (u16, Method) {
        let frame = self.recv_frame().await.expect("client hung up");
        match frame.payload {
            FramePayload::Method(method) => (frame.channel, method),
            other => panic!("expected a method frame, got {other:?}"),
        }
    }

    pub async fn send(&mut self, channel: u16, method: Method) {
        self.send_frame(Frame::method(channel, method)).await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    pub async fn send_frame(&mut self, frame: Frame) {
        self.stream.write_all(&frame.encode()).await.unwrap();
    }

    /// Read the protocol header and reply with connection.start.
    pub async fn greet(&mut self) {
        assert_eq!(self.read_header().await, PROTOCOL_HEADER);
        self.send(0, start()).await;
    }

    /// start-ok, tune/tune-ok; returns the start-ok and the open request.
    pub async fn negotiate(&mut self) -> (Method, Method) {
        let (_, start_ok) = self.recv().await;
        assert!(matches!(start_ok, Method::ConnectionStartOk { .. }));
        self.send(
            0,
            Method::ConnectionTune {
                channel_max: 0,
                frame_max: 131072,
                heartbeat: 0,
            },
        )
        .await;
        let (_, tune_ok) = self.recv().await;
        assert!(matches!(tune_ok, Method::ConnectionTuneOk { .. }));
        let (channel, open) = self.recv().await;
        assert_eq!(channel, 0);
        assert!(matches!(open, Method::ConnectionOpen { .. }));
        (start_ok, open)
    }

    /// Full connection handshake up to open-ok.
    pub async fn accept_connection(&mut self) {
        self.greet().await;
        self.negotiate().await;
        self.send(
            0,
            Method::ConnectionOpenOk {
                known_hosts: String::new(),
            },
        )
        .await;
    }

    /// channel.open / open-ok; returns the channel number.
    pub async fn accept_channel(&mut self) -> u16 {
        let (channel, method) = self.recv().await;
        assert!(matches!(method, Method::ChannelOpen { .. }));
        self.send(channel, Method::ChannelOpenOk).await;
        channel
    }

    /// access.request / request-ok on `channel`.
    pub async fn grant_access(&mut self, channel: u16, ticket: u16) {
        let (ch, method) = self.recv().await;
        assert_eq!(ch, channel);
        assert!(matches!(method, Method::AccessRequest { .. }));
        self.send(channel, Method::AccessRequestOk { ticket }).await;
    }

    /// Everything a successful `connect` needs; returns the session channel.
    pub async fn accept_session(&mut self, ticket: u16) -> u16 {
        self.accept_connection().await;
        let channel = self.accept_channel().await;
        self.grant_access(channel, ticket).await;
        channel
    }

    /// Answer channel.close / connection.close until close-ok is sent for
    /// the connection. Returns the channels closed.
    pub async fn accept_close(&mut self) -> Vec<u16> {
        let mut closed = Vec::new();
        loop {
            match self.recv().await {
                (channel, Method::ChannelClose { .. }) => {
                    self.send(channel, Method::ChannelCloseOk).await;
                    closed.push(channel);
                },
                (0, Method::ConnectionClose { .. }) => {
                    self.send(0, Method::ConnectionCloseOk).await;
                    return closed;
                },
                (channel, other) => panic!("unexpected {other:?} on channel {channel} while closing"),
            }
        }
    }
}

/// connection.start as a RabbitMQ 1.x broker sends it.
pub fn start() -> Method {
    let mut props = FieldTable::new();
    props.insert("product".into(), FieldValue::from("RabbitMQ"));
    props.insert("version".into(), FieldValue::from("1.7.2"));
    Method::ConnectionStart {
        version_major: 8,
        version_minor: 0,
        server_properties: props,
        mechanisms: Bytes::from_static(b"PLAIN AMQPLAIN"),
        locales: Bytes::from_static(b"en_US"),
    }
}
