//! Frame dispatcher.
//!
//! Turns methods into channel-tagged frames on the way out and frames back
//! into methods on the way in. Traffic logging happens here.

use crate::codec::{Frame, FramePayload, Method};
use crate::error::{BurrowError, Result};
use crate::logging::WIRE_TARGET;
use crate::transport::SessionTransport;

use super::channel::ChannelId;

/// Method/frame layer over a [`SessionTransport`].
pub struct Dispatcher {
    transport: SessionTransport,
    log_traffic: bool,
}

impl Dispatcher {
    /// Create a dispatcher over `transport`.
    pub fn new(transport: SessionTransport, log_traffic: bool) -> Self {
        Self {
            transport,
            log_traffic,
        }
    }

    /// Underlying transport.
    pub fn transport(&self) -> &SessionTransport {
        &self.transport
    }

    /// Underlying transport, mutably.
    pub fn transport_mut(&mut self) -> &mut SessionTransport {
        &mut self.transport
    }

    /// Whether frames are being logged.
    pub fn logging(&self) -> bool {
        self.log_traffic
    }

    /// Toggle frame logging.
    pub fn set_logging(&mut self, enabled: bool) {
        self.log_traffic = enabled;
    }

    /// Write bytes that are not a frame (the protocol header).
    pub async fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        if self.log_traffic {
            tracing::info!(target: WIRE_TARGET, "send raw {:?}", bytes);
        }
        self.transport.write(bytes).await
    }

    /// Send `method` on `channel`, stamping `ticket` if the method takes one.
    pub async fn send_method(
        &mut self,
        mut method: Method,
        channel: ChannelId,
        ticket: Option<u16>,
    ) -> Result<()> {
        if let Some(ticket) = ticket {
            if method.accepts_ticket() {
                method.set_ticket(ticket);
            }
        }
        self.send_frame(&Frame::method(channel, method)).await
    }

    /// Send a prebuilt frame as-is.
    pub async fn send_frame(&mut self, frame: &Frame) -> Result<()> {
        if self.log_traffic {
            tracing::info!(target: WIRE_TARGET, "send {}", frame);
        }
        self.transport.write(&frame.encode()).await
    }

    /// Wait for the next frame. `None` if the broker closed the stream.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>> {
        let frame = self.transport.read_frame().await?;
        if self.log_traffic {
            match &frame {
                Some(frame) => tracing::info!(target: WIRE_TARGET, "received {}", frame),
                None => tracing::info!(target: WIRE_TARGET, "received end of stream"),
            }
        }
        Ok(frame)
    }

    /// Wait for the next method, skipping inbound heartbeats.
    ///
    /// Content frames are not expected by any synchronous exchange and are
    /// reported as protocol errors.
    pub async fn next_method(&mut self) -> Result<Option<Method>> {
        loop {
            let Some(frame) = self.next_frame().await? else {
                return Ok(None);
            };

            match frame.payload {
                FramePayload::Method(method) => return Ok(Some(method)),
                FramePayload::Heartbeat => {
                    tracing::trace!("Skipping broker heartbeat");
                },
                FramePayload::Header(_) | FramePayload::Body(_) => {
                    return Err(BurrowError::Protocol(format!(
                        "Unexpected content frame on channel {} while waiting for a method",
                        frame.channel
                    )));
                },
            }
        }
    }
}
