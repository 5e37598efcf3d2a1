//! Frame encoding and decoding.
//!
//! ```text
//! [type: 1][channel: 2][size: 4][payload: size][frame-end: 1 = 0xCE]
//! ```

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::method::Method;
use super::{FRAME_END, FRAME_HEADER_SIZE};
use crate::error::{BurrowError, Result};

/// Frame type octets.
pub mod frame_type {
    /// Method frame
    pub const METHOD: u8 = 1;
    /// Content header frame
    pub const HEADER: u8 = 2;
    /// Content body frame
    pub const BODY: u8 = 3;
    /// Heartbeat frame
    pub const HEARTBEAT: u8 = 8;
}

/// Frame payload variants
#[derive(Debug, Clone, PartialEq)]
pub enum FramePayload {
    /// A protocol method
    Method(Method),
    /// Content header, kept raw
    Header(Bytes),
    /// Content body, kept raw
    Body(Bytes),
    /// Keep-alive, empty
    Heartbeat,
}

/// A single frame tagged with its channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Channel number (0 = connection control)
    pub channel: u16,
    /// Frame contents
    pub payload: FramePayload,
}

impl Frame {
    /// Method frame on `channel`.
    pub fn method(channel: u16, method: Method) -> Self {
        Self {
            channel,
            payload: FramePayload::Method(method),
        }
    }

    /// Heartbeat frame. Heartbeats always travel on channel 0.
    pub fn heartbeat() -> Self {
        Self {
            channel: 0,
            payload: FramePayload::Heartbeat,
        }
    }

    /// The method carried by this frame, if any.
    pub fn into_method(self) -> Option<Method> {
        match self.payload {
            FramePayload::Method(m) => Some(m),
            _ => None,
        }
    }

    /// Encode to wire bytes.
    pub fn encode(&self) -> Bytes {
        let (kind, body) = match &self.payload {
            FramePayload::Method(m) => (frame_type::METHOD, m.encode()),
            FramePayload::Header(b) => (frame_type::HEADER, b.clone()),
            FramePayload::Body(b) => (frame_type::BODY, b.clone()),
            FramePayload::Heartbeat => (frame_type::HEARTBEAT, Bytes::new()),
        };

        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + body.len() + 1);
        buf.put_u8(kind);
        buf.put_u16(self.channel);
        buf.put_u32(body.len() as u32);
        buf.put_slice(&body);
        buf.put_u8(FRAME_END);
        buf.freeze()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            FramePayload::Method(m) => write!(f, "ch{} {} {:?}", self.channel, m.kind(), m),
            FramePayload::Header(b) => write!(f, "ch{} content-header ({} bytes)", self.channel, b.len()),
            FramePayload::Body(b) => write!(f, "ch{} content-body ({} bytes)", self.channel, b.len()),
            FramePayload::Heartbeat => write!(f, "ch{} heartbeat", self.channel),
        }
    }
}

/// Most the decoder grows the buffer by while waiting for a partial frame.
const RESERVE_LIMIT: usize = 8 * 1024;

/// Incremental frame parser over an inbound byte buffer.
#[derive(Debug, Clone, Copy)]
pub struct FrameDecoder {
    /// Largest accepted frame including header and end octet; 0 = unlimited
    max_frame: u32,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(0)
    }
}

impl FrameDecoder {
    /// Create a decoder enforcing `max_frame` (0 = unlimited).
    pub fn new(max_frame: u32) -> Self {
        Self { max_frame }
    }

    /// Current frame size limit.
    pub fn max_frame(&self) -> u32 {
        self.max_frame
    }

    /// Change the frame size limit after tuning.
    pub fn set_max_frame(&mut self, max_frame: u32) {
        self.max_frame = max_frame;
    }

    /// Parse one frame from the front of `buf`.
    ///
    /// Returns `Ok(None)` when `buf` does not yet hold a complete frame;
    /// consumed bytes are removed from `buf` only on success.
    pub fn decode(&self, buf: &mut BytesMut) -> Result<Option<Frame>> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        let kind = buf[0];
        let channel = u16::from_be_bytes([buf[1], buf[2]]);
        let size = u32::from_be_bytes([buf[3], buf[4], buf[5], buf[6]]) as usize;

        let total = FRAME_HEADER_SIZE + size + 1;
        if self.max_frame != 0 && total > self.max_frame as usize {
            return Err(BurrowError::Protocol(format!(
                "Frame of {total} bytes exceeds frame-max {}",
                self.max_frame
            )));
        }
        if buf.len() < total {
            buf.reserve((total - buf.len()).min(RESERVE_LIMIT));
            return Ok(None);
        }

        let mut frame = buf.split_to(total);
        frame.advance(FRAME_HEADER_SIZE);
        let body = frame.split_to(size).freeze();
        let end = frame[0];
        if end != FRAME_END {
            return Err(BurrowError::Protocol(format!(
                "Bad frame end octet 0x{end:02X}"
            )));
        }

        let payload = match kind {
            frame_type::METHOD => FramePayload::Method(Method::decode(body)?),
            frame_type::HEADER => FramePayload::Header(body),
            frame_type::BODY => FramePayload::Body(body),
            frame_type::HEARTBEAT => FramePayload::Heartbeat,
            other => {
                return Err(BurrowError::Protocol(format!(
                    "Unknown frame type {other}"
                )))
            },
        };

        Ok(Some(Frame { channel, payload }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_layout() {
        let bytes = Frame::heartbeat().encode();
        assert_eq!(&bytes[..], &[8, 0, 0, 0, 0, 0, 0, 0xCE]);
    }

    #[test]
    fn test_decode_waits_for_complete_frame() {
        let encoded = Frame::method(3, Method::TxSelect).encode();
        let decoder = FrameDecoder::default();

        let mut buf = BytesMut::from(&encoded[..encoded.len() - 1]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), encoded.len() - 1);

        buf.put_u8(FRAME_END);
        let frame = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame, Frame::method(3, Method::TxSelect));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_two_frames_back_to_back() {
        let mut buf = BytesMut::new();
        buf.put_slice(&Frame::method(1, Method::TxCommitOk).encode());
        buf.put_slice(&Frame::heartbeat().encode());

        let decoder = FrameDecoder::default();
        let first = decoder.decode(&mut buf).unwrap().unwrap();
        let second = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.into_method(), Some(Method::TxCommitOk));
        assert_eq!(second.payload, FramePayload::Heartbeat);
    }

    #[test]
    fn test_bad_frame_end() {
        let mut raw = BytesMut::from(&Frame::heartbeat().encode()[..]);
        raw[7] = 0x00;
        let err = FrameDecoder::default().decode(&mut raw).unwrap_err();
        assert!(err.to_string().contains("Bad frame end"));
    }

    #[test]
    fn test_unknown_frame_type() {
        let mut raw = BytesMut::from(&[9u8, 0, 0, 0, 0, 0, 0, 0xCE][..]);
        assert!(FrameDecoder::default().decode(&mut raw).unwrap_err().is_protocol());
    }

    #[test]
    fn test_frame_max_enforced() {
        let frame = Frame::method(
            1,
            Method::ChannelClose {
                reply_code: 200,
                reply_text: "x".repeat(64),
                class_id: 0,
                method_id: 0,
            },
        );
        let mut buf = BytesMut::from(&frame.encode()[..]);
        let err = FrameDecoder::new(32).decode(&mut buf).unwrap_err();
        assert!(err.to_string().contains("exceeds frame-max 32"));
    }

    #[test]
    fn test_oversized_header_does_not_preallocate() {
        let mut buf = BytesMut::from(&[1u8, 0, 0, 0xFF, 0xFF, 0xFF, 0xF0][..]);
        assert!(FrameDecoder::default().decode(&mut buf).unwrap().is_none());
        assert!(buf.capacity() <= 2 * RESERVE_LIMIT);
    }

    #[test]
    fn test_oversized_header_rejected_under_limit() {
        let mut buf = BytesMut::from(&[1u8, 0, 0, 0xFF, 0xFF, 0xFF, 0xF0][..]);
        let err = FrameDecoder::new(131072).decode(&mut buf).unwrap_err();
        assert!(err.is_protocol());
        assert!(err.to_string().contains("exceeds frame-max 131072"));
    }
}
