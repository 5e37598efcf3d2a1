//! AMQP 0-8 wire codec.
//!
//! The session core only needs two things from this module: turn a
//! [`Method`] into frame bytes tagged with a channel, and parse the next
//! [`Frame`] out of the inbound byte stream.
//!
//! # Wire Format
//!
//! ```text
//! Protocol header (client -> broker, once per connection):
//!   "AMQP" [1][1][major: 8][minor: 0]
//!
//! Frame:
//!   [type: 1][channel: 2][size: 4][payload][0xCE]
//!
//! Method payload:
//!   [class_id: 2][method_id: 2][arguments...]
//! ```
//!
//! All integers are big-endian.

mod buffer;
mod frame;
mod method;
mod table;

pub use frame::{frame_type, Frame, FrameDecoder, FramePayload};
pub use method::{class, Method, MethodKind};
pub use table::{encode_entries as encode_table_entries, FieldTable, FieldValue};

/// Protocol major version
pub const VERSION_MAJOR: u8 = 8;

/// Protocol minor version
pub const VERSION_MINOR: u8 = 0;

/// Bytes sent before the first frame of every connection
pub const PROTOCOL_HEADER: [u8; 8] = [b'A', b'M', b'Q', b'P', 1, 1, VERSION_MAJOR, VERSION_MINOR];

/// Default broker port
pub const PORT: u16 = 5672;

/// Frame terminator octet
pub const FRAME_END: u8 = 0xCE;

/// Type + channel + size
pub const FRAME_HEADER_SIZE: usize = 7;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_header() {
        assert_eq!(&PROTOCOL_HEADER, b"AMQP\x01\x01\x08\x00");
    }
}
