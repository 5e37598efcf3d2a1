//! Field tables.
//!
//! Used for the client and server property maps exchanged during the
//! handshake and for AMQPLAIN credentials.

use std::collections::BTreeMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{BurrowError, Result};

/// Ordered field table.
pub type FieldTable = BTreeMap<String, FieldValue>;

/// A typed field table value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// `S`: long string
    LongString(String),
    /// `I`: signed 32-bit integer
    Int(i32),
    /// `D`: decimal with scale
    Decimal {
        /// Number of decimal digits
        scale: u8,
        /// Unscaled value
        value: u32,
    },
    /// `T`: 64-bit POSIX timestamp
    Timestamp(u64),
    /// `F`: nested table
    Table(FieldTable),
    /// `t`: boolean (broker extension)
    Bool(bool),
    /// `V`: no value
    Void,
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::LongString(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::LongString(s)
    }
}

impl FieldValue {
    /// String contents, if this is a long string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::LongString(s) => Some(s),
            _ => None,
        }
    }
}

/// Encode table entries without the outer length prefix.
pub fn encode_entries(table: &FieldTable) -> Bytes {
    let mut buf = BytesMut::new();
    for (name, value) in table {
        put_shortstr(&mut buf, name);
        put_value(&mut buf, value);
    }
    buf.freeze()
}

fn put_shortstr(buf: &mut BytesMut, s: &str) {
    let len = s.len().min(u8::MAX as usize);
    buf.put_u8(len as u8);
    buf.put_slice(&s.as_bytes()[..len]);
}

fn put_value(buf: &mut BytesMut, value: &FieldValue) {
    match value {
        FieldValue::LongString(s) => {
            buf.put_u8(b'S');
            buf.put_u32(s.len() as u32);
            buf.put_slice(s.as_bytes());
        },
        FieldValue::Int(v) => {
            buf.put_u8(b'I');
            buf.put_i32(*v);
        },
        FieldValue::Decimal { scale, value } => {
            buf.put_u8(b'D');
            buf.put_u8(*scale);
            buf.put_u32(*value);
        },
        FieldValue::Timestamp(v) => {
            buf.put_u8(b'T');
            buf.put_u64(*v);
        },
        FieldValue::Table(t) => {
            buf.put_u8(b'F');
            let inner = encode_entries(t);
            buf.put_u32(inner.len() as u32);
            buf.put_slice(&inner);
        },
        FieldValue::Bool(b) => {
            buf.put_u8(b't');
            buf.put_u8(u8::from(*b));
        },
        FieldValue::Void => buf.put_u8(b'V'),
    }
}

/// Decode table entries from a buffer that holds exactly the table body.
pub fn decode_entries(mut buf: Bytes) -> Result<FieldTable> {
    let mut table = FieldTable::new();
    while buf.has_remaining() {
        let name = get_shortstr(&mut buf)?;
        let value = get_value(&mut buf)?;
        table.insert(name, value);
    }
    Ok(table)
}

fn truncated(what: &str) -> BurrowError {
    BurrowError::Protocol(format!("Truncated field table ({what})"))
}

fn take(buf: &mut Bytes, n: usize, what: &str) -> Result<Bytes> {
    if buf.remaining() < n {
        return Err(truncated(what));
    }
    Ok(buf.split_to(n))
}

fn get_shortstr(buf: &mut Bytes) -> Result<String> {
    let len = take(buf, 1, "name length")?[0] as usize;
    let raw = take(buf, len, "name")?;
    String::from_utf8(raw.to_vec())
        .map_err(|e| BurrowError::Protocol(format!("Invalid UTF-8 in field name: {e}")))
}

fn get_value(buf: &mut Bytes) -> Result<FieldValue> {
    let tag = take(buf, 1, "type")?[0];
    let value = match tag {
        b'S' => {
            let len = take(buf, 4, "string length")?.get_u32() as usize;
            let raw = take(buf, len, "string")?;
            let s = String::from_utf8(raw.to_vec())
                .map_err(|e| BurrowError::Protocol(format!("Invalid UTF-8 in field value: {e}")))?;
            FieldValue::LongString(s)
        },
        b'I' => FieldValue::Int(take(buf, 4, "int")?.get_i32()),
        b'D' => {
            let mut raw = take(buf, 5, "decimal")?;
            FieldValue::Decimal {
                scale: raw.get_u8(),
                value: raw.get_u32(),
            }
        },
        b'T' => FieldValue::Timestamp(take(buf, 8, "timestamp")?.get_u64()),
        b'F' => {
            let len = take(buf, 4, "table length")?.get_u32() as usize;
            FieldValue::Table(decode_entries(take(buf, len, "table")?)?)
        },
        b't' => FieldValue::Bool(take(buf, 1, "bool")?[0] != 0),
        b'V' => FieldValue::Void,
        other => {
            return Err(BurrowError::Protocol(format!(
                "Unsupported field type '{}'",
                other as char
            )))
        },
    };
    Ok(value)
}
