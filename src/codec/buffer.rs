//! Primitive AMQP field encoding.
//!
//! Integers are big-endian. Short strings carry a one-octet length, long
//! strings a four-octet length. Consecutive bit fields pack into octets,
//! least significant bit first.

#![allow(missing_docs)]

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::table::{self, FieldTable};
use crate::error::{BurrowError, Result};

/// Cursor over a method's argument bytes.
pub struct ArgReader {
    buf: Bytes,
}

impl ArgReader {
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn need(&self, n: usize, what: &str) -> Result<()> {
        if self.buf.remaining() < n {
            return Err(BurrowError::Protocol(format!(
                "Truncated {what}: need {n} bytes, have {}",
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    pub fn octet(&mut self) -> Result<u8> {
        self.need(1, "octet")?;
        Ok(self.buf.get_u8())
    }

    pub fn short(&mut self) -> Result<u16> {
        self.need(2, "short")?;
        Ok(self.buf.get_u16())
    }

    pub fn long(&mut self) -> Result<u32> {
        self.need(4, "long")?;
        Ok(self.buf.get_u32())
    }

    pub fn longlong(&mut self) -> Result<u64> {
        self.need(8, "longlong")?;
        Ok(self.buf.get_u64())
    }

    pub fn shortstr(&mut self) -> Result<String> {
        let len = self.octet()? as usize;
        self.need(len, "shortstr")?;
        let raw = self.buf.split_to(len);
        String::from_utf8(raw.to_vec())
            .map_err(|e| BurrowError::Protocol(format!("Invalid UTF-8 in shortstr: {e}")))
    }

    pub fn longstr(&mut self) -> Result<Bytes> {
        let len = self.long()? as usize;
        self.need(len, "longstr")?;
        Ok(self.buf.split_to(len))
    }

    pub fn table(&mut self) -> Result<FieldTable> {
        let raw = self.longstr()?;
        table::decode_entries(raw)
    }

    /// Read `N` packed bits from a single octet.
    pub fn bits<const N: usize>(&mut self) -> Result<[bool; N]> {
        let byte = self.octet()?;
        let mut out = [false; N];
        for (i, bit) in out.iter_mut().enumerate() {
            *bit = byte & (1 << i) != 0;
        }
        Ok(out)
    }

    pub fn rest(&mut self) -> Bytes {
        let len = self.buf.remaining();
        self.buf.split_to(len)
    }
}

/// Builder for a method's argument bytes.
#[derive(Default)]
pub struct ArgWriter {
    buf: BytesMut,
}

impl ArgWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn octet(&mut self, v: u8) -> &mut Self {
        self.buf.put_u8(v);
        self
    }

    pub fn short(&mut self, v: u16) -> &mut Self {
        self.buf.put_u16(v);
        self
    }

    pub fn long(&mut self, v: u32) -> &mut Self {
        self.buf.put_u32(v);
        self
    }

    pub fn longlong(&mut self, v: u64) -> &mut Self {
        self.buf.put_u64(v);
        self
    }

    /// Short strings longer than 255 bytes are truncated at a char boundary.
    pub fn shortstr(&mut self, v: &str) -> &mut Self {
        let mut end = v.len().min(u8::MAX as usize);
        while !v.is_char_boundary(end) {
            end -= 1;
        }
        self.buf.put_u8(end as u8);
        self.buf.put_slice(&v.as_bytes()[..end]);
        self
    }

    pub fn longstr(&mut self, v: &[u8]) -> &mut Self {
        self.buf.put_u32(v.len() as u32);
        self.buf.put_slice(v);
        self
    }

    pub fn table(&mut self, t: &FieldTable) -> &mut Self {
        let entries = table::encode_entries(t);
        self.longstr(&entries)
    }

    pub fn bits(&mut self, bits: &[bool]) -> &mut Self {
        let byte = bits
            .iter()
            .enumerate()
            .fold(0u8, |acc, (i, &b)| if b { acc | (1 << i) } else { acc });
        self.buf.put_u8(byte);
        self
    }

    pub fn raw(&mut self, v: &[u8]) -> &mut Self {
        self.buf.put_slice(v);
        self
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}
