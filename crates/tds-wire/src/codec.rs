//! Byte-level codec primitives.
//!
//! Every reader here either yields a fully decoded value or reports
//! [`NeedMore`] *without consuming anything observable*: the caller keeps its
//! own position snapshot and simply retries once more bytes have arrived.
//! This is the contract the resumable token decoder is built on.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::WireError;

/// Distinguished "not enough bytes yet" outcome.
///
/// This is not an error: the producing socket simply has not delivered the
/// rest of the value. Callers rewind and retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeedMore;

/// Failure mode of a decode attempt against a partially received buffer.
#[derive(Debug)]
pub enum DecodeFault {
    /// More bytes are required; the attempt must be rewound and retried.
    Incomplete,
    /// The bytes already present are invalid; no amount of further input
    /// can repair the stream.
    Protocol(WireError),
}

impl From<NeedMore> for DecodeFault {
    fn from(_: NeedMore) -> Self {
        Self::Incomplete
    }
}

impl From<WireError> for DecodeFault {
    fn from(e: WireError) -> Self {
        Self::Protocol(e)
    }
}

/// Result alias for resumable decoders.
pub type DecodeResult<T> = Result<T, DecodeFault>;

/// PLP sentinel: total length unknown until the terminator chunk.
pub const PLP_UNKNOWN_LEN: u64 = 0xFFFF_FFFF_FFFF_FFFE;

/// PLP sentinel: the value is NULL.
pub const PLP_NULL: u64 = 0xFFFF_FFFF_FFFF_FFFF;

/// A cursor over a borrowed byte slice that never partially consumes.
///
/// Each accessor advances the cursor only when the whole value was present.
/// [`SliceReader::consumed`] reports how far the cursor has moved, which the
/// token decoder uses to `advance` the receive buffer after a token decodes
/// in full.
#[derive(Debug)]
pub struct SliceReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> SliceReader<'a> {
    /// Create a reader over `buf`.
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes consumed so far.
    #[must_use]
    pub fn consumed(&self) -> usize {
        self.pos
    }

    /// Bytes still available.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// True when the reader is exhausted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pos == self.buf.len()
    }

    /// Borrow `n` bytes and advance, or report [`NeedMore`].
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], NeedMore> {
        if self.remaining() < n {
            return Err(NeedMore);
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Look at the next byte without consuming it.
    pub fn peek_u8(&self) -> Result<u8, NeedMore> {
        self.buf.get(self.pos).copied().ok_or(NeedMore)
    }

    /// Skip `n` bytes.
    pub fn skip(&mut self, n: usize) -> Result<(), NeedMore> {
        self.take(n).map(|_| ())
    }

    /// Read an unsigned byte.
    pub fn u8(&mut self) -> Result<u8, NeedMore> {
        Ok(self.take(1)?[0])
    }

    /// Read a little-endian u16.
    pub fn u16_le(&mut self) -> Result<u16, NeedMore> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Read a big-endian u16 (packet header lengths only).
    pub fn u16_be(&mut self) -> Result<u16, NeedMore> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Read a little-endian u32.
    pub fn u32_le(&mut self) -> Result<u32, NeedMore> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a little-endian i32.
    pub fn i32_le(&mut self) -> Result<i32, NeedMore> {
        self.u32_le().map(|v| v as i32)
    }

    /// Read a little-endian u64.
    pub fn u64_le(&mut self) -> Result<u64, NeedMore> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Copy `n` bytes out as an owned [`Bytes`].
    pub fn bytes(&mut self, n: usize) -> Result<Bytes, NeedMore> {
        self.take(n).map(Bytes::copy_from_slice)
    }

    /// Read a UTF-16LE string of `chars` code units.
    pub fn utf16(&mut self, chars: usize, what: &'static str) -> DecodeResult<String> {
        let raw = self.take(chars * 2)?;
        let units: Vec<u16> = raw
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        String::from_utf16(&units).map_err(|_| WireError::InvalidUtf16(what).into())
    }

    /// Read a B_VARCHAR: 1-byte code-unit count, UTF-16LE payload.
    pub fn b_varchar(&mut self, what: &'static str) -> DecodeResult<String> {
        let len = self.u8()? as usize;
        self.utf16(len, what)
    }

    /// Read a US_VARCHAR: 2-byte code-unit count, UTF-16LE payload.
    pub fn us_varchar(&mut self, what: &'static str) -> DecodeResult<String> {
        let len = self.u16_le()? as usize;
        self.utf16(len, what)
    }

    /// Read a B_VARBYTE: 1-byte length, raw payload.
    pub fn b_varbyte(&mut self) -> Result<Bytes, NeedMore> {
        let len = self.u8()? as usize;
        self.bytes(len)
    }

    /// Read a US_VARBYTE: 2-byte length, raw payload.
    pub fn us_varbyte(&mut self) -> Result<Bytes, NeedMore> {
        let len = self.u16_le()? as usize;
        self.bytes(len)
    }

    /// Read an L_VARBYTE: 4-byte length, raw payload.
    pub fn l_varbyte(&mut self) -> Result<Bytes, NeedMore> {
        let len = self.u32_le()? as usize;
        self.bytes(len)
    }

    /// Read a Partially-Length-Prefixed value.
    ///
    /// The 8-byte total is either the NULL sentinel, the unknown-length
    /// sentinel, or an actual byte count; either way the payload is the
    /// concatenation of 4-byte-length-prefixed chunks terminated by a
    /// zero-length chunk. Returns `None` for NULL.
    pub fn plp(&mut self) -> Result<Option<Bytes>, NeedMore> {
        let total = self.u64_le()?;
        if total == PLP_NULL {
            return Ok(None);
        }
        let mut out = if total == PLP_UNKNOWN_LEN {
            Vec::new()
        } else {
            Vec::with_capacity(total.min(1 << 24) as usize)
        };
        loop {
            let chunk_len = self.u32_le()? as usize;
            if chunk_len == 0 {
                break;
            }
            out.extend_from_slice(self.take(chunk_len)?);
        }
        Ok(Some(out.into()))
    }
}

/// Write a UTF-16LE string with no prefix.
pub fn put_utf16(dst: &mut BytesMut, s: &str) {
    for unit in s.encode_utf16() {
        dst.put_u16_le(unit);
    }
}

/// Write a B_VARCHAR (1-byte code-unit count + UTF-16LE).
pub fn put_b_varchar(dst: &mut BytesMut, s: &str) {
    let units: Vec<u16> = s.encode_utf16().collect();
    let len = units.len().min(u8::MAX as usize);
    dst.put_u8(len as u8);
    for &unit in &units[..len] {
        dst.put_u16_le(unit);
    }
}

/// Write a US_VARCHAR (2-byte code-unit count + UTF-16LE).
pub fn put_us_varchar(dst: &mut BytesMut, s: &str) {
    let units: Vec<u16> = s.encode_utf16().collect();
    let len = units.len().min(u16::MAX as usize);
    dst.put_u16_le(len as u16);
    for &unit in &units[..len] {
        dst.put_u16_le(unit);
    }
}

/// Number of UTF-16 code units `s` encodes to.
#[must_use]
pub fn utf16_units(s: &str) -> usize {
    s.encode_utf16().count()
}
