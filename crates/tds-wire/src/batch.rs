//! SQLBATCH request encoding.

use bytes::{Bytes, BytesMut};

use crate::codec::put_utf16;
use crate::headers::AllHeaders;

/// Encode a SQLBATCH payload: ALL_HEADERS followed by the UTF-16LE text.
#[must_use]
pub fn encode_batch(sql: &str, headers: &AllHeaders) -> Bytes {
    let mut buf = BytesMut::with_capacity(22 + sql.len() * 2);
    headers.encode(&mut buf);
    put_utf16(&mut buf, sql);
    buf.freeze()
}
