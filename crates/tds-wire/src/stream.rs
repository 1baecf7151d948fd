//! Resumable token-stream decoding.
//!
//! [`TokenStreamDecoder`] consumes the accumulated payload bytes of a
//! TABULAR_RESULT message. It is a pure function of that buffer: when a
//! token is cut off mid-way it rewinds to the token's first byte and
//! reports "not yet", so feeding the same bytes in any split produces the
//! same token sequence.

use bytes::{Buf, Bytes, BytesMut};
use std::sync::Arc;

use crate::codec::{DecodeFault, DecodeResult, SliceReader};
use crate::error::WireError;
use crate::row;
use crate::token::{
    self, Column, Done, EnvChange, LoginAck, ReturnValue, ServerMessage, Token, tag,
};

/// Stateful decoder for one connection's response stream.
///
/// The only state carried between tokens is the current column schema,
/// which ROW/NBCROW need and a fresh COLMETADATA supersedes.
#[derive(Debug, Default)]
pub struct TokenStreamDecoder {
    columns: Option<Arc<[Column]>>,
}

impl TokenStreamDecoder {
    /// New decoder with no schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the current schema (start of a new request).
    pub fn reset(&mut self) {
        self.columns = None;
    }

    /// Schema of the result set currently being decoded.
    #[must_use]
    pub fn columns(&self) -> Option<&Arc<[Column]>> {
        self.columns.as_ref()
    }

    /// Decode the next token out of `buf`.
    ///
    /// `Ok(Some(_))` consumes the token's bytes from `buf`. `Ok(None)` means
    /// the buffer holds no complete token; nothing is consumed and the call
    /// must be repeated after more bytes arrive.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Token>, WireError> {
        if buf.is_empty() {
            return Ok(None);
        }
        let mut r = SliceReader::new(&buf[..]);
        match self.decode_one(&mut r) {
            Ok(token) => {
                let consumed = r.consumed();
                buf.advance(consumed);
                Ok(Some(token))
            }
            Err(DecodeFault::Incomplete) => Ok(None),
            Err(DecodeFault::Protocol(e)) => Err(e),
        }
    }

    fn decode_one(&mut self, r: &mut SliceReader<'_>) -> DecodeResult<Token> {
        let tag_byte = r.u8()?;
        let token = match tag_byte {
            tag::COLMETADATA => {
                let columns = token::decode_colmetadata(r)?;
                self.columns = Some(Arc::clone(&columns));
                Token::Metadata(columns)
            }
            tag::ROW | tag::TVP_ROW => {
                let columns = self.current_columns()?;
                Token::Row(row::read_row(r, &columns)?)
            }
            tag::NBCROW => {
                let columns = self.current_columns()?;
                Token::Row(row::read_nbc_row(r, &columns)?)
            }
            tag::DONE => Token::Done(Done::decode(r)?),
            tag::DONEPROC => Token::DoneProc(Done::decode(r)?),
            tag::DONEINPROC => Token::DoneInProc(Done::decode(r)?),
            tag::ERROR => Token::Error(ServerMessage::decode(r)?),
            tag::INFO => Token::Info(ServerMessage::decode(r)?),
            tag::LOGINACK => Token::LoginAck(LoginAck::decode(r)?),
            tag::ENVCHANGE => Token::EnvChange(EnvChange::decode(r)?),
            tag::ORDER => Token::Order(token::decode_order(r)?),
            tag::FEATUREEXTACK => Token::FeatureExtAck(token::decode_feature_ext_ack(r)?),
            tag::RETURNSTATUS => Token::ReturnStatus(r.i32_le()?),
            tag::RETURNVALUE => Token::ReturnValue(ReturnValue::decode(r)?),
            tag::SESSIONSTATE => Token::SessionState(r.l_varbyte()?),
            tag::FEDAUTHINFO => Token::FedAuthInfo(r.l_varbyte()?),
            tag::DATACLASSIFICATION => Token::DataClassification(r.us_varbyte()?),
            tag::TABNAME => Token::TabName(r.us_varbyte()?),
            tag::COLINFO => Token::ColInfo(r.us_varbyte()?),
            tag::OFFSET => Token::Offset(r.us_varbyte()?),
            tag::SSPI => Token::Sspi(r.us_varbyte()?),
            other if token::SKIPPABLE_TAGS.contains(&other) => {
                let payload = r.us_varbyte()?;
                tracing::debug!(tag = other, len = payload.len(), "skipping reserved token");
                Token::Unknown {
                    tag: other,
                    payload,
                }
            }
            other => return Err(WireError::UnknownToken(other).into()),
        };
        Ok(token)
    }

    fn current_columns(&self) -> Result<Arc<[Column]>, DecodeFault> {
        self.columns
            .clone()
            .ok_or_else(|| WireError::RowWithoutMetadata.into())
    }
}

/// Decode every token in `payload`, failing on trailing garbage.
///
/// Convenience for contexts that already hold a complete message (login
/// responses, tests).
pub fn decode_all(payload: &Bytes) -> Result<Vec<Token>, WireError> {
    let mut decoder = TokenStreamDecoder::new();
    let mut buf = BytesMut::from(&payload[..]);
    let mut tokens = Vec::new();
    while let Some(token) = decoder.decode(&mut buf)? {
        tokens.push(token);
    }
    if !buf.is_empty() {
        return Err(WireError::Malformed("trailing bytes after final token"));
    }
    Ok(tokens)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::codec::put_b_varchar;
    use bytes::BufMut;
    use proptest::prelude::*;

    /// COLMETADATA(n INT) + ROW(1) + DONE{COUNT, rows: 1}: the "hello
    /// world" exchange for `SELECT 1 AS n;`.
    fn select_one_stream() -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_u8(tag::COLMETADATA);
        buf.put_u16_le(1);
        buf.put_u32_le(0);
        buf.put_u16_le(0);
        buf.put_u8(0x38); // INT
        put_b_varchar(&mut buf, "n");

        buf.put_u8(tag::ROW);
        buf.put_i32_le(1);

        buf.put_u8(tag::DONE);
        buf.put_u16_le(0x0010); // COUNT
        buf.put_u16_le(0xC1);
        buf.put_u64_le(1);
        buf
    }

    #[test]
    fn select_one_event_sequence() {
        let mut decoder = TokenStreamDecoder::new();
        let mut buf = select_one_stream();

        match decoder.decode(&mut buf).unwrap().unwrap() {
            Token::Metadata(cols) => {
                assert_eq!(cols.len(), 1);
                assert_eq!(cols[0].name, "n");
            }
            other => panic!("expected metadata, got {other:?}"),
        }
        match decoder.decode(&mut buf).unwrap().unwrap() {
            Token::Row(values) => {
                assert_eq!(values.len(), 1);
                assert_eq!(&values[0].as_ref().unwrap()[..], &[1, 0, 0, 0]);
            }
            other => panic!("expected row, got {other:?}"),
        }
        match decoder.decode(&mut buf).unwrap().unwrap() {
            Token::Done(done) => {
                assert!(!done.has_more());
                assert_eq!(done.rows, 1);
            }
            other => panic!("expected done, got {other:?}"),
        }
        assert!(decoder.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn row_before_metadata_is_protocol_error() {
        let mut decoder = TokenStreamDecoder::new();
        let mut buf = BytesMut::new();
        buf.put_u8(tag::ROW);
        buf.put_i32_le(1);
        assert_eq!(
            decoder.decode(&mut buf).unwrap_err(),
            WireError::RowWithoutMetadata
        );
    }

    #[test]
    fn unknown_mandatory_tag_fails() {
        let mut decoder = TokenStreamDecoder::new();
        let mut buf = BytesMut::new();
        buf.put_u8(0x42);
        assert_eq!(
            decoder.decode(&mut buf).unwrap_err(),
            WireError::UnknownToken(0x42)
        );
    }

    #[test]
    fn allow_listed_tag_is_skipped() {
        let mut decoder = TokenStreamDecoder::new();
        let mut buf = BytesMut::new();
        buf.put_u8(0x61);
        buf.put_u16_le(3);
        buf.put_slice(&[1, 2, 3]);
        match decoder.decode(&mut buf).unwrap().unwrap() {
            Token::Unknown { tag: 0x61, payload } => assert_eq!(payload.len(), 3),
            other => panic!("expected unknown token, got {other:?}"),
        }
    }

    #[test]
    fn partial_token_rewinds_completely() {
        let mut decoder = TokenStreamDecoder::new();
        let full = select_one_stream();

        // Feed only part of the metadata token.
        let mut buf = BytesMut::from(&full[..5]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 5, "nothing may be consumed on a partial token");

        // Completing the buffer yields the token as if it arrived whole.
        buf.extend_from_slice(&full[5..]);
        assert!(matches!(
            decoder.decode(&mut buf).unwrap().unwrap(),
            Token::Metadata(_)
        ));
    }

    fn collect_split(stream: &[u8], split_at: usize) -> Vec<String> {
        let mut decoder = TokenStreamDecoder::new();
        let mut buf = BytesMut::new();
        let mut seen = Vec::new();
        for part in [&stream[..split_at], &stream[split_at..]] {
            buf.extend_from_slice(part);
            while let Some(token) = decoder.decode(&mut buf).unwrap() {
                seen.push(format!("{token:?}"));
            }
        }
        assert!(buf.is_empty());
        seen
    }

    proptest! {
        /// §testable-properties: any two-way split of the byte stream
        /// produces exactly the sequence the unsplit stream produces.
        #[test]
        fn split_anywhere_same_events(split in 0usize..=31) {
            let stream = select_one_stream();
            prop_assume!(split <= stream.len());
            let whole = collect_split(&stream, stream.len());
            let split_events = collect_split(&stream, split);
            prop_assert_eq!(whole, split_events);
        }
    }
}
