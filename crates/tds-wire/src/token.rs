//! Response token definitions and their decoders.
//!
//! A TABULAR_RESULT body is a sequence of tagged tokens. Every decoder here
//! follows the crate-wide resumption contract: [`DecodeFault::Incomplete`]
//! when the token is cut off at the end of the received bytes, a
//! [`WireError`] when the bytes themselves are wrong. Length-prefixed tokens
//! convert truncation *inside* their declared length into a protocol error,
//! since no further input can complete them.

use std::sync::Arc;

use bitflags::bitflags;
use bytes::Bytes;

use crate::codec::{DecodeFault, DecodeResult, SliceReader};
use crate::collation::Collation;
use crate::error::WireError;
use crate::row;
use crate::typeinfo::{TypeId, TypeInfo};

/// Token tag bytes.
pub mod tag {
    /// COLMETADATA.
    pub const COLMETADATA: u8 = 0x81;
    /// ROW.
    pub const ROW: u8 = 0xD1;
    /// NBCROW.
    pub const NBCROW: u8 = 0xD2;
    /// TVP_ROW; same shape as ROW.
    pub const TVP_ROW: u8 = 0x01;
    /// DONE.
    pub const DONE: u8 = 0xFD;
    /// DONEPROC.
    pub const DONEPROC: u8 = 0xFE;
    /// DONEINPROC.
    pub const DONEINPROC: u8 = 0xFF;
    /// ERROR.
    pub const ERROR: u8 = 0xAA;
    /// INFO.
    pub const INFO: u8 = 0xAB;
    /// LOGINACK.
    pub const LOGINACK: u8 = 0xAD;
    /// ENVCHANGE.
    pub const ENVCHANGE: u8 = 0xE3;
    /// ORDER.
    pub const ORDER: u8 = 0xA9;
    /// FEATUREEXTACK.
    pub const FEATUREEXTACK: u8 = 0xAE;
    /// RETURNSTATUS.
    pub const RETURNSTATUS: u8 = 0x79;
    /// RETURNVALUE.
    pub const RETURNVALUE: u8 = 0xAC;
    /// SESSIONSTATE.
    pub const SESSIONSTATE: u8 = 0xE4;
    /// FEDAUTHINFO.
    pub const FEDAUTHINFO: u8 = 0xEE;
    /// DATACLASSIFICATION.
    pub const DATACLASSIFICATION: u8 = 0xA3;
    /// TABNAME.
    pub const TABNAME: u8 = 0xA4;
    /// COLINFO.
    pub const COLINFO: u8 = 0xA5;
    /// OFFSET.
    pub const OFFSET: u8 = 0x78;
    /// SSPI.
    pub const SSPI: u8 = 0xED;
}

/// Reserved tags that are skipped through a 2-byte length probe rather than
/// failing the stream.
pub const SKIPPABLE_TAGS: [u8; 4] = [0x04, 0x61, 0x74, 0xC1];

/// One decoded response token.
#[derive(Debug, Clone)]
pub enum Token {
    /// Schema of the rows that follow; supersedes any previous schema.
    Metadata(Arc<[Column]>),
    /// One row, aligned with the latest [`Token::Metadata`].
    Row(Vec<Option<Bytes>>),
    /// Statement completion.
    Done(Done),
    /// Stored-procedure completion.
    DoneProc(Done),
    /// Completion of one statement inside a procedure.
    DoneInProc(Done),
    /// Server error message.
    Error(ServerMessage),
    /// Server informational message.
    Info(ServerMessage),
    /// Login acknowledgement.
    LoginAck(LoginAck),
    /// Session environment change.
    EnvChange(EnvChange),
    /// Ordinals of the ORDER BY columns.
    Order(Vec<u16>),
    /// Acknowledged login feature extensions.
    FeatureExtAck(Vec<FeatureAck>),
    /// Procedure return status.
    ReturnStatus(i32),
    /// Output parameter or function result.
    ReturnValue(ReturnValue),
    /// Opaque session-recovery state, captured verbatim.
    SessionState(Bytes),
    /// Opaque federated-auth information, captured verbatim.
    FedAuthInfo(Bytes),
    /// Opaque data-classification payload.
    DataClassification(Bytes),
    /// Opaque table-name payload.
    TabName(Bytes),
    /// Opaque column-info payload.
    ColInfo(Bytes),
    /// Opaque text-pointer offset payload.
    Offset(Bytes),
    /// SSPI challenge payload.
    Sspi(Bytes),
    /// A reserved tag from the skippable allow-list.
    Unknown {
        /// The tag byte.
        tag: u8,
        /// Its length-prefixed payload.
        payload: Bytes,
    },
}

bitflags! {
    /// COLMETADATA per-column flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ColumnFlags: u16 {
        /// Column accepts NULL.
        const NULLABLE = 0x0001;
        /// Case-sensitive comparisons.
        const CASE_SENSITIVE = 0x0002;
        /// Writable column.
        const UPDATEABLE = 0x0004;
        /// Updateability unknown.
        const UPDATEABLE_UNKNOWN = 0x0008;
        /// Identity column.
        const IDENTITY = 0x0010;
        /// Computed column.
        const COMPUTED = 0x0020;
        /// Fixed-length CLR type.
        const FIXED_LEN_CLR = 0x0100;
        /// Member of a sparse column set.
        const SPARSE = 0x0200;
        /// Encrypted (Always Encrypted).
        const ENCRYPTED = 0x0400;
        /// Hidden from the select list.
        const HIDDEN = 0x2000;
        /// Part of a browse key.
        const KEY = 0x4000;
        /// Nullability unknown at plan time.
        const NULLABLE_UNKNOWN = 0x8000;
    }
}

/// One column of a result-set schema.
#[derive(Debug, Clone)]
pub struct Column {
    /// Column name; may be empty for unnamed expressions.
    pub name: String,
    /// Server user-type id.
    pub user_type: u32,
    /// Column flags.
    pub flags: ColumnFlags,
    /// Wire type descriptor.
    pub type_info: TypeInfo,
    /// Dotted base-table name, only present for TEXT/NTEXT/IMAGE columns.
    pub table: Option<String>,
}

bitflags! {
    /// DONE status word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DoneStatus: u16 {
        /// Another result set follows on this request.
        const MORE = 0x0001;
        /// The statement produced an error.
        const ERROR = 0x0002;
        /// A transaction is open.
        const IN_XACT = 0x0004;
        /// `rows` is meaningful.
        const COUNT = 0x0010;
        /// Acknowledges an ATTENTION.
        const ATTENTION = 0x0020;
        /// A server error terminated the batch.
        const SRV_ERROR = 0x0100;
    }
}

/// DONE / DONEPROC / DONEINPROC body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Done {
    /// Status bits.
    pub status: DoneStatus,
    /// Token of the current command.
    pub command: u16,
    /// Affected/returned row count, valid when [`DoneStatus::COUNT`] is set.
    pub rows: u64,
}

impl Done {
    /// Whether more result sets follow within the same request.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.status.contains(DoneStatus::MORE)
    }

    /// Whether this DONE acknowledges a cancellation.
    #[must_use]
    pub fn is_attention_ack(&self) -> bool {
        self.status.contains(DoneStatus::ATTENTION)
    }

    pub(crate) fn decode(r: &mut SliceReader<'_>) -> DecodeResult<Self> {
        Ok(Self {
            status: DoneStatus::from_bits_truncate(r.u16_le()?),
            command: r.u16_le()?,
            rows: r.u64_le()?,
        })
    }
}

/// ERROR/INFO body: the server's diagnostic record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerMessage {
    /// Message number.
    pub number: i32,
    /// State code qualifying the number.
    pub state: u8,
    /// Severity class, 0-25.
    pub class: u8,
    /// Message text.
    pub text: String,
    /// Reporting server name.
    pub server: String,
    /// Procedure the message originated in, if any.
    pub procedure: String,
    /// Line number within the batch or procedure.
    pub line: i32,
}

impl ServerMessage {
    /// Severity 11 and above is an error surfaced to the caller.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.class >= 11
    }

    /// Severity 20 and above terminates the connection.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.class >= 20
    }

    pub(crate) fn decode(r: &mut SliceReader<'_>) -> DecodeResult<Self> {
        let mut body = bounded(r, "server message")?;
        let message = Self {
            number: body.i32_le().map_err(in_body)?,
            state: body.u8().map_err(in_body)?,
            class: body.u8().map_err(in_body)?,
            text: complete(body.us_varchar("message text"))?,
            server: complete(body.b_varchar("server name"))?,
            procedure: complete(body.b_varchar("procedure name"))?,
            line: body.i32_le().map_err(in_body)?,
        };
        Ok(message)
    }
}

/// LOGINACK body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginAck {
    /// Accepted interface (1 = T-SQL).
    pub interface: u8,
    /// TDS version in effect, raw wire value.
    pub tds_version: u32,
    /// Server program name.
    pub program: String,
    /// Server program version, packed.
    pub version: u32,
}

impl LoginAck {
    pub(crate) fn decode(r: &mut SliceReader<'_>) -> DecodeResult<Self> {
        let mut body = bounded(r, "LOGINACK")?;
        Ok(Self {
            interface: body.u8().map_err(in_body)?,
            tds_version: body.u32_le().map_err(in_body)?,
            program: complete(body.b_varchar("program name"))?,
            version: body.u32_le().map_err(in_body)?,
        })
    }
}

/// ENVCHANGE notification.
#[derive(Debug, Clone, PartialEq)]
pub enum EnvChange {
    /// Current database changed.
    Database {
        /// New database name.
        new: String,
        /// Previous database name.
        old: String,
    },
    /// Session language changed.
    Language {
        /// New language.
        new: String,
        /// Previous language.
        old: String,
    },
    /// Negotiated packet size changed; the framer must follow suit.
    PacketSize(u32),
    /// Default collation changed.
    SqlCollation(Option<Collation>),
    /// A transaction began; the descriptor goes into subsequent ALL_HEADERS.
    BeginTransaction(u64),
    /// The transaction committed.
    CommitTransaction,
    /// The transaction rolled back.
    RollbackTransaction,
    /// A local transaction was promoted to distributed; opaque DTC token.
    PromoteTransaction(Bytes),
    /// The transaction ended for another reason (e.g. failover).
    TransactionEnded,
    /// The server acknowledged a RESETCONNECTION request.
    ResetConnectionAck,
    /// The server redirects the session to another endpoint.
    Routing {
        /// Target host.
        host: String,
        /// Target TCP port.
        port: u16,
    },
    /// Any change type this client does not interpret.
    Other {
        /// ENVCHANGE type byte.
        ty: u8,
        /// Raw body after the type byte.
        payload: Bytes,
    },
}

impl EnvChange {
    pub(crate) fn decode(r: &mut SliceReader<'_>) -> DecodeResult<Self> {
        let mut body = bounded(r, "ENVCHANGE")?;
        let ty = body.u8().map_err(in_body)?;
        let change = match ty {
            1 => Self::Database {
                new: complete(body.b_varchar("database"))?,
                old: complete(body.b_varchar("old database"))?,
            },
            2 => Self::Language {
                new: complete(body.b_varchar("language"))?,
                old: complete(body.b_varchar("old language"))?,
            },
            4 => {
                let text = complete(body.b_varchar("packet size"))?;
                let size = text
                    .parse::<u32>()
                    .map_err(|_| WireError::Malformed("non-numeric packet size"))?;
                Self::PacketSize(size)
            }
            7 => {
                let new = body.b_varbyte().map_err(in_body)?;
                let collation = if new.len() >= 5 {
                    let mut cr = SliceReader::new(&new);
                    Some(Collation::decode(&mut cr).map_err(in_body)?)
                } else {
                    None
                };
                Self::SqlCollation(collation)
            }
            8 => {
                let new = body.b_varbyte().map_err(in_body)?;
                if new.len() != 8 {
                    return Err(WireError::Malformed("transaction descriptor length").into());
                }
                let mut dr = SliceReader::new(&new);
                Self::BeginTransaction(dr.u64_le().map_err(in_body)?)
            }
            9 => Self::CommitTransaction,
            10 => Self::RollbackTransaction,
            15 => Self::PromoteTransaction(body.b_varbyte().map_err(in_body)?),
            17 => Self::TransactionEnded,
            18 => Self::ResetConnectionAck,
            20 => {
                // Inner structure: length, protocol, port, host, old value.
                let _inner_len = body.u16_le().map_err(in_body)?;
                let protocol = body.u8().map_err(in_body)?;
                if protocol != 0 {
                    return Err(WireError::UnsupportedRoutingProtocol(protocol).into());
                }
                let port = body.u16_le().map_err(in_body)?;
                let host = complete(body.us_varchar("routing host"))?;
                Self::Routing { host, port }
            }
            other => {
                let rest = body.remaining();
                Self::Other {
                    ty: other,
                    payload: body.bytes(rest).map_err(in_body)?,
                }
            }
        };
        Ok(change)
    }
}

/// One acknowledged feature extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureAck {
    /// Feature id from the LOGIN7 FEATUREEXT block.
    pub feature: u8,
    /// Feature-specific acknowledgement data.
    pub data: Bytes,
}

/// RETURNVALUE body: an output parameter or scalar function result.
#[derive(Debug, Clone)]
pub struct ReturnValue {
    /// Ordinal of the parameter in the request.
    pub ordinal: u16,
    /// Parameter name, including the `@`.
    pub name: String,
    /// Status byte (1 = output parameter, 2 = function result).
    pub status: u8,
    /// Server user-type id.
    pub user_type: u32,
    /// Flags word.
    pub flags: u16,
    /// Wire type of the value.
    pub type_info: TypeInfo,
    /// The value bytes; `None` for NULL.
    pub value: Option<Bytes>,
}

impl ReturnValue {
    pub(crate) fn decode(r: &mut SliceReader<'_>) -> DecodeResult<Self> {
        let ordinal = r.u16_le()?;
        let name = r.b_varchar("parameter name")?;
        let status = r.u8()?;
        let user_type = r.u32_le()?;
        let flags = r.u16_le()?;
        let type_info = TypeInfo::decode(r)?;
        let value = row::read_value(r, &type_info)?;
        Ok(Self {
            ordinal,
            name,
            status,
            user_type,
            flags,
            type_info,
            value,
        })
    }
}

/// COLMETADATA decoder: the column count, then each column descriptor.
pub(crate) fn decode_colmetadata(r: &mut SliceReader<'_>) -> DecodeResult<Arc<[Column]>> {
    let count = r.u16_le()?;
    if count == 0xFFFF {
        return Ok(Vec::new().into());
    }
    let mut columns = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let user_type = r.u32_le()?;
        let flags = ColumnFlags::from_bits_truncate(r.u16_le()?);
        let type_info = TypeInfo::decode(r)?;
        let table = if matches!(type_info.id, TypeId::Text | TypeId::NText | TypeId::Image) {
            let parts = r.u8()?;
            let mut names = Vec::with_capacity(parts as usize);
            for _ in 0..parts {
                names.push(r.us_varchar("table name part")?);
            }
            Some(names.join("."))
        } else {
            None
        };
        let name = r.b_varchar("column name")?;
        columns.push(Column {
            name,
            user_type,
            flags,
            type_info,
            table,
        });
    }
    Ok(columns.into())
}

/// ORDER decoder: an even-length list of u16 ordinals.
pub(crate) fn decode_order(r: &mut SliceReader<'_>) -> DecodeResult<Vec<u16>> {
    let len = r.u16_le()?;
    if len % 2 != 0 {
        return Err(WireError::OddOrderLength(len).into());
    }
    let mut body = bounded_len(r, len as usize, "ORDER")?;
    let mut ordinals = Vec::with_capacity(len as usize / 2);
    for _ in 0..len / 2 {
        ordinals.push(body.u16_le().map_err(in_body)?);
    }
    Ok(ordinals)
}

/// FEATUREEXTACK decoder: (id, data) pairs until the 0xFF terminator.
pub(crate) fn decode_feature_ext_ack(r: &mut SliceReader<'_>) -> DecodeResult<Vec<FeatureAck>> {
    let mut features = Vec::new();
    loop {
        let feature = r.u8()?;
        if feature == 0xFF {
            return Ok(features);
        }
        let len = r.u32_le()? as usize;
        let data = r.bytes(len)?;
        features.push(FeatureAck { feature, data });
    }
}

/// Take a `u16`-length-prefixed token body as its own reader.
fn bounded<'a>(
    r: &mut SliceReader<'a>,
    _what: &'static str,
) -> Result<SliceReader<'a>, DecodeFault> {
    let len = r.u16_le()? as usize;
    bounded_len(r, len, _what)
}

fn bounded_len<'a>(
    r: &mut SliceReader<'a>,
    len: usize,
    _what: &'static str,
) -> Result<SliceReader<'a>, DecodeFault> {
    Ok(SliceReader::new(r.take(len)?))
}

/// Inside a length-bounded body, running out of bytes is a protocol error.
fn in_body(_: crate::codec::NeedMore) -> DecodeFault {
    WireError::Malformed("token body shorter than its declared length").into()
}

fn complete<T>(res: DecodeResult<T>) -> DecodeResult<T> {
    match res {
        Err(DecodeFault::Incomplete) => {
            Err(WireError::Malformed("token body shorter than its declared length").into())
        }
        other => other,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};

    #[test]
    fn done_decodes_status_bits() {
        let mut buf = BytesMut::new();
        buf.put_u16_le(0x0011); // MORE | COUNT
        buf.put_u16_le(0xC1);
        buf.put_u64_le(42);
        let mut r = SliceReader::new(&buf);
        let done = Done::decode(&mut r).unwrap();
        assert!(done.has_more());
        assert!(done.status.contains(DoneStatus::COUNT));
        assert_eq!(done.rows, 42);
        assert!(!done.is_attention_ack());
    }

    #[test]
    fn server_message_roundtrip() {
        let mut body = BytesMut::new();
        body.put_i32_le(2627);
        body.put_u8(1);
        body.put_u8(14);
        crate::codec::put_us_varchar(&mut body, "Violation of UNIQUE KEY constraint");
        crate::codec::put_b_varchar(&mut body, "sqlhost");
        crate::codec::put_b_varchar(&mut body, "");
        body.put_i32_le(12);

        let mut buf = BytesMut::new();
        buf.put_u16_le(body.len() as u16);
        buf.put_slice(&body);

        let mut r = SliceReader::new(&buf);
        let msg = ServerMessage::decode(&mut r).unwrap();
        assert_eq!(msg.number, 2627);
        assert_eq!(msg.class, 14);
        assert!(msg.is_error());
        assert!(!msg.is_fatal());
        assert_eq!(msg.server, "sqlhost");
        assert_eq!(msg.line, 12);
        assert!(r.is_empty());
    }

    #[test]
    fn envchange_database() {
        let mut body = BytesMut::new();
        body.put_u8(1);
        crate::codec::put_b_varchar(&mut body, "orders");
        crate::codec::put_b_varchar(&mut body, "master");
        let mut buf = BytesMut::new();
        buf.put_u16_le(body.len() as u16);
        buf.put_slice(&body);

        let mut r = SliceReader::new(&buf);
        match EnvChange::decode(&mut r).unwrap() {
            EnvChange::Database { new, old } => {
                assert_eq!(new, "orders");
                assert_eq!(old, "master");
            }
            other => panic!("unexpected change {other:?}"),
        }
    }

    #[test]
    fn envchange_packet_size() {
        let mut body = BytesMut::new();
        body.put_u8(4);
        crate::codec::put_b_varchar(&mut body, "8192");
        crate::codec::put_b_varchar(&mut body, "4096");
        let mut buf = BytesMut::new();
        buf.put_u16_le(body.len() as u16);
        buf.put_slice(&body);

        let mut r = SliceReader::new(&buf);
        assert_eq!(EnvChange::decode(&mut r).unwrap(), EnvChange::PacketSize(8192));
    }

    #[test]
    fn envchange_begin_transaction() {
        let mut body = BytesMut::new();
        body.put_u8(8);
        body.put_u8(8);
        body.put_u64_le(0x0102_0304_0506_0708);
        body.put_u8(0);
        let mut buf = BytesMut::new();
        buf.put_u16_le(body.len() as u16);
        buf.put_slice(&body);

        let mut r = SliceReader::new(&buf);
        assert_eq!(
            EnvChange::decode(&mut r).unwrap(),
            EnvChange::BeginTransaction(0x0102_0304_0506_0708)
        );
    }

    #[test]
    fn envchange_routing() {
        let mut inner = BytesMut::new();
        inner.put_u8(0); // protocol: TCP
        inner.put_u16_le(11_000);
        crate::codec::put_us_varchar(&mut inner, "replica.example");

        let mut body = BytesMut::new();
        body.put_u8(20);
        body.put_u16_le(inner.len() as u16);
        body.put_slice(&inner);
        body.put_u16_le(0); // old value

        let mut buf = BytesMut::new();
        buf.put_u16_le(body.len() as u16);
        buf.put_slice(&body);

        let mut r = SliceReader::new(&buf);
        assert_eq!(
            EnvChange::decode(&mut r).unwrap(),
            EnvChange::Routing {
                host: "replica.example".into(),
                port: 11_000,
            }
        );
    }

    #[test]
    fn envchange_unknown_type_is_tolerated() {
        let mut buf = BytesMut::new();
        buf.put_u16_le(4);
        buf.put_u8(19); // user instance started
        buf.put_slice(&[1, 2, 3]);
        let mut r = SliceReader::new(&buf);
        match EnvChange::decode(&mut r).unwrap() {
            EnvChange::Other { ty: 19, payload } => assert_eq!(&payload[..], &[1, 2, 3]),
            other => panic!("unexpected change {other:?}"),
        }
    }

    #[test]
    fn colmetadata_two_columns() {
        let mut buf = BytesMut::new();
        buf.put_u16_le(2);
        // INT column "id"
        buf.put_u32_le(0);
        buf.put_u16_le(0x0009);
        buf.put_u8(0x38);
        crate::codec::put_b_varchar(&mut buf, "id");
        // NVARCHAR(50) column "name"
        buf.put_u32_le(0);
        buf.put_u16_le(0x0001);
        buf.put_u8(0xE7);
        buf.put_u16_le(100);
        buf.put_slice(&[0x09, 0x04, 0x20, 0x00, 0x00]);
        crate::codec::put_b_varchar(&mut buf, "name");

        let mut r = SliceReader::new(&buf);
        let columns = decode_colmetadata(&mut r).unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].name, "id");
        assert_eq!(columns[0].type_info.id, TypeId::Int);
        assert_eq!(columns[1].name, "name");
        assert!(columns[1].flags.contains(ColumnFlags::NULLABLE));
        assert!(r.is_empty());
    }

    #[test]
    fn colmetadata_no_metadata_sentinel() {
        let mut buf = BytesMut::new();
        buf.put_u16_le(0xFFFF);
        let mut r = SliceReader::new(&buf);
        assert!(decode_colmetadata(&mut r).unwrap().is_empty());
    }

    #[test]
    fn order_must_be_even() {
        let mut buf = BytesMut::new();
        buf.put_u16_le(3);
        buf.put_slice(&[0, 0, 0]);
        let mut r = SliceReader::new(&buf);
        assert!(matches!(
            decode_order(&mut r),
            Err(DecodeFault::Protocol(WireError::OddOrderLength(3)))
        ));
    }

    #[test]
    fn feature_ext_ack_terminator() {
        let mut buf = BytesMut::new();
        buf.put_u8(0x0A); // UTF-8 support
        buf.put_u32_le(1);
        buf.put_u8(1);
        buf.put_u8(0xFF);
        let mut r = SliceReader::new(&buf);
        let acks = decode_feature_ext_ack(&mut r).unwrap();
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].feature, 0x0A);
        assert_eq!(&acks[0].data[..], &[1]);
    }

    #[test]
    fn login_ack_body() {
        let mut body = BytesMut::new();
        body.put_u8(1);
        body.put_u32_le(0x7400_0004);
        crate::codec::put_b_varchar(&mut body, "Microsoft SQL Server");
        body.put_u32_le(0x10_00_07_D0);
        let mut buf = BytesMut::new();
        buf.put_u16_le(body.len() as u16);
        buf.put_slice(&body);

        let mut r = SliceReader::new(&buf);
        let ack = LoginAck::decode(&mut r).unwrap();
        assert_eq!(ack.tds_version, 0x7400_0004);
        assert_eq!(ack.program, "Microsoft SQL Server");
    }

    #[test]
    fn truncated_length_prefixed_body_is_protocol_error() {
        // Declares an 80-byte body but the buffer holds a complete, shorter
        // one: the inner parse must fail as Malformed, not Incomplete.
        let mut buf = BytesMut::new();
        buf.put_u16_le(6);
        buf.put_slice(&[0u8; 6]);
        let mut r = SliceReader::new(&buf);
        assert!(matches!(
            ServerMessage::decode(&mut r),
            Err(DecodeFault::Protocol(_))
        ));
    }
}
