//! TDS packet framing header.

use bitflags::bitflags;
use bytes::{BufMut, BytesMut};

use crate::codec::{NeedMore, SliceReader};
use crate::error::WireError;

/// Size of the fixed packet header.
pub const HEADER_LEN: usize = 8;

/// Largest packet the protocol can express.
pub const MAX_PACKET_SIZE: usize = 65_535;

/// Packet size before the server grants a different one at login.
pub const DEFAULT_PACKET_SIZE: usize = 4_096;

/// Message type carried in the first header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// SQL batch request.
    SqlBatch = 0x01,
    /// Remote procedure call.
    Rpc = 0x03,
    /// Server response token stream.
    TabularResult = 0x04,
    /// Out-of-band cancel signal.
    Attention = 0x06,
    /// Bulk load data stream.
    BulkLoad = 0x07,
    /// Federated authentication token.
    FederatedAuth = 0x08,
    /// Transaction manager request.
    TransactionManager = 0x0E,
    /// LOGIN7 request.
    Login7 = 0x10,
    /// SSPI payload.
    Sspi = 0x11,
    /// PRELOGIN request/response (also tunnels TLS records, §handshake).
    PreLogin = 0x12,
}

impl PacketType {
    /// Decode the header type byte.
    pub fn from_u8(value: u8) -> Result<Self, WireError> {
        Ok(match value {
            0x01 => Self::SqlBatch,
            0x03 => Self::Rpc,
            0x04 => Self::TabularResult,
            0x06 => Self::Attention,
            0x07 => Self::BulkLoad,
            0x08 => Self::FederatedAuth,
            0x0E => Self::TransactionManager,
            0x10 => Self::Login7,
            0x11 => Self::Sspi,
            0x12 => Self::PreLogin,
            other => return Err(WireError::UnknownPacketType(other)),
        })
    }
}

bitflags! {
    /// Second header byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PacketStatus: u8 {
        /// Final packet of the message.
        const END_OF_MESSAGE = 0x01;
        /// Message should be ignored (sent together with ATTENTION).
        const IGNORE = 0x02;
        /// Reset session state before processing this request.
        const RESET_CONNECTION = 0x08;
        /// Reset session state but keep the open transaction.
        const RESET_CONNECTION_KEEP_TRANSACTION = 0x10;
    }
}

/// The 8-byte header in front of every packet.
///
/// `length` covers header plus payload and travels big-endian, unlike the
/// rest of the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Message type.
    pub ty: PacketType,
    /// Status bits.
    pub status: PacketStatus,
    /// Total packet length, header included.
    pub length: u16,
    /// Server process id; zero from the client.
    pub spid: u16,
    /// Sequence number, restarting at 1 for every message, wrapping mod 256.
    pub id: u8,
    /// Unused window field.
    pub window: u8,
}

impl PacketHeader {
    /// Header for the `id`-th packet of an outbound message.
    #[must_use]
    pub fn outbound(ty: PacketType, status: PacketStatus, payload_len: usize, id: u8) -> Self {
        Self {
            ty,
            status,
            length: (HEADER_LEN + payload_len) as u16,
            spid: 0,
            id,
            window: 0,
        }
    }

    /// Parse a header. `NeedMore` when fewer than eight bytes are buffered.
    pub fn decode(r: &mut SliceReader<'_>) -> Result<Result<Self, WireError>, NeedMore> {
        let raw = r.take(HEADER_LEN)?;
        let ty = match PacketType::from_u8(raw[0]) {
            Ok(ty) => ty,
            Err(e) => return Ok(Err(e)),
        };
        let length = u16::from_be_bytes([raw[2], raw[3]]);
        if (length as usize) < HEADER_LEN {
            return Ok(Err(WireError::PacketLengthTooSmall(length)));
        }
        Ok(Ok(Self {
            ty,
            status: PacketStatus::from_bits_truncate(raw[1]),
            length,
            spid: u16::from_be_bytes([raw[4], raw[5]]),
            id: raw[6],
            window: raw[7],
        }))
    }

    /// Serialise the header.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u8(self.ty as u8);
        dst.put_u8(self.status.bits());
        dst.put_u16(self.length);
        dst.put_u16(self.spid);
        dst.put_u8(self.id);
        dst.put_u8(self.window);
    }

    /// Length of the payload following this header.
    #[must_use]
    pub fn payload_len(&self) -> usize {
        (self.length as usize).saturating_sub(HEADER_LEN)
    }

    /// Whether this packet terminates its message.
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.status.contains(PacketStatus::END_OF_MESSAGE)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let header = PacketHeader::outbound(
            PacketType::Rpc,
            PacketStatus::END_OF_MESSAGE | PacketStatus::RESET_CONNECTION,
            120,
            3,
        );
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        assert_eq!(buf.len(), HEADER_LEN);

        let mut r = SliceReader::new(&buf);
        let decoded = PacketHeader::decode(&mut r).unwrap().unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.payload_len(), 120);
        assert!(decoded.is_final());
    }

    #[test]
    fn header_length_is_big_endian() {
        let header = PacketHeader::outbound(PacketType::SqlBatch, PacketStatus::END_OF_MESSAGE, 4, 1);
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        assert_eq!(&buf[2..4], &[0x00, 0x0C]);
    }

    #[test]
    fn short_input_is_need_more() {
        let mut r = SliceReader::new(&[0x04, 0x01, 0x00]);
        assert!(PacketHeader::decode(&mut r).is_err());
        assert_eq!(r.consumed(), 0);
    }

    #[test]
    fn bogus_type_is_protocol_error() {
        let raw = [0x55u8, 0x01, 0x00, 0x08, 0, 0, 1, 0];
        let mut r = SliceReader::new(&raw);
        assert_eq!(
            PacketHeader::decode(&mut r).unwrap(),
            Err(WireError::UnknownPacketType(0x55))
        );
    }

    #[test]
    fn undersized_length_is_protocol_error() {
        let raw = [0x04u8, 0x01, 0x00, 0x04, 0, 0, 1, 0];
        let mut r = SliceReader::new(&raw);
        assert_eq!(
            PacketHeader::decode(&mut r).unwrap(),
            Err(WireError::PacketLengthTooSmall(4))
        );
    }
}
