//! tokio-util codec for TDS packets.
//!
//! Decoding yields individual packets. Encoding takes a whole message and
//! splits it into packets of the negotiated size, numbering them from 1 and
//! flagging the last with END_OF_MESSAGE; the RESETCONNECTION bit, when
//! requested, goes on the first packet only.

use bytes::{Buf, Bytes, BytesMut};
use tds_wire::codec::SliceReader;
use tds_wire::packet::{
    DEFAULT_PACKET_SIZE, HEADER_LEN, MAX_PACKET_SIZE, PacketHeader, PacketStatus, PacketType,
};
use tds_wire::WireError;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::FramingError;

/// One received packet.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Parsed header.
    pub header: PacketHeader,
    /// Payload without the header.
    pub payload: Bytes,
}

/// One message to send.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    /// Message type for every packet.
    pub ty: PacketType,
    /// The complete payload; the codec splits it.
    pub payload: Bytes,
    /// Ask the server to reset session state before this request.
    pub reset_connection: bool,
}

impl OutboundMessage {
    /// A plain message without the reset flag.
    #[must_use]
    pub fn new(ty: PacketType, payload: Bytes) -> Self {
        Self {
            ty,
            payload,
            reset_connection: false,
        }
    }
}

/// Packet codec with a (re)negotiable packet size.
#[derive(Debug)]
pub struct PacketCodec {
    packet_size: usize,
}

impl PacketCodec {
    /// Codec at the pre-login default size.
    #[must_use]
    pub fn new() -> Self {
        Self {
            packet_size: DEFAULT_PACKET_SIZE,
        }
    }

    /// Currently negotiated packet size.
    #[must_use]
    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    /// Apply a packet size granted through ENVCHANGE.
    pub fn set_packet_size(&mut self, size: usize) {
        self.packet_size = size.clamp(HEADER_LEN + 1, MAX_PACKET_SIZE);
    }
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = FramingError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, FramingError> {
        let mut r = SliceReader::new(&src[..]);
        let Ok(header) = PacketHeader::decode(&mut r) else {
            return Ok(None);
        };
        let header = header?;

        // The peer must respect the negotiated size too.
        if header.length as usize > MAX_PACKET_SIZE {
            return Err(WireError::PacketTooLarge {
                size: header.length as usize,
                max: MAX_PACKET_SIZE,
            }
            .into());
        }
        if src.len() < header.length as usize {
            src.reserve(header.length as usize - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let payload = src.split_to(header.payload_len()).freeze();
        tracing::trace!(
            ty = ?header.ty,
            len = header.length,
            id = header.id,
            eom = header.is_final(),
            "packet in"
        );
        Ok(Some(Packet { header, payload }))
    }
}

impl Encoder<OutboundMessage> for PacketCodec {
    type Error = FramingError;

    fn encode(&mut self, msg: OutboundMessage, dst: &mut BytesMut) -> Result<(), FramingError> {
        let budget = self.packet_size - HEADER_LEN;
        // An empty payload (ATTENTION) still needs one packet.
        let chunks: Vec<&[u8]> = if msg.payload.is_empty() {
            vec![&[]]
        } else {
            msg.payload.chunks(budget).collect()
        };
        let last = chunks.len() - 1;

        dst.reserve(msg.payload.len() + (last + 1) * HEADER_LEN);
        for (index, chunk) in chunks.into_iter().enumerate() {
            let mut status = if index == last {
                PacketStatus::END_OF_MESSAGE
            } else {
                PacketStatus::empty()
            };
            if index == 0 && msg.reset_connection {
                status |= PacketStatus::RESET_CONNECTION;
            }
            // Sequence restarts at 1 for every message, wrapping mod 256.
            let id = (index as u8).wrapping_add(1);
            let header = PacketHeader::outbound(msg.ty, status, chunk.len(), id);
            header.encode(dst);
            dst.extend_from_slice(chunk);
            tracing::trace!(ty = ?msg.ty, id = header.id, len = chunk.len(), "packet out");
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut PacketCodec, buf: &mut BytesMut) -> Vec<Packet> {
        let mut out = Vec::new();
        while let Some(packet) = codec.decode(buf).unwrap() {
            out.push(packet);
        }
        out
    }

    #[test]
    fn single_packet_message() {
        let mut codec = PacketCodec::new();
        let msg = OutboundMessage::new(PacketType::SqlBatch, Bytes::from_static(b"abc"));
        let mut wire = BytesMut::new();
        codec.encode(msg, &mut wire).unwrap();

        let packets = decode_all(&mut codec, &mut wire);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].header.id, 1);
        assert!(packets[0].header.is_final());
        assert_eq!(&packets[0].payload[..], b"abc");
    }

    #[test]
    fn payload_is_split_at_negotiated_size() {
        let mut codec = PacketCodec::new();
        codec.set_packet_size(16); // 8 bytes of payload per packet
        let payload = Bytes::from(vec![0x5A; 20]);
        let msg = OutboundMessage::new(PacketType::Rpc, payload);
        let mut wire = BytesMut::new();
        codec.encode(msg, &mut wire).unwrap();

        let packets = decode_all(&mut codec, &mut wire);
        assert_eq!(packets.len(), 3);
        assert_eq!(
            packets.iter().map(|p| p.header.id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(!packets[0].header.is_final());
        assert!(!packets[1].header.is_final());
        assert!(packets[2].header.is_final());
        assert_eq!(packets[2].payload.len(), 4);
    }

    #[test]
    fn reset_connection_on_first_packet_only() {
        let mut codec = PacketCodec::new();
        codec.set_packet_size(16);
        let msg = OutboundMessage {
            ty: PacketType::SqlBatch,
            payload: Bytes::from(vec![0; 12]),
            reset_connection: true,
        };
        let mut wire = BytesMut::new();
        codec.encode(msg, &mut wire).unwrap();
        let packets = decode_all(&mut codec, &mut wire);
        assert_eq!(packets.len(), 2);
        assert!(packets[0]
            .header
            .status
            .contains(PacketStatus::RESET_CONNECTION));
        assert!(!packets[1]
            .header
            .status
            .contains(PacketStatus::RESET_CONNECTION));
    }

    #[test]
    fn attention_is_a_single_empty_packet() {
        let mut codec = PacketCodec::new();
        let msg = OutboundMessage::new(PacketType::Attention, Bytes::new());
        let mut wire = BytesMut::new();
        codec.encode(msg, &mut wire).unwrap();
        let packets = decode_all(&mut codec, &mut wire);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].header.length as usize, HEADER_LEN);
        assert!(packets[0].header.is_final());
    }

    #[test]
    fn incomplete_packet_waits() {
        let mut codec = PacketCodec::new();
        let msg = OutboundMessage::new(PacketType::SqlBatch, Bytes::from_static(b"abcdef"));
        let mut wire = BytesMut::new();
        codec.encode(msg, &mut wire).unwrap();

        let mut partial = BytesMut::from(&wire[..10]);
        assert!(codec.decode(&mut partial).unwrap().is_none());
        partial.extend_from_slice(&wire[10..]);
        assert!(codec.decode(&mut partial).unwrap().is_some());
    }
}
