//! Inbound message accumulation.
//!
//! Concatenates the payloads of consecutive same-type packets into the
//! token buffer the resumable decoder reads from, enforcing the framing
//! rules: no type changes inside a message, consecutive packet ids.

use bytes::BytesMut;
use tds_wire::WireError;
use tds_wire::packet::PacketType;

use crate::codec::Packet;

/// Accumulates packets into a message-spanning token buffer.
///
/// Unlike a whole-message assembler, the payload bytes are exposed as they
/// arrive; the token decoder can start producing events before the final
/// packet of a long result set is in.
#[derive(Debug, Default)]
pub struct MessageAccumulator {
    buf: BytesMut,
    in_progress: Option<PacketType>,
    expected_id: u8,
}

impl MessageAccumulator {
    /// Empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one packet. Returns `true` when it completed its message.
    pub fn push(&mut self, packet: Packet) -> Result<bool, WireError> {
        match self.in_progress {
            None => {
                self.in_progress = Some(packet.header.ty);
                self.expected_id = 1;
            }
            Some(ty) if ty != packet.header.ty => {
                return Err(WireError::MessageTypeMismatch {
                    in_progress: ty as u8,
                    got: packet.header.ty as u8,
                });
            }
            Some(_) => {}
        }

        if packet.header.id != self.expected_id {
            return Err(WireError::PacketOutOfOrder {
                expected: self.expected_id,
                got: packet.header.id,
            });
        }
        self.expected_id = self.expected_id.wrapping_add(1);

        self.buf.extend_from_slice(&packet.payload);
        if packet.header.is_final() {
            self.in_progress = None;
            return Ok(true);
        }
        Ok(false)
    }

    /// The accumulated payload bytes, for the token decoder to consume.
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Whether a message is partially received.
    #[must_use]
    pub fn mid_message(&self) -> bool {
        self.in_progress.is_some()
    }

    /// Undecoded bytes currently held.
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.buf.len()
    }

    /// Drop all buffered state (request abandoned).
    pub fn clear(&mut self) {
        self.buf.clear();
        self.in_progress = None;
        self.expected_id = 0;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tds_wire::packet::{PacketHeader, PacketStatus};

    fn packet(ty: PacketType, id: u8, eom: bool, payload: &'static [u8]) -> Packet {
        let status = if eom {
            PacketStatus::END_OF_MESSAGE
        } else {
            PacketStatus::empty()
        };
        Packet {
            header: PacketHeader::outbound(ty, status, payload.len(), id),
            payload: Bytes::from_static(payload),
        }
    }

    #[test]
    fn concatenates_across_packets() {
        let mut acc = MessageAccumulator::new();
        assert!(!acc
            .push(packet(PacketType::TabularResult, 1, false, b"ab"))
            .unwrap());
        assert!(acc.mid_message());
        assert!(acc
            .push(packet(PacketType::TabularResult, 2, true, b"cd"))
            .unwrap());
        assert!(!acc.mid_message());
        assert_eq!(&acc.buffer_mut()[..], b"abcd");
    }

    #[test]
    fn interleaved_type_is_rejected() {
        let mut acc = MessageAccumulator::new();
        acc.push(packet(PacketType::TabularResult, 1, false, b"ab"))
            .unwrap();
        let err = acc
            .push(packet(PacketType::PreLogin, 2, true, b"cd"))
            .unwrap_err();
        assert!(matches!(err, WireError::MessageTypeMismatch { .. }));
    }

    #[test]
    fn misordered_id_is_rejected() {
        let mut acc = MessageAccumulator::new();
        acc.push(packet(PacketType::TabularResult, 1, false, b"ab"))
            .unwrap();
        let err = acc
            .push(packet(PacketType::TabularResult, 3, true, b"cd"))
            .unwrap_err();
        assert_eq!(err, WireError::PacketOutOfOrder { expected: 2, got: 3 });
    }

    #[test]
    fn next_message_restarts_ids() {
        let mut acc = MessageAccumulator::new();
        acc.push(packet(PacketType::TabularResult, 1, true, b"ab"))
            .unwrap();
        // A fresh message must start at id 1 again.
        acc.push(packet(PacketType::TabularResult, 1, true, b"cd"))
            .unwrap();
        assert_eq!(&acc.buffer_mut()[..], b"abcd");
    }
}
