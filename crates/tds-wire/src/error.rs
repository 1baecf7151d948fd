//! Protocol-level error type.

use thiserror::Error;

/// An input that is invalid regardless of any further bytes arriving.
///
/// Truncated input is deliberately *not* represented here; decoders signal
/// it through [`crate::codec::NeedMore`] so callers can retry once more
/// bytes have been received.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum WireError {
    /// A packet header carried an unknown type byte.
    #[error("unknown packet type 0x{0:02X}")]
    UnknownPacketType(u8),

    /// A packet header declared a length smaller than the header itself.
    #[error("packet length {0} is smaller than the 8-byte header")]
    PacketLengthTooSmall(u16),

    /// A packet exceeded the negotiated maximum size.
    #[error("packet of {size} bytes exceeds the negotiated maximum of {max}")]
    PacketTooLarge {
        /// Declared packet size.
        size: usize,
        /// Negotiated maximum.
        max: usize,
    },

    /// Packets of one message did not carry consecutive packet ids.
    #[error("packet id {got} arrived where {expected} was expected")]
    PacketOutOfOrder {
        /// The id the framer expected next.
        expected: u8,
        /// The id that arrived.
        got: u8,
    },

    /// A packet of a different type arrived inside an unfinished message.
    #[error("packet type 0x{got:02X} interleaved into a 0x{in_progress:02X} message")]
    MessageTypeMismatch {
        /// Type of the message being assembled.
        in_progress: u8,
        /// Type of the interloping packet.
        got: u8,
    },

    /// A token tag that is neither known nor on the skippable allow-list.
    #[error("unknown mandatory token 0x{0:02X}")]
    UnknownToken(u8),

    /// A TYPE_INFO carried an unknown data type byte.
    #[error("unknown data type 0x{0:02X}")]
    UnknownDataType(u8),

    /// A ROW or NBCROW arrived before any COLMETADATA.
    #[error("row token received without preceding column metadata")]
    RowWithoutMetadata,

    /// DECIMAL/NUMERIC metadata out of range.
    #[error("invalid decimal precision/scale {precision}/{scale}")]
    InvalidDecimal {
        /// Declared precision (≤ 38).
        precision: u8,
        /// Declared scale (≤ precision).
        scale: u8,
    },

    /// Temporal scale outside 0..=7.
    #[error("invalid temporal scale {0}")]
    InvalidTemporalScale(u8),

    /// An ORDER token whose length is not a multiple of two.
    #[error("ORDER token length {0} is odd")]
    OddOrderLength(u16),

    /// Routing ENVCHANGE with a protocol byte other than TCP (0).
    #[error("routing announcement with unsupported protocol {0}")]
    UnsupportedRoutingProtocol(u8),

    /// Text that is not valid little-endian UTF-16.
    #[error("invalid UTF-16 in {0}")]
    InvalidUtf16(&'static str),

    /// A PRELOGIN option table that cannot be interpreted.
    #[error("malformed PRELOGIN response: {0}")]
    MalformedPrelogin(&'static str),

    /// Any other structural impossibility.
    #[error("malformed token stream: {0}")]
    Malformed(&'static str),
}
