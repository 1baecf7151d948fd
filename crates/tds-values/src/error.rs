//! Value conversion errors.

use thiserror::Error;

/// Failure to convert between wire bytes and a typed value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValueError {
    /// The payload length does not fit the declared type.
    #[error("{what}: unexpected payload length {len}")]
    UnexpectedLength {
        /// Type being decoded.
        what: &'static str,
        /// Observed length.
        len: usize,
    },

    /// The wire type has no typed mapping in this client.
    #[error("unsupported data type 0x{0:02X}")]
    UnsupportedType(u8),

    /// DECIMAL/NUMERIC magnitude exceeds the representable range.
    #[error("decimal magnitude exceeds 96 bits")]
    DecimalOverflow,

    /// A temporal payload encodes an impossible instant.
    #[error("{0} value out of range")]
    TemporalOutOfRange(&'static str),

    /// Character payload is not valid in its declared encoding.
    #[error("invalid {0} character data")]
    InvalidText(&'static str),

    /// SQL_VARIANT carried a base type this client cannot interpret.
    #[error("unsupported SQL_VARIANT base type 0x{0:02X}")]
    UnsupportedVariant(u8),

    /// JSON payload failed to parse.
    #[cfg(feature = "json")]
    #[error("invalid JSON payload: {0}")]
    InvalidJson(String),

    /// A typed accessor was applied to an incompatible value.
    #[error("cannot read {found} as {requested}")]
    TypeMismatch {
        /// The value's actual type name.
        found: &'static str,
        /// The requested conversion.
        requested: &'static str,
    },
}
