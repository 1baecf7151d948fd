//! Framing-layer errors.

use thiserror::Error;

/// Errors raised while framing packets over the transport.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FramingError {
    /// The peer closed the connection, possibly mid-message.
    #[error("connection closed")]
    ConnectionClosed,

    /// Structural protocol violation.
    #[error(transparent)]
    Wire(#[from] tds_wire::WireError),

    /// Transport I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
