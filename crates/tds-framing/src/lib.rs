//! # tds-framing
//!
//! Async framing for the TDS packet layer: a tokio-util codec that splits
//! outbound messages at the negotiated packet size, an accumulator that
//! reassembles inbound messages while enforcing the framing rules, and a
//! split transport that keeps a write path open for ATTENTION while a read
//! is in flight.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod codec;
pub mod error;
pub mod inbound;
pub mod transport;

pub use codec::{OutboundMessage, Packet, PacketCodec};
pub use error::FramingError;
pub use inbound::MessageAccumulator;
pub use transport::{AttentionHandle, Transport};
