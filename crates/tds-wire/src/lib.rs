//! # tds-wire
//!
//! IO-agnostic implementation of the MS-TDS wire protocol as spoken by
//! Microsoft SQL Server 2008 and later (TDS 7.1 through 7.4).
//!
//! The crate covers the byte-level concerns only: packet headers, the
//! handshake payloads (PRELOGIN, LOGIN7), request encoding (SQLBATCH, RPC)
//! and the response token stream. It performs no networking; the async
//! crates layer transport and session semantics on top.
//!
//! ## Resumption contract
//!
//! All response decoders are pure functions of the accumulated receive
//! buffer. A decoder that runs out of bytes mid-token rewinds to the
//! token's first byte and reports "not yet" rather than failing, so the
//! same bytes fed in any number of fragments produce the same tokens.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod batch;
pub mod codec;
pub mod collation;
pub mod error;
pub mod headers;
pub mod login7;
pub mod packet;
pub mod prelogin;
pub mod row;
pub mod rpc;
pub mod stream;
pub mod token;
pub mod typeinfo;
pub mod version;

pub use batch::encode_batch;
pub use codec::{DecodeFault, NeedMore, SliceReader};
pub use collation::Collation;
pub use error::WireError;
pub use headers::AllHeaders;
pub use login7::{FeatureExt, Login7};
pub use packet::{
    DEFAULT_PACKET_SIZE, HEADER_LEN, MAX_PACKET_SIZE, PacketHeader, PacketStatus, PacketType,
};
pub use prelogin::{Encrypt, PreLogin};
pub use row::VariantValue;
pub use rpc::{ParamStatus, Procedure, RpcOptions, RpcParam, RpcRequest};
pub use stream::TokenStreamDecoder;
pub use token::{
    Column, ColumnFlags, Done, DoneStatus, EnvChange, FeatureAck, LoginAck, ReturnValue,
    ServerMessage, Token,
};
pub use typeinfo::{LengthClass, TypeId, TypeInfo};
pub use version::TdsVersion;
