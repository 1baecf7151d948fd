//! # tds-values
//!
//! Typed values for SQL Server columns and parameters.
//!
//! [`Value`] is the explicit sum of everything a column can hold. The
//! [`decode`] module turns the byte slices produced by the wire layer into
//! values (honoring collations, temporal scales and the SQL_VARIANT
//! envelope); the [`encode`] module performs the inverse for RPC
//! parameters.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod convert;
pub mod decode;
pub mod encode;
pub mod error;
pub mod value;

pub use convert::FromValue;
pub use decode::decode_value;
pub use encode::encode_param;
pub use error::ValueError;
pub use value::Value;
