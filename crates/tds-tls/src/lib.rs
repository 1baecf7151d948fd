//! # tds-tls
//!
//! TLS for TDS sessions. Two handshake shapes exist in the protocol:
//! TDS 7.x tunnels the TLS handshake inside PRELOGIN-typed packets and
//! switches to raw TLS once it completes ([`PreloginTunnel`]); TDS 8.0
//! strict mode performs TLS before any TDS traffic. The [`TlsConnector`]
//! supports both, built from the [`TlsOptions`] configuration surface.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod connector;
pub mod error;
pub mod tunnel;

pub use config::{ClientIdentity, MinTlsVersion, TlsMode, TlsOptions, TrustRoots};
pub use connector::TlsConnector;
pub use error::TlsError;
pub use tokio_rustls::client::TlsStream;
pub use tunnel::PreloginTunnel;
