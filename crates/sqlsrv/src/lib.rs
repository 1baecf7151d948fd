//! # sqlsrv
//!
//! Non-blocking SQL Server client speaking TDS 7.1–7.4 over TCP, with
//! opportunistic or required TLS, a bounded connection pool, and a typed
//! session API.
//!
//! ```rust,ignore
//! use sqlsrv::{Client, Config};
//!
//! let client = Client::new(Config::new("db.example", "app", "secret"))?;
//! let version: Option<String> = client.query_scalar("SELECT @@VERSION").await?;
//!
//! let rows = client.query("SELECT id, name FROM dbo.things").await?;
//! for row in rows {
//!     let id: Option<i32> = row.get_i32("id")?;
//! }
//! ```
//!
//! The crate layers: [`Client`] (pooled sessions) over [`Connection`] (one
//! TDS session, one request at a time) over the `tds-framing`/`tds-wire`
//! protocol stack.

#![warn(missing_docs)]
#![deny(unsafe_code)]

mod client;
pub mod config;
mod connection;
pub mod error;
pub mod events;
mod handshake;
pub mod retry;
pub mod row;
mod stream;

pub use client::Client;
pub use config::{
    Authentication, Config, ExecutionMode, ExecutionOptions, IsolationLevel, MetadataOptions,
    PoolConfig, SessionOptions, Timeouts, TlsMode, TlsOptions, TokenProvider,
};
pub use connection::{Connection, RequestState};
pub use error::{Error, Result, TimeoutScope};
pub use events::{Event, ExecutionResult, ResultSet};
pub use handshake::establish;
pub use retry::RetryPolicy;
pub use row::{Row, RowIndex};

pub use tds_values::{FromValue, Value};
pub use tds_wire::{Column, Done, DoneStatus, EnvChange, ReturnValue, ServerMessage};
