//! Engine events and aggregate results.
//!
//! Within one request, events preserve wire order: each `Metadata` is
//! followed by the `Row`s of its result set and a `Done`; messages,
//! environment changes and return values interleave exactly where the
//! server put them.

use bytes::Bytes;
use std::sync::Arc;
use tds_wire::{Column, Done, EnvChange, FeatureAck, LoginAck, ReturnValue, ServerMessage};

use crate::row::Row;

/// One decoded event of a request's response stream.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum Event {
    /// Schema of the rows that follow.
    Metadata(Arc<[Column]>),
    /// One materialised row.
    Row(Row),
    /// A statement or request completed.
    Done(Done),
    /// Informational or error message from the server. Errors (severity
    /// ≥ 11) also fail the request once it completes.
    Message(ServerMessage),
    /// A session attribute changed.
    EnvChange(EnvChange),
    /// Stored-procedure return status.
    ReturnStatus(i32),
    /// Output parameter or function result.
    ReturnValue(ReturnValue),
    /// ORDER BY column ordinals.
    Order(Vec<u16>),
    /// Acknowledged login features.
    FeatureAck(Vec<FeatureAck>),
    /// Login acknowledgement (handshake only).
    LoginAck(LoginAck),
    /// Opaque session-recovery state.
    SessionState(Bytes),
    /// Opaque data-classification payload.
    DataClassification(Bytes),
}

/// Everything `execute` collects from a request.
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct ExecutionResult {
    /// Row count of each DONE that carried a valid count, in order.
    pub rows_affected: Vec<u64>,
    /// Return status, for RPC requests.
    pub return_status: Option<i32>,
    /// Output parameter values, in wire order.
    pub return_values: Vec<ReturnValue>,
    /// Non-error server messages (PRINT, informational).
    pub messages: Vec<ServerMessage>,
}

impl ExecutionResult {
    /// Sum of all valid row counts.
    #[must_use]
    pub fn total_rows_affected(&self) -> u64 {
        self.rows_affected.iter().sum()
    }
}

/// One complete result set.
#[derive(Debug, Clone)]
pub struct ResultSet {
    /// Column schema.
    pub columns: Arc<[Column]>,
    /// Materialised rows.
    pub rows: Vec<Row>,
}
