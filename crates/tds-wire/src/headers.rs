//! ALL_HEADERS: the prefix of SQLBATCH, RPC and transaction-manager
//! requests.
//!
//! Total length, then one length-prefixed header per type. Requests always
//! carry the transaction-descriptor header; a trace-activity header is
//! appended when the caller supplies an activity id.

use bytes::{BufMut, BytesMut};

const HEADER_TYPE_TRANSACTION: u16 = 0x0002;
const HEADER_TYPE_TRACE_ACTIVITY: u16 = 0x0003;

/// Request headers shared by all client request types.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllHeaders {
    /// Descriptor of the enclosing transaction; 0 in auto-commit mode.
    pub transaction_descriptor: u64,
    /// Number of requests in flight on the connection, this one included.
    pub outstanding_requests: u32,
    /// Optional tracing identity: activity GUID plus sequence number.
    pub activity: Option<([u8; 16], u32)>,
}

impl AllHeaders {
    /// Headers for a connection outside any explicit transaction.
    #[must_use]
    pub fn auto_commit() -> Self {
        Self {
            transaction_descriptor: 0,
            outstanding_requests: 1,
            activity: None,
        }
    }

    /// Headers carrying `descriptor` from the last transaction ENVCHANGE.
    #[must_use]
    pub fn in_transaction(descriptor: u64) -> Self {
        Self {
            transaction_descriptor: descriptor,
            outstanding_requests: 1,
            activity: None,
        }
    }

    /// Serialise into `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        // transaction header: len(4) + type(2) + descriptor(8) + count(4)
        let mut total = 4 + 18;
        if self.activity.is_some() {
            // trace header: len(4) + type(2) + guid(16) + sequence(4)
            total += 26;
        }
        dst.put_u32_le(total);

        dst.put_u32_le(18);
        dst.put_u16_le(HEADER_TYPE_TRANSACTION);
        dst.put_u64_le(self.transaction_descriptor);
        dst.put_u32_le(self.outstanding_requests);

        if let Some((activity, sequence)) = self.activity {
            dst.put_u32_le(26);
            dst.put_u16_le(HEADER_TYPE_TRACE_ACTIVITY);
            dst.put_slice(&activity);
            dst.put_u32_le(sequence);
        }
    }
}
