//! RPC request encoding.
//!
//! Procedures are addressed by name or by a well-known id; each parameter
//! carries its name, a status byte, a TYPE_INFO and the value encoded per
//! that type (length prefix included).

use bitflags::bitflags;
use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::put_b_varchar;
use crate::headers::AllHeaders;
use crate::typeinfo::TypeInfo;

/// Well-known pseudo-procedure ids.
pub mod proc_id {
    /// `sp_cursor`.
    pub const CURSOR: u16 = 1;
    /// `sp_cursoropen`.
    pub const CURSOR_OPEN: u16 = 2;
    /// `sp_cursorfetch`.
    pub const CURSOR_FETCH: u16 = 7;
    /// `sp_cursorclose`.
    pub const CURSOR_CLOSE: u16 = 9;
    /// `sp_executesql`.
    pub const EXECUTE_SQL: u16 = 10;
    /// `sp_prepare`.
    pub const PREPARE: u16 = 11;
    /// `sp_execute`.
    pub const EXECUTE: u16 = 12;
    /// `sp_prepexec`.
    pub const PREP_EXEC: u16 = 13;
    /// `sp_unprepare`.
    pub const UNPREPARE: u16 = 15;
}

/// Procedure selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Procedure {
    /// A stored procedure by name.
    Name(String),
    /// A well-known pseudo-procedure (see [`proc_id`]).
    Id(u16),
}

bitflags! {
    /// RPC option flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RpcOptions: u16 {
        /// Recompile the plan before execution.
        const WITH_RECOMPILE = 0x0001;
        /// Suppress metadata in the response.
        const NO_METADATA = 0x0002;
        /// Reuse metadata from the previous request.
        const REUSE_METADATA = 0x0004;
    }
}

bitflags! {
    /// Per-parameter status byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ParamStatus: u8 {
        /// Output parameter: return its value.
        const BY_REF = 0x01;
        /// Use the procedure's default value.
        const DEFAULT_VALUE = 0x02;
        /// Value is encrypted (Always Encrypted).
        const ENCRYPTED = 0x08;
    }
}

/// One RPC parameter, value already encoded per its TYPE_INFO.
#[derive(Debug, Clone)]
pub struct RpcParam {
    /// Parameter name including the `@`; empty for positional.
    pub name: String,
    /// Status byte.
    pub status: ParamStatus,
    /// Wire type descriptor.
    pub type_info: TypeInfo,
    /// Value bytes, including the type's own length prefix.
    pub value: Bytes,
}

/// A complete RPC request.
#[derive(Debug, Clone)]
pub struct RpcRequest {
    /// Target procedure.
    pub procedure: Procedure,
    /// Option flags.
    pub options: RpcOptions,
    /// Parameters in declaration order.
    pub params: Vec<RpcParam>,
}

impl RpcRequest {
    /// A call to a named stored procedure.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            procedure: Procedure::Name(name.into()),
            options: RpcOptions::empty(),
            params: Vec::new(),
        }
    }

    /// A call to a well-known pseudo-procedure.
    #[must_use]
    pub fn well_known(id: u16) -> Self {
        Self {
            procedure: Procedure::Id(id),
            options: RpcOptions::empty(),
            params: Vec::new(),
        }
    }

    /// Append a parameter.
    #[must_use]
    pub fn with_param(mut self, param: RpcParam) -> Self {
        self.params.push(param);
        self
    }

    /// Encode the full RPC payload.
    #[must_use]
    pub fn encode(&self, headers: &AllHeaders) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        headers.encode(&mut buf);

        match &self.procedure {
            Procedure::Name(name) => {
                let units: Vec<u16> = name.encode_utf16().collect();
                buf.put_u16_le(units.len() as u16);
                for unit in units {
                    buf.put_u16_le(unit);
                }
            }
            Procedure::Id(id) => {
                buf.put_u16_le(0xFFFF);
                buf.put_u16_le(*id);
            }
        }
        buf.put_u16_le(self.options.bits());

        for param in &self.params {
            put_b_varchar(&mut buf, &param.name);
            buf.put_u8(param.status.bits());
            param.type_info.encode(&mut buf);
            buf.put_slice(&param.value);
        }

        buf.freeze()
    }
}
