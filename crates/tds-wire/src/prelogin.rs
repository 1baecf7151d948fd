//! PRELOGIN request/response.
//!
//! The first exchange on a fresh connection: an option table (type, offset,
//! length per option, terminated by 0xFF) followed by the option payloads.
//! The VERSION field means different things in each direction: the client
//! sends its TDS version, the server answers with its *product* version.
//! The TDS version actually in effect arrives later, in LOGINACK.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::WireError;
use crate::version::TdsVersion;

mod option {
    pub const VERSION: u8 = 0x00;
    pub const ENCRYPTION: u8 = 0x01;
    pub const INSTANCE: u8 = 0x02;
    pub const THREAD_ID: u8 = 0x03;
    pub const MARS: u8 = 0x04;
    pub const TRACE_ID: u8 = 0x05;
    pub const FED_AUTH_REQUIRED: u8 = 0x06;
    pub const NONCE: u8 = 0x07;
    pub const TERMINATOR: u8 = 0xFF;
}

/// Encryption negotiation byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Encrypt {
    /// Encrypt login only; data may flow in clear after the handshake.
    Off = 0x00,
    /// Encrypt the whole session.
    #[default]
    On = 0x01,
    /// This side cannot do TLS at all.
    NotSupported = 0x02,
    /// Refuse the session unless it is encrypted.
    Required = 0x03,
}

impl Encrypt {
    /// Decode the negotiation byte, defaulting unknown values to `Off`.
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x01 => Self::On,
            0x02 => Self::NotSupported,
            0x03 => Self::Required,
            _ => Self::Off,
        }
    }
}

/// Distributed-tracing identifier sent in the TRACEID option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceId {
    /// Client activity GUID.
    pub activity: [u8; 16],
    /// Sequence within the activity.
    pub sequence: u32,
}

/// PRELOGIN payload, used for both directions.
#[derive(Debug, Clone, Default)]
pub struct PreLogin {
    /// Raw VERSION word: TDS version when sending, server product version
    /// when received.
    pub version: u32,
    /// Sub-build number accompanying the version.
    pub sub_build: u16,
    /// Encryption stance.
    pub encryption: Encrypt,
    /// Named-instance validation string.
    pub instance: Option<String>,
    /// Client thread id, echoed back by some servers for diagnostics.
    pub thread_id: Option<u32>,
    /// Multiple Active Result Sets requested/granted.
    pub mars: bool,
    /// Distributed tracing identity.
    pub trace: Option<TraceId>,
    /// Federated authentication required by this side.
    pub fed_auth_required: bool,
    /// Nonce for fed-auth flows.
    pub nonce: Option<[u8; 32]>,
}

impl PreLogin {
    /// A client request announcing `version` and `encryption`.
    #[must_use]
    pub fn client(version: TdsVersion, encryption: Encrypt) -> Self {
        Self {
            version: version.raw(),
            encryption,
            ..Self::default()
        }
    }

    /// Serialise the option table and payloads.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        // Collect (token, payload) pairs first; offsets fall out of that.
        let mut options: Vec<(u8, Vec<u8>)> = Vec::with_capacity(8);

        let mut version = Vec::with_capacity(6);
        version.extend_from_slice(&self.version.to_be_bytes());
        version.extend_from_slice(&self.sub_build.to_le_bytes());
        options.push((option::VERSION, version));

        options.push((option::ENCRYPTION, vec![self.encryption as u8]));

        if let Some(ref instance) = self.instance {
            let mut payload = instance.as_bytes().to_vec();
            payload.push(0);
            options.push((option::INSTANCE, payload));
        }
        if let Some(thread_id) = self.thread_id {
            options.push((option::THREAD_ID, thread_id.to_be_bytes().to_vec()));
        }
        options.push((option::MARS, vec![u8::from(self.mars)]));
        if let Some(trace) = self.trace {
            let mut payload = Vec::with_capacity(36);
            payload.extend_from_slice(&trace.activity);
            payload.extend_from_slice(&trace.sequence.to_le_bytes());
            payload.extend_from_slice(&[0u8; 16]);
            options.push((option::TRACE_ID, payload));
        }
        if self.fed_auth_required {
            options.push((option::FED_AUTH_REQUIRED, vec![0x01]));
        }
        if let Some(nonce) = self.nonce {
            options.push((option::NONCE, nonce.to_vec()));
        }

        let table_len = options.len() * 5 + 1;
        let mut buf = BytesMut::with_capacity(table_len + 64);
        let mut offset = table_len as u16;
        for (token, payload) in &options {
            buf.put_u8(*token);
            buf.put_u16(offset);
            buf.put_u16(payload.len() as u16);
            offset += payload.len() as u16;
        }
        buf.put_u8(option::TERMINATOR);
        for (_, payload) in &options {
            buf.put_slice(payload);
        }
        buf.freeze()
    }

    /// Parse a PRELOGIN payload.
    ///
    /// Offsets in the option table are absolute within the payload.
    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let mut table = Vec::new();
        let mut pos = 0usize;
        loop {
            let token = *payload
                .get(pos)
                .ok_or(WireError::MalformedPrelogin("option table has no terminator"))?;
            pos += 1;
            if token == option::TERMINATOR {
                break;
            }
            let header = payload
                .get(pos..pos + 4)
                .ok_or(WireError::MalformedPrelogin("truncated option header"))?;
            pos += 4;
            let offset = u16::from_be_bytes([header[0], header[1]]) as usize;
            let length = u16::from_be_bytes([header[2], header[3]]) as usize;
            table.push((token, offset, length));
        }

        let mut out = Self::default();
        for (token, offset, length) in table {
            let Some(data) = payload.get(offset..offset + length) else {
                // Tolerate stray entries; servers have been seen to pad.
                continue;
            };
            match token {
                option::VERSION if length >= 6 => {
                    out.version = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
                    out.sub_build = u16::from_le_bytes([data[4], data[5]]);
                }
                option::ENCRYPTION if length >= 1 => {
                    out.encryption = Encrypt::from_u8(data[0]);
                }
                option::INSTANCE if length > 0 => {
                    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
                    if end > 0 {
                        out.instance = std::str::from_utf8(&data[..end]).ok().map(String::from);
                    }
                }
                option::THREAD_ID if length >= 4 => {
                    out.thread_id = Some(u32::from_be_bytes([data[0], data[1], data[2], data[3]]));
                }
                option::MARS if length >= 1 => {
                    out.mars = data[0] != 0;
                }
                option::FED_AUTH_REQUIRED if length >= 1 => {
                    out.fed_auth_required = data[0] != 0;
                }
                option::NONCE if length >= 32 => {
                    let mut nonce = [0u8; 32];
                    nonce.copy_from_slice(&data[..32]);
                    out.nonce = Some(nonce);
                }
                _ => {}
            }
        }
        Ok(out)
    }

    /// The server's product version, split into (major, minor, build).
    #[must_use]
    pub fn product_version(&self) -> (u8, u8, u16) {
        (
            (self.version >> 24) as u8,
            (self.version >> 16) as u8,
            (self.version & 0xFFFF) as u16,
        )
    }
}
