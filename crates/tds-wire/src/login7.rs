//! LOGIN7 request construction.
//!
//! A fixed 94-byte header, an offset/length table pointing into a variable
//! data section of UTF-16LE strings, and an optional FEATUREEXT block. The
//! password is obfuscated per the protocol (nibble swap, then XOR 0xA5);
//! that is not encryption, which is why login normally rides inside TLS.

use bitflags::bitflags;
use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::put_utf16;
use crate::version::TdsVersion;

/// Size of the fixed LOGIN7 header.
pub const FIXED_HEADER_LEN: usize = 94;

bitflags! {
    /// OptionFlags1 byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct OptionFlags1: u8 {
        /// Warn on dump/load mismatch.
        const DUMP_LOAD_OFF = 0x10;
        /// Notify on USE.
        const USE_DB_NOTIFY = 0x20;
        /// Fail login if the initial database is unavailable.
        const DATABASE_FATAL = 0x40;
        /// Warn on language changes.
        const SET_LANG_WARN = 0x80;
    }
}

bitflags! {
    /// OptionFlags2 byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct OptionFlags2: u8 {
        /// Fail login if the initial language is unavailable.
        const LANGUAGE_FATAL = 0x01;
        /// Announce as an ODBC-style client.
        const ODBC = 0x02;
        /// Integrated security; the SSPI field carries the first leg.
        const INTEGRATED_SECURITY = 0x80;
    }
}

bitflags! {
    /// TypeFlags byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TypeFlags: u8 {
        /// OLEDB-style client.
        const OLEDB = 0x10;
        /// Ask for a readable secondary.
        const READ_ONLY_INTENT = 0x20;
    }
}

bitflags! {
    /// OptionFlags3 byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct OptionFlags3: u8 {
        /// The change-password field is populated.
        const CHANGE_PASSWORD = 0x01;
        /// Connect to a user instance.
        const USER_INSTANCE = 0x02;
        /// Tolerate unknown collations.
        const UNKNOWN_COLLATION_HANDLING = 0x08;
        /// A FEATUREEXT block follows the variable data.
        const EXTENSION = 0x10;
    }
}

/// LOGIN7 feature-extension ids.
pub mod feature {
    /// Session recovery (connection resiliency).
    pub const SESSION_RECOVERY: u8 = 0x01;
    /// Federated authentication.
    pub const FED_AUTH: u8 = 0x02;
    /// Column encryption.
    pub const COLUMN_ENCRYPTION: u8 = 0x04;
    /// Global transactions.
    pub const GLOBAL_TRANSACTIONS: u8 = 0x05;
    /// UTF-8 support.
    pub const UTF8_SUPPORT: u8 = 0x0A;
    /// End of block.
    pub const TERMINATOR: u8 = 0xFF;
}

/// One FEATUREEXT entry.
#[derive(Debug, Clone)]
pub struct FeatureExt {
    /// Feature id (see [`feature`]).
    pub id: u8,
    /// Feature payload.
    pub data: Bytes,
}

/// LOGIN7 request builder.
#[derive(Debug, Clone)]
pub struct Login7 {
    /// TDS version to announce.
    pub tds_version: TdsVersion,
    /// Requested packet size.
    pub packet_size: u32,
    /// Client program version, packed.
    pub client_prog_version: u32,
    /// Client process id.
    pub client_pid: u32,
    /// Connection id for pooled reconnects.
    pub connection_id: u32,
    /// Flag bytes.
    pub flags1: OptionFlags1,
    /// Flag bytes.
    pub flags2: OptionFlags2,
    /// Type flag byte.
    pub type_flags: TypeFlags,
    /// Flag bytes.
    pub flags3: OptionFlags3,
    /// Client timezone offset in minutes from UTC.
    pub timezone: i32,
    /// Client locale id.
    pub lcid: u32,
    /// Client machine name.
    pub hostname: String,
    /// SQL login name; empty for integrated security.
    pub username: String,
    /// SQL login password.
    pub password: String,
    /// Application name.
    pub app_name: String,
    /// Server name as dialled.
    pub server_name: String,
    /// Client library name.
    pub library: String,
    /// Initial language; empty accepts the login default.
    pub language: String,
    /// Initial database; empty accepts the login default.
    pub database: String,
    /// Client MAC address, conventionally zero.
    pub client_id: [u8; 6],
    /// SSPI blob for integrated security.
    pub sspi: Vec<u8>,
    /// Database file to attach (user instances).
    pub attach_db_file: String,
    /// New password when rotating at login.
    pub change_password: String,
    /// FEATUREEXT entries; non-empty sets [`OptionFlags3::EXTENSION`].
    pub features: Vec<FeatureExt>,
}

impl Default for Login7 {
    fn default() -> Self {
        Self {
            tds_version: TdsVersion::V7_4,
            packet_size: 4096,
            client_prog_version: 0,
            client_pid: std::process::id(),
            connection_id: 0,
            flags1: OptionFlags1::USE_DB_NOTIFY | OptionFlags1::DATABASE_FATAL,
            flags2: OptionFlags2::LANGUAGE_FATAL | OptionFlags2::ODBC,
            type_flags: TypeFlags::empty(),
            flags3: OptionFlags3::UNKNOWN_COLLATION_HANDLING,
            timezone: 0,
            lcid: 0x0409,
            hostname: String::new(),
            username: String::new(),
            password: String::new(),
            app_name: String::from("sqlsrv"),
            server_name: String::new(),
            library: String::from("sqlsrv"),
            language: String::new(),
            database: String::new(),
            client_id: [0u8; 6],
            sspi: Vec::new(),
            attach_db_file: String::new(),
            change_password: String::new(),
            features: Vec::new(),
        }
    }
}

/// A pending entry of the offset/length table.
struct Field {
    offset: u16,
    /// Length in code units (strings) or bytes (SSPI).
    count: u16,
}

impl Login7 {
    /// Serialise the request payload (without packet framing).
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let has_extension = !self.features.is_empty();
        let mut flags3 = self.flags3;
        if has_extension {
            flags3 |= OptionFlags3::EXTENSION;
        }
        if !self.change_password.is_empty() {
            flags3 |= OptionFlags3::CHANGE_PASSWORD;
        }

        let mut var = BytesMut::new();
        let base = FIXED_HEADER_LEN as u16;

        let mut push_str = |var: &mut BytesMut, s: &str, obfuscate: bool| -> Field {
            let offset = base + var.len() as u16;
            let before = var.len();
            if obfuscate {
                put_obfuscated_password(var, s);
            } else {
                put_utf16(var, s);
            }
            Field {
                offset,
                count: ((var.len() - before) / 2) as u16,
            }
        };

        let hostname = push_str(&mut var, &self.hostname, false);
        let username = push_str(&mut var, &self.username, false);
        let password = push_str(&mut var, &self.password, true);
        let app_name = push_str(&mut var, &self.app_name, false);
        let server_name = push_str(&mut var, &self.server_name, false);

        // The sixth slot is either unused or a 4-byte pointer to the
        // FEATUREEXT block appended after all other variable data.
        let extension = if has_extension {
            let offset = base + var.len() as u16;
            var.put_u32_le(0); // patched once the block position is known
            Field { offset, count: 4 }
        } else {
            Field {
                offset: base + var.len() as u16,
                count: 0,
            }
        };
        let extension_ptr_pos = extension.offset as usize - FIXED_HEADER_LEN;

        let library = push_str(&mut var, &self.library, false);
        let language = push_str(&mut var, &self.language, false);
        let database = push_str(&mut var, &self.database, false);

        let sspi = Field {
            offset: base + var.len() as u16,
            count: self.sspi.len() as u16,
        };
        var.put_slice(&self.sspi);

        let attach_db = push_str(&mut var, &self.attach_db_file, false);
        let change_password = push_str(&mut var, &self.change_password, true);

        if has_extension {
            let block_offset = FIXED_HEADER_LEN + var.len();
            var[extension_ptr_pos..extension_ptr_pos + 4]
                .copy_from_slice(&(block_offset as u32).to_le_bytes());
            for feat in &self.features {
                var.put_u8(feat.id);
                var.put_u32_le(feat.data.len() as u32);
                var.put_slice(&feat.data);
            }
            var.put_u8(feature::TERMINATOR);
        }

        let total = FIXED_HEADER_LEN + var.len();
        let mut buf = BytesMut::with_capacity(total);
        buf.put_u32_le(total as u32);
        buf.put_u32_le(self.tds_version.raw());
        buf.put_u32_le(self.packet_size);
        buf.put_u32_le(self.client_prog_version);
        buf.put_u32_le(self.client_pid);
        buf.put_u32_le(self.connection_id);
        buf.put_u8(self.flags1.bits());
        buf.put_u8(self.flags2.bits());
        buf.put_u8(self.type_flags.bits());
        buf.put_u8(flags3.bits());
        buf.put_i32_le(self.timezone);
        buf.put_u32_le(self.lcid);

        for field in [
            &hostname,
            &username,
            &password,
            &app_name,
            &server_name,
            &extension,
        ] {
            buf.put_u16_le(field.offset);
            buf.put_u16_le(field.count);
        }
        for field in [&library, &language, &database] {
            buf.put_u16_le(field.offset);
            buf.put_u16_le(field.count);
        }
        buf.put_slice(&self.client_id);
        for field in [&sspi, &attach_db, &change_password] {
            buf.put_u16_le(field.offset);
            buf.put_u16_le(field.count);
        }
        // Long SSPI length, used only when the blob exceeds 64 KiB.
        buf.put_u32_le(0);

        debug_assert_eq!(buf.len(), FIXED_HEADER_LEN);
        buf.put_slice(&var);
        buf.freeze()
    }
}

/// Per-byte nibble swap followed by XOR 0xA5, applied over UTF-16LE.
fn put_obfuscated_password(dst: &mut BytesMut, password: &str) {
    for unit in password.encode_utf16() {
        for byte in unit.to_le_bytes() {
            dst.put_u8(byte.rotate_left(4) ^ 0xA5);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn fixed_header_layout() {
        let login = Login7 {
            hostname: "client".into(),
            username: "sa".into(),
            password: "secret".into(),
            database: "orders".into(),
            server_name: "db.example".into(),
            ..Login7::default()
        };
        let bytes = login.encode();

        let total = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        assert_eq!(total as usize, bytes.len());
        let version = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        assert_eq!(version, 0x7400_0004);

        // Hostname is the first variable field, right after the header.
        let host_offset = u16::from_le_bytes(bytes[36..38].try_into().unwrap());
        let host_len = u16::from_le_bytes(bytes[38..40].try_into().unwrap());
        assert_eq!(host_offset as usize, FIXED_HEADER_LEN);
        assert_eq!(host_len, 6);
    }

    #[test]
    fn password_obfuscation_known_value() {
        let mut buf = BytesMut::new();
        put_obfuscated_password(&mut buf, "a");
        // 'a' = 0x0061: 0x61 -> swap -> 0x16 -> xor -> 0xB3; 0x00 -> 0xA5.
        assert_eq!(&buf[..], &[0xB3, 0xA5]);
    }

    #[test]
    fn password_is_not_plaintext_in_packet() {
        let login = Login7 {
            username: "sa".into(),
            password: "hunter2".into(),
            ..Login7::default()
        };
        let bytes = login.encode();
        let mut plain = BytesMut::new();
        put_utf16(&mut plain, "hunter2");
        assert!(
            !bytes.windows(plain.len()).any(|w| w == &plain[..]),
            "obfuscated password must not contain the plaintext encoding"
        );
    }

    #[test]
    fn feature_block_sets_extension_flag() {
        let login = Login7 {
            features: vec![FeatureExt {
                id: feature::UTF8_SUPPORT,
                data: Bytes::from_static(&[0x01]),
            }],
            ..Login7::default()
        };
        let bytes = login.encode();
        assert_ne!(bytes[27] & OptionFlags3::EXTENSION.bits(), 0);
        // Block sits at the end: id, length, payload, terminator.
        assert_eq!(bytes[bytes.len() - 1], feature::TERMINATOR);
        assert_eq!(bytes[bytes.len() - 7], feature::UTF8_SUPPORT);
    }

    #[test]
    fn integrated_security_flag() {
        let login = Login7 {
            flags2: OptionFlags2::INTEGRATED_SECURITY | OptionFlags2::ODBC,
            sspi: vec![0x4E, 0x54, 0x4C, 0x4D],
            ..Login7::default()
        };
        let bytes = login.encode();
        assert_ne!(bytes[25] & 0x80, 0);
    }
}
