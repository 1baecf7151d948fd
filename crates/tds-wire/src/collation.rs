//! SQL Server collation descriptor.
//!
//! Five bytes on the wire: a packed LCID/flags/version word plus a sort id.
//! The LCID selects the code page used for non-Unicode character columns;
//! SQL Server 2019 collations can instead flag UTF-8 directly.

use bytes::{BufMut, BytesMut};
use encoding_rs::Encoding;

use crate::codec::{NeedMore, SliceReader};

/// Bit set in the packed word when the collation stores UTF-8.
const UTF8_FLAG: u32 = 0x0800_0000;

/// A 5-byte collation as carried in TYPE_INFO and ENVCHANGE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collation {
    /// Packed LCID (bits 0..20), comparison flags (20..28), version (28..32).
    pub info: u32,
    /// Sort order id; non-zero selects a legacy SQL sort order.
    pub sort_id: u8,
}

impl Collation {
    /// Read the 5-byte wire form.
    pub fn decode(r: &mut SliceReader<'_>) -> Result<Self, NeedMore> {
        let info = r.u32_le()?;
        let sort_id = r.u8()?;
        Ok(Self { info, sort_id })
    }

    /// Write the 5-byte wire form.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u32_le(self.info);
        dst.put_u8(self.sort_id);
    }

    /// Windows locale id portion.
    #[must_use]
    pub const fn lcid(&self) -> u32 {
        self.info & 0xF_FFFF
    }

    /// Whether this is a UTF-8 collation (SQL Server 2019+).
    #[must_use]
    pub const fn is_utf8(&self) -> bool {
        self.info & UTF8_FLAG != 0
    }

    /// The character encoding for non-Unicode columns under this collation.
    ///
    /// Falls back to Windows-1252, which is what SQL Server itself does for
    /// locales without an assigned ANSI code page.
    #[must_use]
    pub fn encoding(&self) -> &'static Encoding {
        if self.is_utf8() {
            return encoding_rs::UTF_8;
        }
        match self.lcid() {
            // East Asian
            0x0411 => encoding_rs::SHIFT_JIS,
            0x0804 | 0x1004 => encoding_rs::GBK,
            0x0404 | 0x0C04 | 0x1404 => encoding_rs::BIG5,
            0x0412 => encoding_rs::EUC_KR,
            // Thai / Vietnamese
            0x041E => encoding_rs::WINDOWS_874,
            0x042A => encoding_rs::WINDOWS_1258,
            // Central European
            0x0405 | 0x040E | 0x0415 | 0x0418 | 0x041A | 0x041B | 0x041C | 0x0424 | 0x081A
            | 0x101A | 0x141A => encoding_rs::WINDOWS_1250,
            // Cyrillic
            0x0402 | 0x0419 | 0x0422 | 0x0423 | 0x042F | 0x0440 | 0x0444 | 0x0450 | 0x0485
            | 0x0C1A | 0x201A => encoding_rs::WINDOWS_1251,
            // Greek
            0x0408 => encoding_rs::WINDOWS_1253,
            // Turkish / Azerbaijani
            0x041F | 0x042C => encoding_rs::WINDOWS_1254,
            // Hebrew
            0x040D => encoding_rs::WINDOWS_1255,
            // Arabic
            0x0401 | 0x0801 | 0x0C01 | 0x1001 | 0x1401 | 0x1801 | 0x1C01 | 0x2001 | 0x2401
            | 0x2801 | 0x2C01 | 0x3001 | 0x3401 | 0x3801 | 0x3C01 | 0x4001 | 0x0420 | 0x0429 => {
                encoding_rs::WINDOWS_1256
            }
            // Baltic
            0x0425 | 0x0426 | 0x0427 => encoding_rs::WINDOWS_1257,
            _ => encoding_rs::WINDOWS_1252,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // Latin1_General_CI_AS as observed from a us_english server.
    const LATIN1_GENERAL: Collation = Collation {
        info: 0x0020_0409,
        sort_id: 0,
    };

    #[test]
    fn five_byte_roundtrip() {
        let mut buf = BytesMut::new();
        LATIN1_GENERAL.encode(&mut buf);
        assert_eq!(buf.len(), 5);
        let mut r = SliceReader::new(&buf);
        assert_eq!(Collation::decode(&mut r).unwrap(), LATIN1_GENERAL);
    }

    #[test]
    fn lcid_masks_flags() {
        assert_eq!(LATIN1_GENERAL.lcid(), 0x0409);
        assert!(!LATIN1_GENERAL.is_utf8());
    }

    #[test]
    fn encoding_selection() {
        assert_eq!(LATIN1_GENERAL.encoding(), encoding_rs::WINDOWS_1252);

        let japanese = Collation {
            info: 0x0411,
            sort_id: 0,
        };
        assert_eq!(japanese.encoding(), encoding_rs::SHIFT_JIS);

        let utf8 = Collation {
            info: 0x0409 | 0x0800_0000,
            sort_id: 0,
        };
        assert!(utf8.is_utf8());
        assert_eq!(utf8.encoding(), encoding_rs::UTF_8);
    }
}
