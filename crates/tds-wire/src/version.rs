//! TDS protocol version constants.

use std::fmt;

/// Negotiable TDS protocol versions.
///
/// The client announces [`TdsVersion::V7_4`]; the server confirms the
/// version actually in effect through the LOGINACK token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum TdsVersion {
    /// SQL Server 2000.
    V7_1,
    /// SQL Server 2005.
    V7_2,
    /// SQL Server 2008.
    V7_3A,
    /// SQL Server 2008 R2.
    V7_3B,
    /// SQL Server 2012 and later.
    #[default]
    V7_4,
}

impl TdsVersion {
    /// Wire encoding of the version, as carried in LOGIN7 and LOGINACK.
    #[must_use]
    pub const fn raw(self) -> u32 {
        match self {
            Self::V7_1 => 0x7100_0001,
            Self::V7_2 => 0x7209_0002,
            Self::V7_3A => 0x730A_0003,
            Self::V7_3B => 0x730B_0003,
            Self::V7_4 => 0x7400_0004,
        }
    }

    /// Map a wire value back to a known version.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0x7100_0001 => Some(Self::V7_1),
            0x7209_0002 => Some(Self::V7_2),
            0x730A_0003 => Some(Self::V7_3A),
            0x730B_0003 => Some(Self::V7_3B),
            0x7400_0004 => Some(Self::V7_4),
            _ => None,
        }
    }
}

impl fmt::Display for TdsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::V7_1 => "7.1",
            Self::V7_2 => "7.2",
            Self::V7_3A => "7.3A",
            Self::V7_3B => "7.3B",
            Self::V7_4 => "7.4",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn announced_version_is_7_4() {
        assert_eq!(TdsVersion::default().raw(), 0x7400_0004);
    }

    #[test]
    fn raw_roundtrip() {
        for v in [
            TdsVersion::V7_1,
            TdsVersion::V7_2,
            TdsVersion::V7_3A,
            TdsVersion::V7_3B,
            TdsVersion::V7_4,
        ] {
            assert_eq!(TdsVersion::from_raw(v.raw()), Some(v));
        }
        assert_eq!(TdsVersion::from_raw(0xDEAD_BEEF), None);
    }
}
