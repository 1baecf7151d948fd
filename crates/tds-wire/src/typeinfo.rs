//! TYPE_INFO: the per-column type descriptor.

use bytes::{BufMut, BytesMut};

use crate::codec::{DecodeFault, DecodeResult, SliceReader};
use crate::collation::Collation;
use crate::error::WireError;

/// Data type ids as they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeId {
    /// Typeless NULL.
    Null = 0x1F,
    /// TINYINT.
    TinyInt = 0x30,
    /// BIT.
    Bit = 0x32,
    /// SMALLINT.
    SmallInt = 0x34,
    /// INT.
    Int = 0x38,
    /// SMALLDATETIME.
    SmallDateTime = 0x3A,
    /// REAL.
    Real = 0x3B,
    /// MONEY.
    Money = 0x3C,
    /// DATETIME.
    DateTime = 0x3D,
    /// FLOAT.
    Float = 0x3E,
    /// SMALLMONEY.
    SmallMoney = 0x7A,
    /// BIGINT.
    BigInt = 0x7F,

    /// UNIQUEIDENTIFIER.
    Guid = 0x24,
    /// Nullable integer of declared width.
    IntN = 0x26,
    /// Legacy DECIMAL.
    Decimal = 0x37,
    /// Legacy NUMERIC.
    Numeric = 0x3F,
    /// Nullable BIT.
    BitN = 0x68,
    /// DECIMAL.
    DecimalN = 0x6A,
    /// NUMERIC.
    NumericN = 0x6C,
    /// Nullable float of declared width.
    FloatN = 0x6D,
    /// Nullable MONEY/SMALLMONEY.
    MoneyN = 0x6E,
    /// Nullable DATETIME/SMALLDATETIME.
    DateTimeN = 0x6F,
    /// DATE.
    Date = 0x28,
    /// TIME with scale.
    Time = 0x29,
    /// DATETIME2 with scale.
    DateTime2 = 0x2A,
    /// DATETIMEOFFSET with scale.
    DateTimeOffset = 0x2B,
    /// Legacy CHAR (1-byte length prefix).
    LegacyChar = 0x2F,
    /// Legacy VARCHAR (1-byte length prefix).
    LegacyVarChar = 0x27,
    /// Legacy BINARY (1-byte length prefix).
    LegacyBinary = 0x2D,
    /// Legacy VARBINARY (1-byte length prefix).
    LegacyVarBinary = 0x25,

    /// CHAR(n).
    BigChar = 0xAF,
    /// VARCHAR(n) / VARCHAR(MAX).
    BigVarChar = 0xA7,
    /// BINARY(n).
    BigBinary = 0xAD,
    /// VARBINARY(n) / VARBINARY(MAX).
    BigVarBinary = 0xA5,
    /// NCHAR(n).
    NChar = 0xEF,
    /// NVARCHAR(n) / NVARCHAR(MAX).
    NVarChar = 0xE7,
    /// JSON (SQL Server 2025+), PLP when declared MAX.
    Json = 0xF4,
    /// VECTOR, PLP when declared MAX.
    Vector = 0xF8,

    /// XML, always PLP.
    Xml = 0xF1,
    /// CLR user-defined type, always PLP.
    Udt = 0xF0,

    /// TEXT.
    Text = 0x23,
    /// IMAGE.
    Image = 0x22,
    /// NTEXT.
    NText = 0x63,
    /// SQL_VARIANT.
    Variant = 0x62,
}

/// How a value of a given type announces its length in a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthClass {
    /// No prefix; exactly this many bytes, never NULL on the wire.
    Fixed(usize),
    /// 1-byte length prefix; 0 means NULL.
    ByteLen,
    /// 1-byte length prefix; 0xFF means NULL (legacy char/binary ids).
    LegacyByteLen,
    /// 2-byte length prefix with 0xFFFF as NULL, or PLP when declared MAX.
    UShortLen,
    /// Text-pointer plus 4-byte length (TEXT/NTEXT/IMAGE).
    LongLen,
    /// Always Partially-Length-Prefixed.
    Plp,
    /// 4-byte total length envelope (SQL_VARIANT).
    Variant,
}

impl TypeId {
    /// Decode a type id byte.
    pub fn from_u8(value: u8) -> Result<Self, WireError> {
        Ok(match value {
            0x1F => Self::Null,
            0x30 => Self::TinyInt,
            0x32 => Self::Bit,
            0x34 => Self::SmallInt,
            0x38 => Self::Int,
            0x3A => Self::SmallDateTime,
            0x3B => Self::Real,
            0x3C => Self::Money,
            0x3D => Self::DateTime,
            0x3E => Self::Float,
            0x7A => Self::SmallMoney,
            0x7F => Self::BigInt,
            0x24 => Self::Guid,
            0x26 => Self::IntN,
            0x37 => Self::Decimal,
            0x3F => Self::Numeric,
            0x68 => Self::BitN,
            0x6A => Self::DecimalN,
            0x6C => Self::NumericN,
            0x6D => Self::FloatN,
            0x6E => Self::MoneyN,
            0x6F => Self::DateTimeN,
            0x28 => Self::Date,
            0x29 => Self::Time,
            0x2A => Self::DateTime2,
            0x2B => Self::DateTimeOffset,
            0x2F => Self::LegacyChar,
            0x27 => Self::LegacyVarChar,
            0x2D => Self::LegacyBinary,
            0x25 => Self::LegacyVarBinary,
            0xAF => Self::BigChar,
            0xA7 => Self::BigVarChar,
            0xAD => Self::BigBinary,
            0xA5 => Self::BigVarBinary,
            0xEF => Self::NChar,
            0xE7 => Self::NVarChar,
            0xF4 => Self::Json,
            0xF8 => Self::Vector,
            0xF1 => Self::Xml,
            0xF0 => Self::Udt,
            0x23 => Self::Text,
            0x22 => Self::Image,
            0x63 => Self::NText,
            0x62 => Self::Variant,
            other => return Err(WireError::UnknownDataType(other)),
        })
    }

    /// The length discipline row values of this type follow.
    #[must_use]
    pub const fn length_class(self) -> LengthClass {
        match self {
            Self::Null => LengthClass::Fixed(0),
            Self::TinyInt | Self::Bit => LengthClass::Fixed(1),
            Self::SmallInt => LengthClass::Fixed(2),
            Self::Int | Self::SmallDateTime | Self::Real | Self::SmallMoney => {
                LengthClass::Fixed(4)
            }
            Self::BigInt | Self::Money | Self::DateTime | Self::Float => LengthClass::Fixed(8),
            Self::Guid
            | Self::IntN
            | Self::Decimal
            | Self::Numeric
            | Self::BitN
            | Self::DecimalN
            | Self::NumericN
            | Self::FloatN
            | Self::MoneyN
            | Self::DateTimeN
            | Self::Date
            | Self::Time
            | Self::DateTime2
            | Self::DateTimeOffset => LengthClass::ByteLen,
            Self::LegacyChar | Self::LegacyVarChar | Self::LegacyBinary | Self::LegacyVarBinary => {
                LengthClass::LegacyByteLen
            }
            Self::BigChar
            | Self::BigVarChar
            | Self::BigBinary
            | Self::BigVarBinary
            | Self::NChar
            | Self::NVarChar
            | Self::Json
            | Self::Vector => LengthClass::UShortLen,
            Self::Text | Self::Image | Self::NText => LengthClass::LongLen,
            Self::Xml | Self::Udt => LengthClass::Plp,
            Self::Variant => LengthClass::Variant,
        }
    }

    /// Types whose payload is UTF-16LE text.
    #[must_use]
    pub const fn is_unicode_text(self) -> bool {
        matches!(self, Self::NChar | Self::NVarChar | Self::NText | Self::Xml)
    }

    /// Types whose payload is single-byte text under a collation.
    #[must_use]
    pub const fn is_ansi_text(self) -> bool {
        matches!(
            self,
            Self::LegacyChar | Self::LegacyVarChar | Self::BigChar | Self::BigVarChar | Self::Text
        )
    }

    /// Types that carry a 5-byte collation in TYPE_INFO.
    #[must_use]
    pub const fn has_collation(self) -> bool {
        matches!(
            self,
            Self::BigChar
                | Self::BigVarChar
                | Self::NChar
                | Self::NVarChar
                | Self::Text
                | Self::NText
        )
    }
}

/// Byte width of the time portion for a given temporal scale.
pub(crate) fn time_width(scale: u8) -> Result<usize, WireError> {
    match scale {
        0..=2 => Ok(3),
        3..=4 => Ok(4),
        5..=7 => Ok(5),
        other => Err(WireError::InvalidTemporalScale(other)),
    }
}

/// XML schema collection announced for a typed XML column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlSchema {
    /// Database holding the collection.
    pub database: String,
    /// Owning schema.
    pub owning_schema: String,
    /// Collection name.
    pub collection: String,
}

/// CLR assembly identity of a UDT column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdtIdentity {
    /// Database the type lives in.
    pub database: String,
    /// Schema the type lives in.
    pub schema: String,
    /// Type name.
    pub type_name: String,
    /// Fully qualified assembly name.
    pub assembly: String,
}

/// Parsed TYPE_INFO.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeInfo {
    /// Wire type id.
    pub id: TypeId,
    /// Declared maximum length; 0xFFFF marks a MAX (PLP) declaration for
    /// the USHORTLEN family. For fixed types this is the fixed width.
    pub size: u32,
    /// Decimal precision, when applicable.
    pub precision: u8,
    /// Decimal or temporal scale, when applicable.
    pub scale: u8,
    /// Collation for character types.
    pub collation: Option<Collation>,
    /// Schema collection for typed XML.
    pub xml_schema: Option<XmlSchema>,
    /// Assembly identity for UDT columns.
    pub udt: Option<UdtIdentity>,
}

impl TypeInfo {
    /// Descriptor with only an id and size; the common case.
    #[must_use]
    pub fn plain(id: TypeId, size: u32) -> Self {
        Self {
            id,
            size,
            precision: 0,
            scale: 0,
            collation: None,
            xml_schema: None,
            udt: None,
        }
    }

    /// Whether row values are Partially-Length-Prefixed.
    #[must_use]
    pub fn is_plp(&self) -> bool {
        match self.id.length_class() {
            LengthClass::Plp => true,
            LengthClass::UShortLen => self.size == 0xFFFF,
            _ => false,
        }
    }

    /// Parse a TYPE_INFO from the stream.
    pub fn decode(r: &mut SliceReader<'_>) -> DecodeResult<Self> {
        let id = TypeId::from_u8(r.u8()?)?;
        let mut info = Self::plain(id, 0);

        match id.length_class() {
            LengthClass::Fixed(width) => {
                info.size = width as u32;
            }
            LengthClass::ByteLen => match id {
                TypeId::Date => {
                    info.size = 3;
                }
                TypeId::Time | TypeId::DateTime2 | TypeId::DateTimeOffset => {
                    let scale = r.u8()?;
                    let mut width = time_width(scale)?;
                    if id == TypeId::DateTime2 {
                        width += 3;
                    } else if id == TypeId::DateTimeOffset {
                        width += 5;
                    }
                    info.scale = scale;
                    info.size = width as u32;
                }
                TypeId::Decimal | TypeId::Numeric | TypeId::DecimalN | TypeId::NumericN => {
                    info.size = r.u8()? as u32;
                    let precision = r.u8()?;
                    let scale = r.u8()?;
                    if precision > 38 || scale > precision {
                        return Err(DecodeFault::Protocol(WireError::InvalidDecimal {
                            precision,
                            scale,
                        }));
                    }
                    info.precision = precision;
                    info.scale = scale;
                }
                _ => {
                    info.size = r.u8()? as u32;
                }
            },
            LengthClass::LegacyByteLen => {
                info.size = r.u8()? as u32;
            }
            LengthClass::UShortLen => {
                info.size = r.u16_le()? as u32;
                if id.has_collation() {
                    info.collation = Some(Collation::decode(r)?);
                }
            }
            LengthClass::LongLen => {
                info.size = r.u32_le()?;
                if id.has_collation() {
                    info.collation = Some(Collation::decode(r)?);
                }
            }
            LengthClass::Plp => match id {
                TypeId::Xml => {
                    if r.u8()? == 1 {
                        info.xml_schema = Some(XmlSchema {
                            database: r.b_varchar("xml schema database")?,
                            owning_schema: r.b_varchar("xml owning schema")?,
                            collection: r.us_varchar("xml schema collection")?,
                        });
                    }
                }
                TypeId::Udt => {
                    info.size = r.u16_le()? as u32;
                    info.udt = Some(UdtIdentity {
                        database: r.b_varchar("udt database")?,
                        schema: r.b_varchar("udt schema")?,
                        type_name: r.b_varchar("udt type name")?,
                        assembly: r.us_varchar("udt assembly name")?,
                    });
                }
                _ => {}
            },
            LengthClass::Variant => {
                info.size = r.u32_le()?;
            }
        }

        Ok(info)
    }

    /// Serialise a TYPE_INFO for an outbound RPC parameter.
    ///
    /// Only the subset of types the parameter encoder emits is supported;
    /// XML/UDT/variant parameters are never produced by this client.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u8(self.id as u8);
        match self.id.length_class() {
            LengthClass::Fixed(_) => {}
            LengthClass::ByteLen => match self.id {
                TypeId::Date => {}
                TypeId::Time | TypeId::DateTime2 | TypeId::DateTimeOffset => {
                    dst.put_u8(self.scale);
                }
                TypeId::Decimal | TypeId::Numeric | TypeId::DecimalN | TypeId::NumericN => {
                    dst.put_u8(self.size as u8);
                    dst.put_u8(self.precision);
                    dst.put_u8(self.scale);
                }
                _ => dst.put_u8(self.size as u8),
            },
            LengthClass::LegacyByteLen => dst.put_u8(self.size as u8),
            LengthClass::UShortLen => {
                dst.put_u16_le(self.size as u16);
                if self.id.has_collation() {
                    match self.collation {
                        Some(c) => c.encode(dst),
                        None => dst.put_slice(&[0, 0, 0, 0, 0]),
                    }
                }
            }
            LengthClass::LongLen | LengthClass::Variant => dst.put_u32_le(self.size),
            LengthClass::Plp => {}
        }
    }
}
