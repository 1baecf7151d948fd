//! Wire payload to [`Value`] decoding.
//!
//! Input is the per-column byte slice produced by the row slicer, together
//! with the column's TYPE_INFO; output is a typed [`Value`]. Charset
//! conversion for non-Unicode columns follows the column collation.

use bytes::Bytes;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, Timelike};
use rust_decimal::Decimal;
use tds_wire::collation::Collation;
use tds_wire::row::VariantValue;
use tds_wire::typeinfo::{TypeId, TypeInfo};
use uuid::Uuid;

use crate::error::ValueError;
use crate::value::Value;

/// Decode one column value; `None` input is SQL NULL.
pub fn decode_value(raw: Option<&Bytes>, info: &TypeInfo) -> Result<Value, ValueError> {
    match raw {
        None => Ok(Value::Null),
        Some(payload) => decode_payload(payload, info),
    }
}

fn decode_payload(b: &Bytes, info: &TypeInfo) -> Result<Value, ValueError> {
    match info.id {
        TypeId::Null => Ok(Value::Null),
        TypeId::Bit => Ok(Value::Bit(expect_len(b, 1, "BIT")?[0] != 0)),
        TypeId::TinyInt => Ok(Value::TinyInt(expect_len(b, 1, "TINYINT")?[0])),
        TypeId::SmallInt => {
            let b = expect_len(b, 2, "SMALLINT")?;
            Ok(Value::SmallInt(i16::from_le_bytes([b[0], b[1]])))
        }
        TypeId::Int => {
            let b = expect_len(b, 4, "INT")?;
            Ok(Value::Int(i32::from_le_bytes([b[0], b[1], b[2], b[3]])))
        }
        TypeId::BigInt => Ok(Value::BigInt(i64::from_le_bytes(
            expect_array(b, "BIGINT")?,
        ))),
        TypeId::Real => {
            let b = expect_len(b, 4, "REAL")?;
            Ok(Value::Real(f32::from_le_bytes([b[0], b[1], b[2], b[3]])))
        }
        TypeId::Float => Ok(Value::Float(f64::from_le_bytes(expect_array(b, "FLOAT")?))),

        TypeId::IntN => match b.len() {
            1 => Ok(Value::TinyInt(b[0])),
            2 => Ok(Value::SmallInt(i16::from_le_bytes([b[0], b[1]]))),
            4 => Ok(Value::Int(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))),
            8 => Ok(Value::BigInt(i64::from_le_bytes(expect_array(b, "INTN")?))),
            len => Err(ValueError::UnexpectedLength { what: "INTN", len }),
        },
        TypeId::BitN => Ok(Value::Bit(expect_len(b, 1, "BITN")?[0] != 0)),
        TypeId::FloatN => match b.len() {
            4 => Ok(Value::Real(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))),
            8 => Ok(Value::Float(f64::from_le_bytes(expect_array(b, "FLOATN")?))),
            len => Err(ValueError::UnexpectedLength { what: "FLOATN", len }),
        },

        TypeId::Money | TypeId::SmallMoney | TypeId::MoneyN => decode_money(b),
        TypeId::Decimal | TypeId::Numeric | TypeId::DecimalN | TypeId::NumericN => {
            decode_decimal(b, info.scale)
        }

        TypeId::Guid => {
            let raw: [u8; 16] = expect_array(b, "UNIQUEIDENTIFIER")?;
            Ok(Value::Guid(Uuid::from_bytes_le(raw)))
        }

        TypeId::DateTime | TypeId::SmallDateTime | TypeId::DateTimeN => decode_datetime(b),
        TypeId::Date => Ok(Value::Date(date_from_wire(expect_len(b, 3, "DATE")?)?)),
        TypeId::Time => Ok(Value::Time(time_from_wire(b, info.scale, "TIME")?)),
        TypeId::DateTime2 => {
            if b.len() < 3 {
                return Err(ValueError::UnexpectedLength {
                    what: "DATETIME2",
                    len: b.len(),
                });
            }
            let (time_part, date_part) = b.split_at(b.len() - 3);
            let time = time_from_wire(time_part, info.scale, "DATETIME2")?;
            let date = date_from_wire(date_part)?;
            Ok(Value::DateTime(date.and_time(time)))
        }
        TypeId::DateTimeOffset => {
            if b.len() < 5 {
                return Err(ValueError::UnexpectedLength {
                    what: "DATETIMEOFFSET",
                    len: b.len(),
                });
            }
            let (rest, offset_part) = b.split_at(b.len() - 2);
            let (time_part, date_part) = rest.split_at(rest.len() - 3);
            let time = time_from_wire(time_part, info.scale, "DATETIMEOFFSET")?;
            let date = date_from_wire(date_part)?;
            let minutes = i16::from_le_bytes([offset_part[0], offset_part[1]]);
            let offset = FixedOffset::east_opt(i32::from(minutes) * 60)
                .ok_or(ValueError::TemporalOutOfRange("DATETIMEOFFSET"))?;
            Ok(Value::DateTimeOffset(
                DateTime::<FixedOffset>::from_naive_utc_and_offset(date.and_time(time), offset),
            ))
        }

        TypeId::LegacyChar | TypeId::LegacyVarChar | TypeId::BigChar | TypeId::BigVarChar
        | TypeId::Text => decode_ansi(b, info.collation),
        TypeId::NChar | TypeId::NVarChar | TypeId::NText => {
            Ok(Value::String(utf16_string(b, "NVARCHAR")?))
        }
        TypeId::Xml => Ok(Value::Xml(utf16_string(b, "XML")?)),

        TypeId::LegacyBinary | TypeId::LegacyVarBinary | TypeId::BigBinary
        | TypeId::BigVarBinary | TypeId::Image | TypeId::Udt | TypeId::Vector => {
            Ok(Value::Bytes(b.clone()))
        }

        #[cfg(feature = "json")]
        TypeId::Json => {
            let text =
                std::str::from_utf8(b).map_err(|_| ValueError::InvalidText("JSON (UTF-8)"))?;
            serde_json::from_str(text)
                .map(Value::Json)
                .map_err(|e| ValueError::InvalidJson(e.to_string()))
        }
        #[cfg(not(feature = "json"))]
        TypeId::Json => std::str::from_utf8(b)
            .map(|s| Value::String(s.to_owned()))
            .map_err(|_| ValueError::InvalidText("JSON (UTF-8)")),

        TypeId::Variant => decode_variant(b),
    }
}

fn decode_variant(b: &Bytes) -> Result<Value, ValueError> {
    let variant =
        VariantValue::parse(b).map_err(|_| ValueError::InvalidText("SQL_VARIANT envelope"))?;
    let base = TypeId::from_u8(variant.base_type)
        .map_err(|_| ValueError::UnsupportedVariant(variant.base_type))?;

    let mut info = TypeInfo::plain(base, variant.value.len() as u32);
    let props = &variant.properties;
    match base {
        TypeId::Decimal | TypeId::Numeric | TypeId::DecimalN | TypeId::NumericN => {
            let p = expect_len(props, 2, "variant decimal properties")?;
            info.precision = p[0];
            info.scale = p[1];
        }
        TypeId::Time | TypeId::DateTime2 | TypeId::DateTimeOffset => {
            info.scale = expect_len(props, 1, "variant temporal properties")?[0];
        }
        TypeId::BigChar | TypeId::BigVarChar | TypeId::NChar | TypeId::NVarChar => {
            let p = expect_len(props, 7, "variant char properties")?;
            let mut r = tds_wire::SliceReader::new(p);
            info.collation = Collation::decode(&mut r).ok();
        }
        _ => {}
    }
    decode_payload(&variant.value, &info)
}

fn decode_money(b: &Bytes) -> Result<Value, ValueError> {
    let cents = match b.len() {
        4 => i64::from(i32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        8 => {
            // MONEY is two 4-byte halves, most significant first.
            let hi = i32::from_le_bytes([b[0], b[1], b[2], b[3]]);
            let lo = u32::from_le_bytes([b[4], b[5], b[6], b[7]]);
            (i64::from(hi) << 32) | i64::from(lo)
        }
        len => return Err(ValueError::UnexpectedLength { what: "MONEY", len }),
    };
    Decimal::try_from_i128_with_scale(i128::from(cents), 4)
        .map(Value::Decimal)
        .map_err(|_| ValueError::DecimalOverflow)
}

fn decode_decimal(b: &Bytes, scale: u8) -> Result<Value, ValueError> {
    if b.is_empty() || b.len() > 17 {
        return Err(ValueError::UnexpectedLength {
            what: "DECIMAL",
            len: b.len(),
        });
    }
    let positive = b[0] != 0;
    let mut magnitude: u128 = 0;
    for (i, byte) in b[1..].iter().enumerate() {
        magnitude |= u128::from(*byte) << (8 * i);
    }
    if magnitude > i128::MAX as u128 {
        return Err(ValueError::DecimalOverflow);
    }
    let signed = if positive {
        magnitude as i128
    } else {
        -(magnitude as i128)
    };
    Decimal::try_from_i128_with_scale(signed, u32::from(scale))
        .map(Value::Decimal)
        .map_err(|_| ValueError::DecimalOverflow)
}

fn decode_datetime(b: &Bytes) -> Result<Value, ValueError> {
    match b.len() {
        // SMALLDATETIME: days then minutes, both unsigned shorts.
        4 => {
            let days = u16::from_le_bytes([b[0], b[1]]);
            let minutes = u16::from_le_bytes([b[2], b[3]]);
            let date = epoch_1900()
                .checked_add_days(chrono::Days::new(u64::from(days)))
                .ok_or(ValueError::TemporalOutOfRange("SMALLDATETIME"))?;
            let time = NaiveTime::from_num_seconds_from_midnight_opt(
                u32::from(minutes) * 60,
                0,
            )
            .ok_or(ValueError::TemporalOutOfRange("SMALLDATETIME"))?;
            Ok(Value::DateTime(date.and_time(time)))
        }
        // DATETIME: signed days then 1/300-second ticks.
        8 => {
            let days = i32::from_le_bytes([b[0], b[1], b[2], b[3]]);
            let ticks = u32::from_le_bytes([b[4], b[5], b[6], b[7]]);
            let date = epoch_1900()
                .checked_add_signed(chrono::Duration::days(i64::from(days)))
                .ok_or(ValueError::TemporalOutOfRange("DATETIME"))?;
            let nanos = u64::from(ticks) * 10_000_000 / 3;
            let time = NaiveTime::from_num_seconds_from_midnight_opt(
                (nanos / 1_000_000_000) as u32,
                (nanos % 1_000_000_000) as u32,
            )
            .ok_or(ValueError::TemporalOutOfRange("DATETIME"))?;
            Ok(Value::DateTime(date.and_time(time)))
        }
        len => Err(ValueError::UnexpectedLength {
            what: "DATETIME",
            len,
        }),
    }
}

fn decode_ansi(b: &Bytes, collation: Option<Collation>) -> Result<Value, ValueError> {
    let encoding = collation.map_or(encoding_rs::WINDOWS_1252, |c| c.encoding());
    let (text, _, had_errors) = encoding.decode(b);
    if had_errors {
        return Err(ValueError::InvalidText(encoding.name()));
    }
    Ok(Value::String(text.into_owned()))
}

fn utf16_string(b: &Bytes, what: &'static str) -> Result<String, ValueError> {
    if b.len() % 2 != 0 {
        return Err(ValueError::UnexpectedLength {
            what,
            len: b.len(),
        });
    }
    let units: Vec<u16> = b
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16(&units).map_err(|_| ValueError::InvalidText("UTF-16"))
}

fn expect_len<'a>(b: &'a [u8], len: usize, what: &'static str) -> Result<&'a [u8], ValueError> {
    if b.len() == len {
        Ok(b)
    } else {
        Err(ValueError::UnexpectedLength { what, len: b.len() })
    }
}

fn expect_array<const N: usize>(b: &[u8], what: &'static str) -> Result<[u8; N], ValueError> {
    b.try_into()
        .map_err(|_| ValueError::UnexpectedLength { what, len: b.len() })
}

fn epoch_1900() -> NaiveDate {
    // Known-valid constant.
    NaiveDate::from_num_days_from_ce_opt(693_596).unwrap_or(NaiveDate::MIN)
}

/// DATE wire form: unsigned little-endian day count from 0001-01-01.
pub(crate) fn date_from_wire(b: &[u8]) -> Result<NaiveDate, ValueError> {
    if b.len() != 3 {
        return Err(ValueError::UnexpectedLength {
            what: "DATE",
            len: b.len(),
        });
    }
    let days = u32::from(b[0]) | (u32::from(b[1]) << 8) | (u32::from(b[2]) << 16);
    NaiveDate::from_num_days_from_ce_opt(days as i32 + 1)
        .ok_or(ValueError::TemporalOutOfRange("DATE"))
}

/// Inverse of [`date_from_wire`].
pub(crate) fn date_to_wire(date: NaiveDate) -> [u8; 3] {
    let days = (date.num_days_from_ce() - 1) as u32;
    [days as u8, (days >> 8) as u8, (days >> 16) as u8]
}

/// TIME wire form: little-endian count of 10^-scale second units.
pub(crate) fn time_from_wire(
    b: &[u8],
    scale: u8,
    what: &'static str,
) -> Result<NaiveTime, ValueError> {
    if b.is_empty() || b.len() > 5 {
        return Err(ValueError::UnexpectedLength { what, len: b.len() });
    }
    let mut ticks: u64 = 0;
    for (i, byte) in b.iter().enumerate() {
        ticks |= u64::from(*byte) << (8 * i);
    }
    let nanos = ticks * 10u64.pow(9 - u32::from(scale.min(7)));
    NaiveTime::from_num_seconds_from_midnight_opt(
        (nanos / 1_000_000_000) as u32,
        (nanos % 1_000_000_000) as u32,
    )
    .ok_or(ValueError::TemporalOutOfRange(what))
}

/// Inverse of [`time_from_wire`] at scale 7 (5 bytes).
pub(crate) fn time_to_wire(time: NaiveTime) -> [u8; 5] {
    let nanos =
        u64::from(time.num_seconds_from_midnight()) * 1_000_000_000 + u64::from(time.nanosecond());
    let ticks = nanos / 100;
    let mut out = [0u8; 5];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = (ticks >> (8 * i)) as u8;
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tds_wire::typeinfo::TypeInfo;

    fn plain(id: TypeId) -> TypeInfo {
        TypeInfo::plain(id, 0)
    }

    #[test]
    fn null_input_decodes_to_null() {
        assert_eq!(
            decode_value(None, &plain(TypeId::Int)).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn intn_by_width() {
        let info = plain(TypeId::IntN);
        assert_eq!(
            decode_value(Some(&Bytes::from_static(&[5])), &info).unwrap(),
            Value::TinyInt(5)
        );
        assert_eq!(
            decode_value(Some(&Bytes::from_static(&[0x2A, 0, 0, 0])), &info).unwrap(),
            Value::Int(42)
        );
        let wide = Bytes::copy_from_slice(&(-7i64).to_le_bytes());
        assert_eq!(decode_value(Some(&wide), &info).unwrap(), Value::BigInt(-7));
        assert!(decode_value(Some(&Bytes::from_static(&[0, 0, 0])), &info).is_err());
    }

    #[test]
    fn money_scale_four() {
        // 12.3456 MONEY = 123456 in 1/10000 units.
        let mut raw = Vec::new();
        let cents: i64 = 123_456;
        raw.extend_from_slice(&((cents >> 32) as i32).to_le_bytes());
        raw.extend_from_slice(&(cents as u32).to_le_bytes());
        let v = decode_value(Some(&raw.into()), &plain(TypeId::Money)).unwrap();
        assert_eq!(v, Value::Decimal(Decimal::new(123_456, 4)));
    }

    #[test]
    fn decimal_sign_and_magnitude() {
        let info = TypeInfo {
            precision: 10,
            scale: 2,
            ..plain(TypeId::NumericN)
        };
        // -1234.56 at scale 2: magnitude 123456, sign byte 0.
        let mut raw = vec![0u8];
        raw.extend_from_slice(&123_456u32.to_le_bytes());
        let v = decode_value(Some(&raw.into()), &info).unwrap();
        assert_eq!(v, Value::Decimal(Decimal::new(-123_456, 2)));
    }

    #[test]
    fn guid_mixed_endianness() {
        let wire: [u8; 16] = [
            0x33, 0x22, 0x11, 0x00, 0x55, 0x44, 0x77, 0x66, 0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD,
            0xEE, 0xFF,
        ];
        let v = decode_value(
            Some(&Bytes::copy_from_slice(&wire)),
            &plain(TypeId::Guid),
        )
        .unwrap();
        assert_eq!(
            v,
            Value::Guid(Uuid::parse_str("00112233-4455-6677-8899-aabbccddeeff").unwrap())
        );
    }

    #[test]
    fn date_epoch_and_roundtrip() {
        assert_eq!(
            date_from_wire(&[0, 0, 0]).unwrap(),
            NaiveDate::from_ymd_opt(1, 1, 1).unwrap()
        );
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(date_from_wire(&date_to_wire(date)).unwrap(), date);
    }

    #[test]
    fn time_scale_handling() {
        // 12:34:56 at scale 0 is 45296 seconds.
        let secs: u32 = 12 * 3600 + 34 * 60 + 56;
        let raw = [secs as u8, (secs >> 8) as u8, (secs >> 16) as u8];
        let t = time_from_wire(&raw, 0, "TIME").unwrap();
        assert_eq!(t, NaiveTime::from_hms_opt(12, 34, 56).unwrap());

        let noon = NaiveTime::from_hms_micro_opt(12, 0, 0, 250_000).unwrap();
        assert_eq!(time_from_wire(&time_to_wire(noon), 7, "TIME").unwrap(), noon);
    }

    #[test]
    fn legacy_datetime_ticks() {
        // 1900-01-02 00:00:01 → days=1, ticks=300.
        let mut raw = Vec::new();
        raw.extend_from_slice(&1i32.to_le_bytes());
        raw.extend_from_slice(&300u32.to_le_bytes());
        let v = decode_value(Some(&raw.into()), &plain(TypeId::DateTime)).unwrap();
        assert_eq!(
            v,
            Value::DateTime(
                NaiveDate::from_ymd_opt(1900, 1, 2)
                    .unwrap()
                    .and_hms_opt(0, 0, 1)
                    .unwrap()
            )
        );
    }

    #[test]
    fn datetimeoffset_applies_offset() {
        // 2000-01-01 00:00:00 UTC at +02:00, scale 0.
        let date = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
        let mut raw = Vec::new();
        raw.extend_from_slice(&[0, 0, 0]); // midnight, scale 0
        raw.extend_from_slice(&date_to_wire(date));
        raw.extend_from_slice(&120i16.to_le_bytes());
        let info = TypeInfo {
            scale: 0,
            ..plain(TypeId::DateTimeOffset)
        };
        let v = decode_value(Some(&raw.into()), &info).unwrap();
        match v {
            Value::DateTimeOffset(dto) => {
                assert_eq!(dto.offset().local_minus_utc(), 7200);
                assert_eq!(dto.naive_utc(), date.and_hms_opt(0, 0, 0).unwrap());
            }
            other => panic!("expected DATETIMEOFFSET, got {other:?}"),
        }
    }

    #[test]
    fn ansi_text_uses_collation_code_page() {
        // 0xE9 is é in Windows-1252.
        let info = TypeInfo {
            collation: Some(Collation {
                info: 0x0409,
                sort_id: 0,
            }),
            ..plain(TypeId::BigVarChar)
        };
        let v = decode_value(Some(&Bytes::from_static(&[0x63, 0x61, 0x66, 0xE9])), &info).unwrap();
        assert_eq!(v, Value::String("café".into()));
    }

    #[test]
    fn nvarchar_utf16() {
        let raw = Bytes::from_static(&[0x3C, 0xD8, 0x00, 0xDE]); // 😀 as surrogates
        let v = decode_value(Some(&raw), &plain(TypeId::NVarChar)).unwrap();
        assert_eq!(v, Value::String("\u{1F600}".into()));
    }

    #[test]
    fn variant_int_payload() {
        // base type INT, no properties, 4-byte value.
        let raw = Bytes::from_static(&[0x38, 0x00, 0x2A, 0x00, 0x00, 0x00]);
        let v = decode_value(Some(&raw), &plain(TypeId::Variant)).unwrap();
        assert_eq!(v, Value::Int(42));
    }

    #[test]
    fn variant_nvarchar_payload() {
        let mut raw = vec![0xE7, 0x07];
        raw.extend_from_slice(&[0x09, 0x04, 0x00, 0x00, 0x00]); // collation
        raw.extend_from_slice(&10u16.to_le_bytes()); // declared max
        raw.extend_from_slice(&[b'h', 0, b'i', 0]);
        let v = decode_value(Some(&raw.into()), &plain(TypeId::Variant)).unwrap();
        assert_eq!(v, Value::String("hi".into()));
    }
}
