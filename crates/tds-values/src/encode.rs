//! [`Value`] to RPC parameter encoding.
//!
//! Produces the TYPE_INFO and the value bytes (length prefix included) for
//! one parameter. The chosen wire types are the widest of each family so a
//! round trip through `SELECT @p` reproduces the value exactly.

use bytes::{BufMut, Bytes, BytesMut};
use tds_wire::typeinfo::{TypeId, TypeInfo};

use crate::decode::{date_to_wire, time_to_wire};
use crate::error::ValueError;
use crate::value::Value;

/// Threshold above which variable values switch to a MAX (PLP) declaration.
const SHORT_LEN_CAP: usize = 8_000;

/// Encode `value` as an RPC parameter.
pub fn encode_param(value: &Value) -> Result<(TypeInfo, Bytes), ValueError> {
    let mut buf = BytesMut::new();
    let info = match value {
        Value::Null => {
            let info = TypeInfo::plain(TypeId::NVarChar, SHORT_LEN_CAP as u32);
            buf.put_u16_le(0xFFFF);
            info
        }
        Value::Bit(v) => {
            buf.put_u8(1);
            buf.put_u8(u8::from(*v));
            TypeInfo::plain(TypeId::BitN, 1)
        }
        Value::TinyInt(v) => {
            buf.put_u8(1);
            buf.put_u8(*v);
            TypeInfo::plain(TypeId::IntN, 1)
        }
        Value::SmallInt(v) => {
            buf.put_u8(2);
            buf.put_i16_le(*v);
            TypeInfo::plain(TypeId::IntN, 2)
        }
        Value::Int(v) => {
            buf.put_u8(4);
            buf.put_i32_le(*v);
            TypeInfo::plain(TypeId::IntN, 4)
        }
        Value::BigInt(v) => {
            buf.put_u8(8);
            buf.put_i64_le(*v);
            TypeInfo::plain(TypeId::IntN, 8)
        }
        Value::Real(v) => {
            buf.put_u8(4);
            buf.put_f32_le(*v);
            TypeInfo::plain(TypeId::FloatN, 4)
        }
        Value::Float(v) => {
            buf.put_u8(8);
            buf.put_f64_le(*v);
            TypeInfo::plain(TypeId::FloatN, 8)
        }
        Value::Decimal(v) => {
            let mantissa = v.mantissa();
            buf.put_u8(17);
            buf.put_u8(u8::from(mantissa >= 0));
            let magnitude = mantissa.unsigned_abs();
            for i in 0..16 {
                buf.put_u8((magnitude >> (8 * i)) as u8);
            }
            TypeInfo {
                precision: 38,
                scale: v.scale() as u8,
                ..TypeInfo::plain(TypeId::NumericN, 17)
            }
        }
        Value::String(s) => return Ok(encode_nvarchar(s)),
        Value::Xml(s) => return Ok(encode_nvarchar(s)),
        #[cfg(feature = "json")]
        Value::Json(v) => return Ok(encode_nvarchar(&v.to_string())),
        Value::Bytes(b) => {
            if b.len() < SHORT_LEN_CAP {
                let info = TypeInfo::plain(TypeId::BigVarBinary, SHORT_LEN_CAP as u32);
                buf.put_u16_le(b.len() as u16);
                buf.put_slice(b);
                info
            } else {
                let info = TypeInfo::plain(TypeId::BigVarBinary, 0xFFFF);
                put_plp(&mut buf, b);
                info
            }
        }
        Value::Guid(v) => {
            buf.put_u8(16);
            buf.put_slice(&v.to_bytes_le());
            TypeInfo::plain(TypeId::Guid, 16)
        }
        Value::Date(v) => {
            buf.put_u8(3);
            buf.put_slice(&date_to_wire(*v));
            TypeInfo::plain(TypeId::Date, 3)
        }
        Value::Time(v) => {
            buf.put_u8(5);
            buf.put_slice(&time_to_wire(*v));
            TypeInfo {
                scale: 7,
                ..TypeInfo::plain(TypeId::Time, 5)
            }
        }
        Value::DateTime(v) => {
            buf.put_u8(8);
            buf.put_slice(&time_to_wire(v.time()));
            buf.put_slice(&date_to_wire(v.date()));
            TypeInfo {
                scale: 7,
                ..TypeInfo::plain(TypeId::DateTime2, 8)
            }
        }
        Value::DateTimeOffset(v) => {
            let utc = v.naive_utc();
            let minutes = (v.offset().local_minus_utc() / 60) as i16;
            buf.put_u8(10);
            buf.put_slice(&time_to_wire(utc.time()));
            buf.put_slice(&date_to_wire(utc.date()));
            buf.put_i16_le(minutes);
            TypeInfo {
                scale: 7,
                ..TypeInfo::plain(TypeId::DateTimeOffset, 10)
            }
        }
    };
    Ok((info, buf.freeze()))
}

fn encode_nvarchar(s: &str) -> (TypeInfo, Bytes) {
    let mut payload = BytesMut::with_capacity(s.len() * 2);
    for unit in s.encode_utf16() {
        payload.put_u16_le(unit);
    }
    let mut buf = BytesMut::with_capacity(payload.len() + 8);
    if payload.len() < SHORT_LEN_CAP {
        let info = TypeInfo::plain(TypeId::NVarChar, SHORT_LEN_CAP as u32);
        buf.put_u16_le(payload.len() as u16);
        buf.put_slice(&payload);
        (info, buf.freeze())
    } else {
        let info = TypeInfo::plain(TypeId::NVarChar, 0xFFFF);
        put_plp(&mut buf, &payload);
        (info, buf.freeze())
    }
}

/// Known-length PLP body: total, one chunk, terminator.
fn put_plp(buf: &mut BytesMut, payload: &[u8]) {
    buf.put_u64_le(payload.len() as u64);
    buf.put_u32_le(payload.len() as u32);
    buf.put_slice(payload);
    buf.put_u32_le(0);
}
