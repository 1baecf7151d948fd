//! Row payload slicing.
//!
//! Turns the bytes following a ROW/NBCROW tag into one optional byte slice
//! per column, guided by the column's TYPE_INFO. Interpretation of the
//! slices (endianness, epochs, charsets) happens a layer up; this module is
//! only concerned with *where each value ends*.

use bytes::Bytes;

use crate::codec::{DecodeFault, DecodeResult, SliceReader};
use crate::error::WireError;
use crate::token::Column;
use crate::typeinfo::{LengthClass, TypeId, TypeInfo};

/// Slice one column value. `None` means SQL NULL.
pub fn read_value(r: &mut SliceReader<'_>, info: &TypeInfo) -> DecodeResult<Option<Bytes>> {
    match info.id.length_class() {
        LengthClass::Fixed(width) => Ok(Some(r.bytes(width)?)),

        LengthClass::ByteLen if info.id == TypeId::Guid => read_guid(r),

        LengthClass::ByteLen => {
            let len = r.u8()?;
            if len == 0 {
                return Ok(None);
            }
            Ok(Some(r.bytes(len as usize)?))
        }

        LengthClass::LegacyByteLen => {
            let len = r.u8()?;
            if len == 0xFF {
                return Ok(None);
            }
            Ok(Some(r.bytes(len as usize)?))
        }

        LengthClass::UShortLen => {
            if info.is_plp() {
                return Ok(r.plp()?);
            }
            let len = r.u16_le()?;
            if len == 0xFFFF {
                return Ok(None);
            }
            Ok(Some(r.bytes(len as usize)?))
        }

        LengthClass::LongLen => {
            // Text pointer, then timestamp, then the 4-byte value length.
            let ptr_len = r.u8()?;
            if ptr_len == 0 {
                return Ok(None);
            }
            r.skip(ptr_len as usize)?;
            r.skip(8)?;
            let len = r.u32_le()?;
            if len == 0xFFFF_FFFF {
                return Ok(None);
            }
            Ok(Some(r.bytes(len as usize)?))
        }

        LengthClass::Plp => Ok(r.plp()?),

        LengthClass::Variant => {
            // Envelope: total length, then base type + its properties + value.
            // 0 observed from catalog views for NULL alongside the documented
            // 0xFFFFFFFF sentinel; both are accepted.
            let total = r.u32_le()?;
            if total == 0 || total == 0xFFFF_FFFF {
                return Ok(None);
            }
            Ok(Some(r.bytes(total as usize)?))
        }
    }
}

/// GUID values: a 0x10 length prefix is the documented form, but a bare
/// 16-byte payload is seen in the wild and accepted with a diagnostic.
fn read_guid(r: &mut SliceReader<'_>) -> DecodeResult<Option<Bytes>> {
    match r.peek_u8()? {
        0x00 | 0xFF => {
            r.skip(1)?;
            Ok(None)
        }
        0x10 => {
            r.skip(1)?;
            Ok(Some(r.bytes(16)?))
        }
        other => {
            tracing::warn!(
                first_byte = other,
                "GUID value without 0x10 length prefix, assuming bare payload"
            );
            Ok(Some(r.bytes(16)?))
        }
    }
}

/// Slice a full ROW: every column in declaration order.
pub fn read_row(r: &mut SliceReader<'_>, columns: &[Column]) -> DecodeResult<Vec<Option<Bytes>>> {
    let mut values = Vec::with_capacity(columns.len());
    for col in columns {
        values.push(read_value(r, &col.type_info)?);
    }
    Ok(values)
}

/// Slice an NBCROW: a leading null bitmap of ⌈N/8⌉ bytes, then values for
/// the non-null columns only. Bit `i % 8` of byte `i / 8` set means column
/// `i` is NULL and contributes no bytes.
pub fn read_nbc_row(
    r: &mut SliceReader<'_>,
    columns: &[Column],
) -> DecodeResult<Vec<Option<Bytes>>> {
    let bitmap = r.take(columns.len().div_ceil(8))?;
    let mut values = Vec::with_capacity(columns.len());
    for (i, col) in columns.iter().enumerate() {
        if bitmap[i / 8] & (1 << (i % 8)) != 0 {
            values.push(None);
        } else {
            values.push(read_value(r, &col.type_info)?);
        }
    }
    Ok(values)
}

/// Variant payload split into base-type info and value bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantValue {
    /// Wire type of the embedded value.
    pub base_type: u8,
    /// Type-specific properties (collation, precision/scale, max length).
    pub properties: Bytes,
    /// The value itself, encoded per the base type.
    pub value: Bytes,
}

impl VariantValue {
    /// Split a SQL_VARIANT payload (the bytes behind its 4-byte envelope).
    pub fn parse(payload: &Bytes) -> Result<Self, WireError> {
        let mut r = SliceReader::new(payload);
        let parse = |r: &mut SliceReader<'_>| -> DecodeResult<VariantValue> {
            let base_type = r.u8()?;
            let prop_len = r.u8()? as usize;
            let properties = r.bytes(prop_len)?;
            let rest = r.remaining();
            let value = r.bytes(rest)?;
            Ok(VariantValue {
                base_type,
                properties,
                value,
            })
        };
        match parse(&mut r) {
            Ok(v) => Ok(v),
            // The envelope length already bounded the payload, so running
            // out of bytes here is structural, not a resumption point.
            Err(DecodeFault::Incomplete) => Err(WireError::Malformed("truncated SQL_VARIANT")),
            Err(DecodeFault::Protocol(e)) => Err(e),
        }
    }
}
