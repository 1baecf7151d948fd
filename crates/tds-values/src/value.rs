//! The typed value sum.

use bytes::Bytes;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::ValueError;

/// Any value SQL Server can place in a column.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// BIT.
    Bit(bool),
    /// TINYINT.
    TinyInt(u8),
    /// SMALLINT.
    SmallInt(i16),
    /// INT.
    Int(i32),
    /// BIGINT.
    BigInt(i64),
    /// REAL.
    Real(f32),
    /// FLOAT.
    Float(f64),
    /// DECIMAL/NUMERIC/MONEY/SMALLMONEY.
    Decimal(Decimal),
    /// Character data of any width.
    String(String),
    /// Binary data of any width.
    Bytes(Bytes),
    /// UNIQUEIDENTIFIER.
    Guid(Uuid),
    /// DATE.
    Date(NaiveDate),
    /// TIME.
    Time(NaiveTime),
    /// DATETIME/SMALLDATETIME/DATETIME2.
    DateTime(NaiveDateTime),
    /// DATETIMEOFFSET.
    DateTimeOffset(DateTime<FixedOffset>),
    /// XML document.
    Xml(String),
    /// JSON document.
    #[cfg(feature = "json")]
    Json(serde_json::Value),
}

impl Value {
    /// SQL type name of this value, for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Bit(_) => "BIT",
            Self::TinyInt(_) => "TINYINT",
            Self::SmallInt(_) => "SMALLINT",
            Self::Int(_) => "INT",
            Self::BigInt(_) => "BIGINT",
            Self::Real(_) => "REAL",
            Self::Float(_) => "FLOAT",
            Self::Decimal(_) => "DECIMAL",
            Self::String(_) => "NVARCHAR",
            Self::Bytes(_) => "VARBINARY",
            Self::Guid(_) => "UNIQUEIDENTIFIER",
            Self::Date(_) => "DATE",
            Self::Time(_) => "TIME",
            Self::DateTime(_) => "DATETIME2",
            Self::DateTimeOffset(_) => "DATETIMEOFFSET",
            Self::Xml(_) => "XML",
            #[cfg(feature = "json")]
            Self::Json(_) => "JSON",
        }
    }

    /// Whether this is SQL NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    fn mismatch(&self, requested: &'static str) -> ValueError {
        ValueError::TypeMismatch {
            found: self.type_name(),
            requested,
        }
    }

    /// Read as `bool`; `None` for NULL.
    pub fn to_bool(&self) -> Result<Option<bool>, ValueError> {
        match self {
            Self::Null => Ok(None),
            Self::Bit(v) => Ok(Some(*v)),
            Self::TinyInt(v) => Ok(Some(*v != 0)),
            other => Err(other.mismatch("bool")),
        }
    }

    /// Read as `i32`, widening smaller integers; `None` for NULL.
    pub fn to_i32(&self) -> Result<Option<i32>, ValueError> {
        match self {
            Self::Null => Ok(None),
            Self::TinyInt(v) => Ok(Some(i32::from(*v))),
            Self::SmallInt(v) => Ok(Some(i32::from(*v))),
            Self::Int(v) => Ok(Some(*v)),
            other => Err(other.mismatch("i32")),
        }
    }

    /// Read as `i64`, widening smaller integers; `None` for NULL.
    pub fn to_i64(&self) -> Result<Option<i64>, ValueError> {
        match self {
            Self::Null => Ok(None),
            Self::TinyInt(v) => Ok(Some(i64::from(*v))),
            Self::SmallInt(v) => Ok(Some(i64::from(*v))),
            Self::Int(v) => Ok(Some(i64::from(*v))),
            Self::BigInt(v) => Ok(Some(*v)),
            other => Err(other.mismatch("i64")),
        }
    }

    /// Read as `f64`, widening REAL; `None` for NULL.
    pub fn to_f64(&self) -> Result<Option<f64>, ValueError> {
        match self {
            Self::Null => Ok(None),
            Self::Real(v) => Ok(Some(f64::from(*v))),
            Self::Float(v) => Ok(Some(*v)),
            other => Err(other.mismatch("f64")),
        }
    }

    /// Read as [`Decimal`]; `None` for NULL.
    pub fn to_decimal(&self) -> Result<Option<Decimal>, ValueError> {
        match self {
            Self::Null => Ok(None),
            Self::Decimal(v) => Ok(Some(*v)),
            Self::TinyInt(v) => Ok(Some(Decimal::from(*v))),
            Self::SmallInt(v) => Ok(Some(Decimal::from(*v))),
            Self::Int(v) => Ok(Some(Decimal::from(*v))),
            Self::BigInt(v) => Ok(Some(Decimal::from(*v))),
            other => Err(other.mismatch("Decimal")),
        }
    }

    /// Borrow as `&str`; `None` for NULL.
    pub fn to_str(&self) -> Result<Option<&str>, ValueError> {
        match self {
            Self::Null => Ok(None),
            Self::String(v) => Ok(Some(v)),
            Self::Xml(v) => Ok(Some(v)),
            other => Err(other.mismatch("str")),
        }
    }

    /// Borrow as raw bytes; `None` for NULL.
    pub fn to_bytes(&self) -> Result<Option<&[u8]>, ValueError> {
        match self {
            Self::Null => Ok(None),
            Self::Bytes(v) => Ok(Some(v)),
            other => Err(other.mismatch("bytes")),
        }
    }

    /// Read as [`Uuid`]; `None` for NULL.
    pub fn to_uuid(&self) -> Result<Option<Uuid>, ValueError> {
        match self {
            Self::Null => Ok(None),
            Self::Guid(v) => Ok(Some(*v)),
            other => Err(other.mismatch("Uuid")),
        }
    }

    /// Read as [`NaiveDate`]; `None` for NULL.
    pub fn to_date(&self) -> Result<Option<NaiveDate>, ValueError> {
        match self {
            Self::Null => Ok(None),
            Self::Date(v) => Ok(Some(*v)),
            Self::DateTime(v) => Ok(Some(v.date())),
            other => Err(other.mismatch("NaiveDate")),
        }
    }

    /// Read as [`NaiveDateTime`]; `None` for NULL.
    pub fn to_datetime(&self) -> Result<Option<NaiveDateTime>, ValueError> {
        match self {
            Self::Null => Ok(None),
            Self::DateTime(v) => Ok(Some(*v)),
            other => Err(other.mismatch("NaiveDateTime")),
        }
    }

    /// Read as an offset-aware instant; `None` for NULL.
    pub fn to_datetime_offset(&self) -> Result<Option<DateTime<FixedOffset>>, ValueError> {
        match self {
            Self::Null => Ok(None),
            Self::DateTimeOffset(v) => Ok(Some(*v)),
            other => Err(other.mismatch("DateTime<FixedOffset>")),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::BigInt(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bit(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Self::Decimal(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Self::Guid(v)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn widening_integer_reads() {
        assert_eq!(Value::TinyInt(7).to_i64().unwrap(), Some(7));
        assert_eq!(Value::SmallInt(-3).to_i32().unwrap(), Some(-3));
        assert_eq!(Value::Int(9).to_i64().unwrap(), Some(9));
    }

    #[test]
    fn null_reads_as_none_everywhere() {
        assert_eq!(Value::Null.to_i32().unwrap(), None);
        assert_eq!(Value::Null.to_str().unwrap(), None);
        assert_eq!(Value::Null.to_uuid().unwrap(), None);
    }

    #[test]
    fn mismatch_is_reported() {
        let err = Value::String("x".into()).to_i32().unwrap_err();
        assert_eq!(
            err,
            ValueError::TypeMismatch {
                found: "NVARCHAR",
                requested: "i32",
            }
        );
    }

    #[test]
    fn narrowing_is_not_implicit() {
        assert!(Value::BigInt(1).to_i32().is_err());
    }
}
