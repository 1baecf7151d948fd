//! Checked conversions from [`Value`] into Rust types.

use bytes::Bytes;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::ValueError;
use crate::value::Value;

/// Types that can be read out of a [`Value`].
///
/// `None` always means SQL NULL; conversions never silently narrow.
pub trait FromValue: Sized {
    /// Convert, returning `None` for NULL.
    fn from_value(value: &Value) -> Result<Option<Self>, ValueError>;
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Option<Self>, ValueError> {
        value.to_bool()
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Option<Self>, ValueError> {
        value.to_i32()
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Option<Self>, ValueError> {
        value.to_i64()
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Option<Self>, ValueError> {
        value.to_f64()
    }
}

impl FromValue for Decimal {
    fn from_value(value: &Value) -> Result<Option<Self>, ValueError> {
        value.to_decimal()
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Option<Self>, ValueError> {
        Ok(value.to_str()?.map(ToOwned::to_owned))
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Option<Self>, ValueError> {
        Ok(value.to_bytes()?.map(<[u8]>::to_vec))
    }
}

impl FromValue for Bytes {
    fn from_value(value: &Value) -> Result<Option<Self>, ValueError> {
        Ok(value.to_bytes()?.map(Bytes::copy_from_slice))
    }
}

impl FromValue for Uuid {
    fn from_value(value: &Value) -> Result<Option<Self>, ValueError> {
        value.to_uuid()
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: &Value) -> Result<Option<Self>, ValueError> {
        value.to_date()
    }
}

impl FromValue for NaiveTime {
    fn from_value(value: &Value) -> Result<Option<Self>, ValueError> {
        match value {
            Value::Null => Ok(None),
            Value::Time(v) => Ok(Some(*v)),
            other => Err(ValueError::TypeMismatch {
                found: other.type_name(),
                requested: "NaiveTime",
            }),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: &Value) -> Result<Option<Self>, ValueError> {
        value.to_datetime()
    }
}

impl FromValue for DateTime<FixedOffset> {
    fn from_value(value: &Value) -> Result<Option<Self>, ValueError> {
        value.to_datetime_offset()
    }
}
