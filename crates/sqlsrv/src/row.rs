//! Materialised rows with typed accessors.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use tds_values::{FromValue, Value, decode_value};
use tds_wire::Column;
use uuid::Uuid;

use crate::error::{Error, Result};

/// A row bound to the schema of its result set.
///
/// Values are kept in wire form and decoded on access, so untouched
/// columns cost nothing beyond their bytes.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<[Column]>,
    values: Vec<Option<Bytes>>,
}

/// Column lookup by ordinal or by name.
pub trait RowIndex {
    /// Resolve to an ordinal within `columns`.
    fn resolve(&self, columns: &[Column]) -> Option<usize>;
}

impl RowIndex for usize {
    fn resolve(&self, columns: &[Column]) -> Option<usize> {
        (*self < columns.len()).then_some(*self)
    }
}

impl RowIndex for &str {
    fn resolve(&self, columns: &[Column]) -> Option<usize> {
        columns.iter().position(|c| c.name == *self)
    }
}

impl Row {
    pub(crate) fn new(columns: Arc<[Column]>, values: Vec<Option<Bytes>>) -> Self {
        Self { columns, values }
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The schema this row belongs to.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Decode one column into a [`Value`].
    pub fn value(&self, index: impl RowIndex) -> Result<Value> {
        let ordinal = index
            .resolve(&self.columns)
            .ok_or_else(|| Error::Config("no such column".into()))?;
        let column = &self.columns[ordinal];
        Ok(decode_value(
            self.values[ordinal].as_ref(),
            &column.type_info,
        )?)
    }

    /// Decode one column into `T`; `None` for NULL.
    pub fn get<T: FromValue>(&self, index: impl RowIndex) -> Result<Option<T>> {
        Ok(T::from_value(&self.value(index)?)?)
    }

    /// `bool` accessor.
    pub fn get_bool(&self, index: impl RowIndex) -> Result<Option<bool>> {
        self.get(index)
    }

    /// `i32` accessor, widening narrower integers.
    pub fn get_i32(&self, index: impl RowIndex) -> Result<Option<i32>> {
        self.get(index)
    }

    /// `i64` accessor, widening narrower integers.
    pub fn get_i64(&self, index: impl RowIndex) -> Result<Option<i64>> {
        self.get(index)
    }

    /// `f64` accessor.
    pub fn get_f64(&self, index: impl RowIndex) -> Result<Option<f64>> {
        self.get(index)
    }

    /// DECIMAL/NUMERIC/MONEY accessor.
    pub fn get_decimal(&self, index: impl RowIndex) -> Result<Option<Decimal>> {
        self.get(index)
    }

    /// Character-data accessor; charset conversion already applied.
    pub fn get_string(&self, index: impl RowIndex) -> Result<Option<String>> {
        self.get(index)
    }

    /// Binary accessor.
    pub fn get_bytes(&self, index: impl RowIndex) -> Result<Option<Bytes>> {
        self.get(index)
    }

    /// UNIQUEIDENTIFIER accessor.
    pub fn get_uuid(&self, index: impl RowIndex) -> Result<Option<Uuid>> {
        self.get(index)
    }

    /// DATE accessor.
    pub fn get_date(&self, index: impl RowIndex) -> Result<Option<NaiveDate>> {
        self.get(index)
    }

    /// DATETIME/DATETIME2 accessor.
    pub fn get_datetime(&self, index: impl RowIndex) -> Result<Option<NaiveDateTime>> {
        self.get(index)
    }

    /// DATETIMEOFFSET accessor.
    pub fn get_datetime_offset(
        &self,
        index: impl RowIndex,
    ) -> Result<Option<DateTime<FixedOffset>>> {
        self.get(index)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tds_wire::typeinfo::{TypeId, TypeInfo};
    use tds_wire::ColumnFlags;

    fn row() -> Row {
        let columns: Arc<[Column]> = vec![
            Column {
                name: "id".into(),
                user_type: 0,
                flags: ColumnFlags::empty(),
                type_info: TypeInfo::plain(TypeId::Int, 4),
                table: None,
            },
            Column {
                name: "label".into(),
                user_type: 0,
                flags: ColumnFlags::NULLABLE,
                type_info: TypeInfo::plain(TypeId::NVarChar, 100),
                table: None,
            },
        ]
        .into();
        Row::new(
            columns,
            vec![
                Some(Bytes::from_static(&[7, 0, 0, 0])),
                Some(Bytes::from_static(&[b'o', 0, b'k', 0])),
            ],
        )
    }

    #[test]
    fn access_by_ordinal_and_name() {
        let row = row();
        assert_eq!(row.get_i32(0).unwrap(), Some(7));
        assert_eq!(row.get_i32("id").unwrap(), Some(7));
        assert_eq!(row.get_string("label").unwrap(), Some("ok".into()));
    }

    #[test]
    fn unknown_column_is_an_error() {
        assert!(row().get_i32("missing").is_err());
    }

    #[test]
    fn null_reads_as_none() {
        let mut row = row();
        row.values[1] = None;
        assert_eq!(row.get_string("label").unwrap(), None);
    }

    #[test]
    fn wrong_type_is_an_error() {
        assert!(row().get_i32("label").is_err());
    }
}
