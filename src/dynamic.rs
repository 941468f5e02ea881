use crate::cursor::Cursor;
use crate::error::{ConversionError, Error, Result};
use crate::mapper::SkipFields;
use crate::value::{FromValue, Value};
use indexmap::IndexMap;
use serde::Serialize;

/// A result row without a target entity: column names to values, in column
/// order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DynamicRow {
    columns: IndexMap<String, Value>,
}

impl DynamicRow {
    /// Capture the row the cursor is positioned on, leaving out skipped
    /// columns. Two columns with the same name, as in `SELECT a.id, b.id`,
    /// fail with [`Error::DuplicateColumn`]; alias one of them in the query.
    pub fn from_cursor<C: Cursor + ?Sized>(cursor: &C, skip: &SkipFields) -> Result<Self> {
        if cursor.is_closed() {
            return Err(Error::CursorClosed);
        }
        let mut columns = IndexMap::with_capacity(cursor.field_count());
        for index in 0..cursor.field_count() {
            let name = cursor.name(index);
            if skip.contains(&name.to_lowercase()) {
                continue;
            }
            if columns.insert(name.to_string(), cursor.value(index)).is_some() {
                return Err(Error::DuplicateColumn(name.to_string()));
            }
        }
        Ok(Self { columns })
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    /// Decode a column. A missing column decodes like NULL.
    pub fn get_as<T: FromValue>(&self, column: &str) -> Result<T, ConversionError> {
        T::from_value(self.get(column).cloned().unwrap_or(Value::Null))
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl IntoIterator for DynamicRow {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}

/// Read every remaining row of the cursor as a [`DynamicRow`].
pub fn read_dynamic_rows<C: Cursor + ?Sized>(
    cursor: &mut C,
    skip: &SkipFields,
) -> Result<Vec<DynamicRow>> {
    let mut rows = Vec::new();
    while cursor.read()? {
        rows.push(DynamicRow::from_cursor(&*cursor, skip)?);
    }
    Ok(rows)
}
