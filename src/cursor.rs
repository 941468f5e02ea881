use crate::error::{Error, Result};
use crate::value::Value;

/// Forward-only, row-at-a-time view over a result set.
///
/// A cursor starts before the first row. [`Cursor::read`] advances it and
/// reports whether a row is available; the accessors then describe that row.
pub trait Cursor {
    /// Number of columns in the result set.
    fn field_count(&self) -> usize;

    /// Column name at `index`, as reported by the data source.
    fn name(&self, index: usize) -> &str;

    /// Value of column `index` on the current row. `Value::Null` when the
    /// cursor is not positioned on a row.
    fn value(&self, index: usize) -> Value;

    fn is_closed(&self) -> bool;

    /// Advance to the next row. Fails with [`Error::CursorClosed`] once closed.
    fn read(&mut self) -> Result<bool>;
}

/// Cursor over rows that are already in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryCursor {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    position: Option<usize>,
    closed: bool,
}

impl MemoryCursor {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Append a row. Missing trailing values read as `Value::Null`.
    pub fn with_row<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.rows.push(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn close(&mut self) {
        self.closed = true;
    }
}

impl Cursor for MemoryCursor {
    fn field_count(&self) -> usize {
        self.columns.len()
    }

    fn name(&self, index: usize) -> &str {
        &self.columns[index]
    }

    fn value(&self, index: usize) -> Value {
        self.position
            .and_then(|row| self.rows.get(row))
            .and_then(|row| row.get(index))
            .cloned()
            .unwrap_or(Value::Null)
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn read(&mut self) -> Result<bool> {
        if self.closed {
            return Err(Error::CursorClosed);
        }
        let next = self.position.map_or(0, |row| row + 1);
        if next < self.rows.len() {
            self.position = Some(next);
            Ok(true)
        } else {
            self.position = Some(self.rows.len());
            Ok(false)
        }
    }
}
