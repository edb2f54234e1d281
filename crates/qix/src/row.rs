//! Decoded rows and the row-cursor contract.

use crate::error::{OrmError, OrmResult};
use crate::value::{FromValue, Value};
use std::collections::VecDeque;
use std::sync::Arc;

/// A single result row: shared column names plus owned cell values.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Position of a column. Exact matches win over case-insensitive ones.
    pub fn index_of(&self, column: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c == column)
            .or_else(|| self.columns.iter().position(|c| c.eq_ignore_ascii_case(column)))
    }

    pub fn value(&self, column: &str) -> Option<&Value> {
        self.index_of(column).and_then(|i| self.values.get(i))
    }

    pub fn value_at(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Typed access by column name.
    pub fn try_get<T: FromValue>(&self, column: &str) -> OrmResult<T> {
        let value = self
            .value(column)
            .ok_or_else(|| OrmError::mapping(column, "column not present in row"))?;
        T::from_value(value).map_err(|message| OrmError::mapping(column, message))
    }

    /// Typed access by column name; `Ok(None)` when the row has no such column.
    pub fn try_get_if_present<T: FromValue>(&self, column: &str) -> OrmResult<Option<T>> {
        match self.value(column) {
            Some(value) => T::from_value(value)
                .map(Some)
                .map_err(|message| OrmError::mapping(column, message)),
            None => Ok(None),
        }
    }

    /// Typed access by position.
    pub fn try_get_at<T: FromValue>(&self, index: usize) -> OrmResult<T> {
        let value = self
            .value_at(index)
            .ok_or_else(|| OrmError::mapping(index.to_string(), "column index out of range"))?;
        T::from_value(value).map_err(|message| OrmError::mapping(index.to_string(), message))
    }
}

/// Forward-only result cursor produced by a data source.
///
/// Usage mirrors a database driver: `advance()` until it returns `false`,
/// `scan()` the current row, then check `err()` and `close()`.
pub trait RowCursor: Send {
    fn columns(&self) -> &[String];

    /// Move to the next row. Returns `false` when exhausted or failed.
    fn advance(&mut self) -> bool;

    /// Decode the current row.
    fn scan(&self) -> OrmResult<Row>;

    /// Error that ended iteration early, if any.
    fn err(&mut self) -> OrmResult<()>;

    fn close(&mut self) -> OrmResult<()>;
}

/// Drain a cursor into memory, closing it afterwards.
pub fn collect_rows(mut cursor: Box<dyn RowCursor>) -> OrmResult<Vec<Row>> {
    let mut rows = Vec::new();
    while cursor.advance() {
        match cursor.scan() {
            Ok(row) => rows.push(row),
            Err(e) => {
                let _ = cursor.close();
                return Err(e);
            }
        }
    }
    let ended = cursor.err();
    cursor.close()?;
    ended?;
    Ok(rows)
}

/// A cursor over rows that are already in memory.
#[derive(Debug)]
pub struct VecCursor {
    columns: Arc<[String]>,
    pending: VecDeque<Vec<Value>>,
    current: Option<Vec<Value>>,
    closed: bool,
}

impl VecCursor {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns: columns.into(),
            pending: rows.into(),
            current: None,
            closed: false,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}

impl RowCursor for VecCursor {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn advance(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.current = self.pending.pop_front();
        self.current.is_some()
    }

    fn scan(&self) -> OrmResult<Row> {
        let values = self
            .current
            .as_ref()
            .ok_or_else(|| OrmError::configuration("cursor is not positioned on a row"))?;
        Ok(Row::new(Arc::clone(&self.columns), values.clone()))
    }

    fn err(&mut self) -> OrmResult<()> {
        Ok(())
    }

    fn close(&mut self) -> OrmResult<()> {
        self.closed = true;
        self.pending.clear();
        self.current = None;
        Ok(())
    }
}
