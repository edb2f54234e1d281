//! INSERT / UPDATE / DELETE terminals.

use super::Builder;
use super::predicate::placeholders;
use crate::client::ExecResult;
use crate::context::Ctx;
use crate::error::{OrmError, OrmResult};
use crate::value::Value;

/// Ordered column/value pairs for write statements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    entries: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column, replacing any earlier value for it.
    pub fn set(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.push(column, value);
        self
    }

    pub fn push(&mut self, column: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(c, _)| c == column) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((column.to_string(), value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.entries.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(c, _)| c.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(c, v)| (c.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (column, value) in iter {
            let column: String = column.into();
            record.push(&column, value);
        }
        record
    }
}

impl Builder {
    /// `INSERT INTO table (cols) VALUES (?, ...)`
    pub fn insert_sql(&self, record: &Record) -> (String, Vec<Value>) {
        let columns: Vec<&str> = record.columns().collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            columns.join(", "),
            placeholders(columns.len())
        );
        (sql, record.iter().map(|(_, v)| v.clone()).collect())
    }

    /// `UPDATE table SET col = ?, ... [WHERE ...]`
    pub fn update_sql(&self, record: &Record) -> (String, Vec<Value>) {
        let sets: Vec<String> = record.columns().map(|c| format!("{c} = ?")).collect();
        let mut sql = format!("UPDATE {} SET {}", self.table, sets.join(", "));
        let mut bindings: Vec<Value> = record.iter().map(|(_, v)| v.clone()).collect();
        self.render_where(&mut sql, &mut bindings);
        (sql, bindings)
    }

    /// `DELETE FROM table [WHERE ...]`
    pub fn delete_sql(&self) -> (String, Vec<Value>) {
        let mut sql = format!("DELETE FROM {}", self.table);
        let mut bindings = Vec::new();
        self.render_where(&mut sql, &mut bindings);
        (sql, bindings)
    }

    /// Multi-row INSERT. Columns come from the first record; absent cells bind NULL.
    pub fn batch_insert_sql(&self, records: &[Record]) -> Option<(String, Vec<Value>)> {
        let first = records.first()?;
        let columns: Vec<&str> = first.columns().collect();
        let row = format!("({})", placeholders(columns.len()));
        let mut bindings = Vec::with_capacity(columns.len() * records.len());
        for record in records {
            for column in &columns {
                bindings.push(record.get(column).cloned().unwrap_or(Value::Null));
            }
        }
        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.table,
            columns.join(", "),
            vec![row; records.len()].join(", ")
        );
        Some((sql, bindings))
    }

    /// Multi-row UPDATE keyed by `key`, one `CASE` per non-key column.
    pub fn bulk_update_sql(&self, records: &[Record], key: &str) -> OrmResult<Option<(String, Vec<Value>)>> {
        let Some(first) = records.first() else {
            return Ok(None);
        };
        let keys = records
            .iter()
            .map(|r| {
                r.get(key)
                    .cloned()
                    .ok_or_else(|| OrmError::configuration(format!("bulk update row is missing key column '{key}'")))
            })
            .collect::<OrmResult<Vec<Value>>>()?;

        let mut sets = Vec::new();
        let mut bindings = Vec::new();
        for column in first.columns().filter(|c| *c != key) {
            let mut case = format!("{column} = CASE {key}");
            for (record, key_value) in records.iter().zip(&keys) {
                case.push_str(" WHEN ? THEN ?");
                bindings.push(key_value.clone());
                bindings.push(record.get(column).cloned().unwrap_or(Value::Null));
            }
            case.push_str(" END");
            sets.push(case);
        }
        if sets.is_empty() {
            return Err(OrmError::configuration("bulk update has no columns besides the key"));
        }

        let sql = format!(
            "UPDATE {} SET {} WHERE {key} IN ({})",
            self.table,
            sets.join(", "),
            placeholders(keys.len())
        );
        bindings.extend(keys);
        Ok(Some((sql, bindings)))
    }

    /// Run an INSERT.
    pub fn insert(&self, ctx: &Ctx, record: &Record) -> OrmResult<ExecResult> {
        let db = self.require_db()?;
        let (sql, bindings) = self.insert_sql(record);
        db.execute(ctx, &sql, &bindings)
    }

    /// Run an INSERT and return the identifier the data source generated.
    pub fn insert_get_id(&self, ctx: &Ctx, record: &Record) -> OrmResult<Option<i64>> {
        Ok(self.insert(ctx, record)?.last_insert_id)
    }

    /// Run an UPDATE restricted by this builder's WHERE clause. Returns rows affected.
    pub fn update(&self, ctx: &Ctx, record: &Record) -> OrmResult<u64> {
        let db = self.require_db()?;
        if record.is_empty() {
            return Err(OrmError::configuration("update requires at least one column"));
        }
        let (sql, bindings) = self.update_sql(record);
        Ok(db.execute(ctx, &sql, &bindings)?.rows_affected)
    }

    /// Run a DELETE restricted by this builder's WHERE clause. Returns rows affected.
    pub fn delete(&self, ctx: &Ctx) -> OrmResult<u64> {
        let db = self.require_db()?;
        let (sql, bindings) = self.delete_sql();
        Ok(db.execute(ctx, &sql, &bindings)?.rows_affected)
    }

    /// Insert many rows in one statement. An empty slice does nothing.
    pub fn batch_insert(&self, ctx: &Ctx, records: &[Record]) -> OrmResult<ExecResult> {
        let db = self.require_db()?;
        match self.batch_insert_sql(records) {
            Some((sql, bindings)) => db.execute(ctx, &sql, &bindings),
            None => Ok(ExecResult::default()),
        }
    }

    /// Update many rows in one statement. An empty slice does nothing.
    pub fn bulk_update(&self, ctx: &Ctx, records: &[Record], key: &str) -> OrmResult<u64> {
        let db = self.require_db()?;
        match self.bulk_update_sql(records, key)? {
            Some((sql, bindings)) => Ok(db.execute(ctx, &sql, &bindings)?.rows_affected),
            None => Ok(0),
        }
    }
}
