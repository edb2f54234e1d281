//! SQLite data source backed by `rusqlite`.
//!
//! Statements run synchronously on one connection guarded by a mutex. Result
//! rows are buffered into a [`VecCursor`] before the lock is released.

use crate::client::{DataSource, ExecResult, TxResource};
use crate::context::Ctx;
use crate::error::{OrmError, OrmResult};
use crate::row::{RowCursor, VecCursor};
use crate::value::Value;
use rusqlite::Connection;
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Bool(b) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(i64::from(*b))),
            Value::Int(i) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*i)),
            Value::Float(f) => ToSqlOutput::Owned(rusqlite::types::Value::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Bytes(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b.as_slice())),
            Value::Timestamp(ts) => {
                ToSqlOutput::Owned(rusqlite::types::Value::Text(Value::format_timestamp(ts)))
            }
            Value::Json(json) => ToSqlOutput::Owned(rusqlite::types::Value::Text(json.to_string())),
        })
    }
}

impl FromSql for Value {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Int(i),
            ValueRef::Real(r) => Value::Float(r),
            // TEXT is not guaranteed to be valid UTF-8; keep the raw bytes then.
            ValueRef::Text(text) => match std::str::from_utf8(text) {
                Ok(text) => Value::Text(text.to_string()),
                Err(_) => Value::Bytes(text.to_vec()),
            },
            ValueRef::Blob(blob) => Value::Bytes(blob.to_vec()),
        })
    }
}

struct Shared {
    conn: Mutex<Connection>,
    in_transaction: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self) {
        self.in_transaction.store(false, Ordering::SeqCst);
    }
}

/// A SQLite connection usable as a [`DataSource`].
///
/// While a transaction is open, statements must go through the handle passed
/// to the unit of work; this handle refuses them.
#[derive(Clone)]
pub struct SqliteSource {
    shared: Arc<Shared>,
}

impl SqliteSource {
    pub fn open_in_memory() -> OrmResult<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    pub fn open(path: impl AsRef<Path>) -> OrmResult<Self> {
        Ok(Self::from_connection(Connection::open(path)?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            shared: Arc::new(Shared {
                conn: Mutex::new(conn),
                in_transaction: AtomicBool::new(false),
            }),
        }
    }

    /// Run several `;`-separated statements without bindings, e.g. a schema.
    pub fn execute_batch(&self, sql: &str) -> OrmResult<()> {
        self.ensure_idle()?;
        self.shared.lock().execute_batch(sql)?;
        Ok(())
    }

    fn ensure_idle(&self) -> OrmResult<()> {
        if self.shared.in_transaction.load(Ordering::SeqCst) {
            return Err(OrmError::transaction(
                "a transaction is open on this connection; use the transaction handle",
                None,
            ));
        }
        Ok(())
    }
}

fn check(ctx: &Ctx) -> OrmResult<()> {
    ctx.check().map_err(OrmError::execution)
}

fn run_query(conn: &Connection, sql: &str, bindings: &[Value]) -> OrmResult<VecCursor> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();
    let mut rows = stmt.query(rusqlite::params_from_iter(bindings.iter()))?;
    let mut buffered = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(width);
        for index in 0..width {
            values.push(row.get::<_, Value>(index)?);
        }
        buffered.push(values);
    }
    Ok(VecCursor::new(columns, buffered))
}

fn run_execute(conn: &Connection, sql: &str, bindings: &[Value]) -> OrmResult<ExecResult> {
    let affected = conn.execute(sql, rusqlite::params_from_iter(bindings.iter()))?;
    let is_insert = sql
        .trim_start()
        .get(..6)
        .is_some_and(|verb| verb.eq_ignore_ascii_case("insert"));
    Ok(ExecResult {
        last_insert_id: is_insert.then(|| conn.last_insert_rowid()),
        rows_affected: affected as u64,
    })
}

impl DataSource for SqliteSource {
    fn query(&self, ctx: &Ctx, sql: &str, bindings: &[Value]) -> OrmResult<Box<dyn RowCursor>> {
        check(ctx)?;
        self.ensure_idle()?;
        Ok(Box::new(run_query(&self.shared.lock(), sql, bindings)?))
    }

    fn execute(&self, ctx: &Ctx, sql: &str, bindings: &[Value]) -> OrmResult<ExecResult> {
        check(ctx)?;
        self.ensure_idle()?;
        run_execute(&self.shared.lock(), sql, bindings)
    }

    fn supports_transactions(&self) -> bool {
        true
    }

    fn begin(&self, ctx: &Ctx) -> OrmResult<Arc<dyn TxResource>> {
        check(ctx)?;
        if self.shared.in_transaction.swap(true, Ordering::SeqCst) {
            return Err(OrmError::transaction("a transaction is already open", None));
        }
        if let Err(err) = self.shared.lock().execute_batch("BEGIN") {
            self.shared.release();
            return Err(err.into());
        }
        Ok(Arc::new(SqliteTx {
            shared: Arc::clone(&self.shared),
            done: AtomicBool::new(false),
        }))
    }
}

/// An open SQLite transaction. Rolled back on drop if never finished.
struct SqliteTx {
    shared: Arc<Shared>,
    done: AtomicBool,
}

impl SqliteTx {
    fn ensure_open(&self) -> OrmResult<()> {
        if self.done.load(Ordering::SeqCst) {
            return Err(OrmError::transaction("transaction already finished", None));
        }
        Ok(())
    }

    fn finish(&self, statement: &str) -> OrmResult<()> {
        if self.done.swap(true, Ordering::SeqCst) {
            return Err(OrmError::transaction("transaction already finished", None));
        }
        let conn = self.shared.lock();
        let result = conn.execute_batch(statement);
        if result.is_err() && !conn.is_autocommit() {
            // Leave the connection usable for the next transaction.
            let _ = conn.execute_batch("ROLLBACK");
        }
        drop(conn);
        self.shared.release();
        result.map_err(OrmError::from)
    }
}

impl DataSource for SqliteTx {
    fn query(&self, ctx: &Ctx, sql: &str, bindings: &[Value]) -> OrmResult<Box<dyn RowCursor>> {
        check(ctx)?;
        self.ensure_open()?;
        Ok(Box::new(run_query(&self.shared.lock(), sql, bindings)?))
    }

    fn execute(&self, ctx: &Ctx, sql: &str, bindings: &[Value]) -> OrmResult<ExecResult> {
        check(ctx)?;
        self.ensure_open()?;
        run_execute(&self.shared.lock(), sql, bindings)
    }
}

impl TxResource for SqliteTx {
    fn commit(&self, _ctx: &Ctx) -> OrmResult<()> {
        self.finish("COMMIT")
    }

    fn rollback(&self, _ctx: &Ctx) -> OrmResult<()> {
        self.finish("ROLLBACK")
    }
}

impl Drop for SqliteTx {
    fn drop(&mut self) {
        if self.done.load(Ordering::SeqCst) {
            return;
        }
        #[cfg(feature = "tracing")]
        tracing::warn!(target: "qix.tx", "transaction dropped without commit or rollback; rolling back");
        let _ = self.finish("ROLLBACK");
    }
}
