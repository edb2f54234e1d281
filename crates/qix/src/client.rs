//! Data-source contract.
//!
//! The query layer never talks to a database directly. Anything that can run a
//! statement with `?` placeholders implements [`DataSource`]; sources that can
//! open transactions additionally hand out [`TxResource`]s.

use crate::context::Ctx;
use crate::error::{OrmError, OrmResult};
use crate::row::RowCursor;
use crate::value::Value;
use std::sync::Arc;

/// Outcome of a statement that returns no rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// Identifier generated by an INSERT, when the source reports one.
    pub last_insert_id: Option<i64>,
    pub rows_affected: u64,
}

/// A trait that unifies connections and transactions.
///
/// Implementations must return their own errors unchanged (wrapped in
/// [`OrmError::Execution`]); the query layer passes them through as-is.
pub trait DataSource: Send + Sync {
    /// Run a statement and return a cursor over its rows.
    fn query(&self, ctx: &Ctx, sql: &str, bindings: &[Value]) -> OrmResult<Box<dyn RowCursor>>;

    /// Run a statement that returns no rows.
    fn execute(&self, ctx: &Ctx, sql: &str, bindings: &[Value]) -> OrmResult<ExecResult>;

    /// Whether [`DataSource::begin`] can succeed.
    fn supports_transactions(&self) -> bool {
        false
    }

    /// Open a transaction.
    ///
    /// The default implementation reports a capability error.
    fn begin(&self, ctx: &Ctx) -> OrmResult<Arc<dyn TxResource>> {
        let _ = ctx;
        Err(OrmError::capability("data source does not support transactions"))
    }
}

/// An open transaction. After `commit` or `rollback` it refuses further statements.
pub trait TxResource: DataSource {
    fn commit(&self, ctx: &Ctx) -> OrmResult<()>;

    fn rollback(&self, ctx: &Ctx) -> OrmResult<()>;
}

impl<S: DataSource + ?Sized> DataSource for Arc<S> {
    fn query(&self, ctx: &Ctx, sql: &str, bindings: &[Value]) -> OrmResult<Box<dyn RowCursor>> {
        (**self).query(ctx, sql, bindings)
    }

    fn execute(&self, ctx: &Ctx, sql: &str, bindings: &[Value]) -> OrmResult<ExecResult> {
        (**self).execute(ctx, sql, bindings)
    }

    fn supports_transactions(&self) -> bool {
        (**self).supports_transactions()
    }

    fn begin(&self, ctx: &Ctx) -> OrmResult<Arc<dyn TxResource>> {
        (**self).begin(ctx)
    }
}
