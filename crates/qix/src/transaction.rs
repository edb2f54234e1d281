//! Transactions with savepoint-based nesting.
//!
//! A handle at depth 0 begins a real transaction on its data source. A handle
//! that is already inside one (depth > 0) wraps the unit of work in a
//! savepoint instead, so nested calls compose.

use crate::context::Ctx;
use crate::db::Db;
use crate::error::{OrmError, OrmResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static SAVEPOINT_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_savepoint(prefix: &str) -> String {
    let n = SAVEPOINT_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{n}")
}

impl Db {
    /// Run `f` inside a transaction.
    ///
    /// `f` receives the handle bound to the transaction; use it (not `self`)
    /// for every statement that should be part of the unit of work. On `Ok`
    /// the transaction commits (or the savepoint is released); on `Err` it
    /// rolls back and the original error is returned.
    ///
    /// ```ignore
    /// db.transaction(&ctx, |tx| {
    ///     tx.table("accounts").and_where("id", "=", 1).update(&ctx, &debit)?;
    ///     tx.table("accounts").and_where("id", "=", 2).update(&ctx, &credit)?;
    ///     Ok(())
    /// })?;
    /// ```
    pub fn transaction<T, F>(&self, ctx: &Ctx, f: F) -> OrmResult<T>
    where
        F: FnOnce(&Db) -> OrmResult<T>,
    {
        if self.in_transaction() {
            self.savepoint(ctx, f)
        } else {
            self.top_level(ctx, f)
        }
    }

    fn top_level<T, F>(&self, ctx: &Ctx, f: F) -> OrmResult<T>
    where
        F: FnOnce(&Db) -> OrmResult<T>,
    {
        if !self.source().supports_transactions() {
            return Err(OrmError::capability(
                "data source does not support transactions",
            ));
        }

        let resource = self
            .source()
            .begin(ctx)
            .map_err(|e| OrmError::transaction("failed to begin transaction", Some(e)))?;
        #[cfg(feature = "tracing")]
        tracing::debug!(target: "qix.tx", "begin");

        let tx = self.scoped(resource.clone(), 1);
        match f(&tx) {
            Ok(value) => {
                resource
                    .commit(ctx)
                    .map_err(|e| OrmError::transaction("failed to commit transaction", Some(e)))?;
                #[cfg(feature = "tracing")]
                tracing::debug!(target: "qix.tx", "commit");
                Ok(value)
            }
            Err(err) => match resource.rollback(ctx) {
                Ok(()) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(target: "qix.tx", error = %err, "rollback");
                    Err(err)
                }
                Err(rollback_err) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(target: "qix.tx", error = %err, rollback_error = %rollback_err, "rollback failed");
                    Err(OrmError::rollback_failed(err, rollback_err))
                }
            },
        }
    }

    fn savepoint<T, F>(&self, ctx: &Ctx, f: F) -> OrmResult<T>
    where
        F: FnOnce(&Db) -> OrmResult<T>,
    {
        let name = next_savepoint(&self.config().savepoint_prefix);
        self.execute(ctx, &format!("SAVEPOINT {name}"), &[])
            .map_err(|e| OrmError::transaction(format!("failed to create savepoint {name}"), Some(e)))?;
        #[cfg(feature = "tracing")]
        tracing::debug!(target: "qix.tx", savepoint = %name, depth = self.depth() + 1, "savepoint");

        let nested = self.scoped(Arc::clone(self.source()), self.depth() + 1);
        match f(&nested) {
            Ok(value) => {
                self.execute(ctx, &format!("RELEASE SAVEPOINT {name}"), &[])
                    .map_err(|e| {
                        OrmError::transaction(format!("failed to release savepoint {name}"), Some(e))
                    })?;
                Ok(value)
            }
            Err(err) => match self.execute(ctx, &format!("ROLLBACK TO SAVEPOINT {name}"), &[]) {
                Ok(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(target: "qix.tx", savepoint = %name, error = %err, "rollback to savepoint");
                    Err(err)
                }
                Err(rollback_err) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        target: "qix.tx",
                        savepoint = %name,
                        error = %err,
                        rollback_error = %rollback_err,
                        "rollback to savepoint failed"
                    );
                    Err(OrmError::rollback_failed(err, rollback_err))
                }
            },
        }
    }
}
