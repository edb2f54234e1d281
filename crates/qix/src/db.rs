//! The database handle shared by builders and models.

use crate::builder::Builder;
use crate::client::{DataSource, ExecResult};
use crate::config::Config;
use crate::context::Ctx;
use crate::error::OrmResult;
use crate::registry::Registry;
use crate::row::{Row, RowCursor, collect_rows};
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// Cheaply cloneable handle: a data source plus the registry and config used with it.
///
/// A handle also records its transaction depth. Depth 0 means "not in a
/// transaction"; [`Db::transaction`] hands the unit of work a scoped handle
/// one level deeper, bound to the transactional resource.
#[derive(Clone)]
pub struct Db {
    source: Arc<dyn DataSource>,
    registry: Arc<Registry>,
    config: Arc<Config>,
    depth: u32,
}

impl fmt::Debug for Db {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Db")
            .field("depth", &self.depth)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Db {
    /// Wrap a data source, using the process-wide registry and default config.
    pub fn new(source: impl DataSource + 'static) -> Self {
        Self::from_arc(Arc::new(source))
    }

    pub fn from_arc(source: Arc<dyn DataSource>) -> Self {
        Self {
            source,
            registry: Registry::global(),
            config: Arc::new(Config::default()),
            depth: 0,
        }
    }

    /// Use an injected registry instead of the process-wide one.
    pub fn with_registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Arc::new(config);
        self
    }

    pub fn source(&self) -> &Arc<dyn DataSource> {
        &self.source
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Transaction nesting depth of this handle.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn in_transaction(&self) -> bool {
        self.depth > 0
    }

    /// Start a query builder bound to this handle.
    pub fn table(&self, name: &str) -> Builder {
        Builder::new(self).table(name)
    }

    /// A handle bound to `source` at `depth`, sharing registry and config.
    pub(crate) fn scoped(&self, source: Arc<dyn DataSource>, depth: u32) -> Db {
        Db {
            source,
            registry: Arc::clone(&self.registry),
            config: Arc::clone(&self.config),
            depth,
        }
    }

    /// Run a statement and return a cursor over its rows.
    pub fn cursor(&self, ctx: &Ctx, sql: &str, bindings: &[Value]) -> OrmResult<Box<dyn RowCursor>> {
        self.log_statement("query", sql, bindings);
        self.source.query(ctx, sql, bindings)
    }

    /// Run a statement and collect every row.
    pub fn query(&self, ctx: &Ctx, sql: &str, bindings: &[Value]) -> OrmResult<Vec<Row>> {
        collect_rows(self.cursor(ctx, sql, bindings)?)
    }

    /// Run a statement that returns no rows.
    pub fn execute(&self, ctx: &Ctx, sql: &str, bindings: &[Value]) -> OrmResult<ExecResult> {
        self.log_statement("execute", sql, bindings);
        self.source.execute(ctx, sql, bindings)
    }

    #[cfg(feature = "tracing")]
    fn log_statement(&self, kind: &str, sql: &str, bindings: &[Value]) {
        let sql = self.config.truncate_sql(sql);
        if self.config.log_bindings {
            tracing::debug!(
                target: "qix.sql",
                kind,
                depth = self.depth,
                param_count = bindings.len(),
                bindings = ?bindings,
                sql = %sql,
            );
        } else {
            tracing::debug!(
                target: "qix.sql",
                kind,
                depth = self.depth,
                param_count = bindings.len(),
                sql = %sql,
            );
        }
    }

    #[cfg(not(feature = "tracing"))]
    fn log_statement(&self, _kind: &str, _sql: &str, _bindings: &[Value]) {}
}
