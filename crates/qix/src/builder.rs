//! Fluent query builder.
//!
//! Builders accumulate clause state through consuming `mut self -> Self`
//! calls and render deterministic SQL with `?` placeholders.
//!
//! ```ignore
//! use qix::{Ctx, Db};
//!
//! let rows = db
//!     .table("users")
//!     .select(["id", "name"])
//!     .and_where("age", ">", 18)
//!     .order_by("name", "ASC")
//!     .limit(10)
//!     .get(&Ctx::background())?;
//! ```
//!
//! Each clause owns the values it binds; bindings are collected at render
//! time in statement order. Rendering never mutates the builder, so calling
//! [`Builder::build`] twice yields identical text and bindings.

mod predicate;
mod write;

#[cfg(test)]
mod tests;

pub use predicate::Connective;
pub use write::Record;

use predicate::{Predicate, PredicateKind, render_list};

use crate::client::ExecResult;
use crate::context::Ctx;
use crate::db::Db;
use crate::error::{OrmError, OrmResult};
use crate::row::{Row, RowCursor};
use crate::value::Value;

/// Kind of JOIN clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Cross,
}

impl JoinKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER",
            JoinKind::Left => "LEFT",
            JoinKind::Right => "RIGHT",
            JoinKind::Cross => "CROSS",
        }
    }
}

/// Kind of UNION clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnionKind {
    Distinct,
    All,
}

#[derive(Debug, Clone, PartialEq)]
struct Projection {
    sql: String,
    bindings: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
struct Join {
    kind: JoinKind,
    /// Table name or parenthesized sub-statement with alias
    target: String,
    /// Empty means no ON clause
    condition: String,
    bindings: Vec<Value>,
}

/// Start a detached builder on `table`.
///
/// Detached builders render SQL but cannot execute it.
pub fn table(name: &str) -> Builder {
    Builder::detached().table(name)
}

/// SELECT builder with optional write terminals.
#[derive(Debug, Clone)]
pub struct Builder {
    db: Option<Db>,
    table: String,
    projections: Vec<Projection>,
    joins: Vec<Join>,
    wheres: Vec<Predicate>,
    groups: Vec<String>,
    havings: Vec<Predicate>,
    orders: Vec<String>,
    limit: Option<i64>,
    offset: Option<i64>,
    unions: Vec<(UnionKind, Builder)>,
}

impl Builder {
    /// Create a builder bound to a database handle.
    pub fn new(db: &Db) -> Self {
        Self {
            db: Some(db.clone()),
            ..Self::detached()
        }
    }

    /// Create a builder with no database handle.
    pub fn detached() -> Self {
        Self {
            db: None,
            table: String::new(),
            projections: Vec::new(),
            joins: Vec::new(),
            wheres: Vec::new(),
            groups: Vec::new(),
            havings: Vec::new(),
            orders: Vec::new(),
            limit: None,
            offset: None,
            unions: Vec::new(),
        }
    }

    pub fn db(&self) -> Option<&Db> {
        self.db.as_ref()
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Same clauses, different handle.
    pub fn with_db(mut self, db: &Db) -> Self {
        self.db = Some(db.clone());
        self
    }

    fn require_db(&self) -> OrmResult<&Db> {
        self.db
            .as_ref()
            .ok_or_else(|| OrmError::configuration("builder has no database handle"))
    }

    /// Fresh builder for nested callbacks, sharing this builder's handle.
    fn child(&self) -> Builder {
        Builder {
            db: self.db.clone(),
            ..Builder::detached()
        }
    }

    // ==================== FROM / SELECT ====================

    pub fn table(mut self, name: &str) -> Self {
        self.table = name.to_string();
        self
    }

    /// Append projected columns. With no projections the statement selects `*`.
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for column in columns {
            self.projections.push(Projection {
                sql: column.into(),
                bindings: Vec::new(),
            });
        }
        self
    }

    /// Append a raw projection expression with its own bindings.
    pub fn select_raw(mut self, sql: &str, bindings: Vec<Value>) -> Self {
        self.projections.push(Projection {
            sql: sql.to_string(),
            bindings,
        });
        self
    }

    fn aggregate(self, func: &str, column: &str) -> Self {
        self.select([format!("{func}({column})")])
    }

    pub fn count(self, column: &str) -> Self {
        self.aggregate("COUNT", column)
    }

    pub fn max(self, column: &str) -> Self {
        self.aggregate("MAX", column)
    }

    pub fn min(self, column: &str) -> Self {
        self.aggregate("MIN", column)
    }

    pub fn avg(self, column: &str) -> Self {
        self.aggregate("AVG", column)
    }

    pub fn sum(self, column: &str) -> Self {
        self.aggregate("SUM", column)
    }

    /// Project a sub-statement: `(sub) AS alias`.
    pub fn sub_select(mut self, sub: Builder, alias: &str) -> Self {
        let (sql, bindings) = sub.build();
        self.projections.push(Projection {
            sql: format!("({sql}) AS {alias}"),
            bindings,
        });
        self
    }

    // ==================== WHERE ====================

    fn push_where(mut self, predicate: Predicate) -> Self {
        self.wheres.push(predicate);
        self
    }

    /// Add WHERE: `column op ?` joined with AND.
    pub fn and_where(self, column: &str, op: &str, value: impl Into<Value>) -> Self {
        self.push_where(Predicate::and(PredicateKind::Compare {
            column: column.to_string(),
            op: op.to_string(),
            value: value.into(),
        }))
    }

    /// Add WHERE: `column op ?` joined with OR.
    pub fn or_where(self, column: &str, op: &str, value: impl Into<Value>) -> Self {
        self.push_where(Predicate::or(PredicateKind::Compare {
            column: column.to_string(),
            op: op.to_string(),
            value: value.into(),
        }))
    }

    fn membership<I, V>(self, column: &str, negated: bool, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            return self;
        }
        self.push_where(Predicate::and(PredicateKind::In {
            column: column.to_string(),
            negated,
            values,
        }))
    }

    /// Add WHERE: `column IN (?, ...)`. An empty list adds nothing.
    pub fn where_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.membership(column, false, values)
    }

    /// Add WHERE: `column NOT IN (?, ...)`. An empty list adds nothing.
    pub fn where_not_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.membership(column, true, values)
    }

    pub fn where_null(self, column: &str) -> Self {
        self.push_where(Predicate::and(PredicateKind::Null {
            column: column.to_string(),
            negated: false,
        }))
    }

    pub fn where_not_null(self, column: &str) -> Self {
        self.push_where(Predicate::and(PredicateKind::Null {
            column: column.to_string(),
            negated: true,
        }))
    }

    pub fn where_between(self, column: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.push_where(Predicate::and(PredicateKind::Between {
            column: column.to_string(),
            low: low.into(),
            high: high.into(),
        }))
    }

    pub fn where_like(self, column: &str, pattern: &str) -> Self {
        self.and_where(column, "LIKE", pattern)
    }

    /// Add a verbatim predicate. `bindings` must match its placeholders.
    pub fn where_raw(self, sql: &str, bindings: Vec<Value>) -> Self {
        self.push_where(Predicate::and(PredicateKind::Raw {
            sql: sql.to_string(),
            bindings,
        }))
    }

    pub fn or_where_raw(self, sql: &str, bindings: Vec<Value>) -> Self {
        self.push_where(Predicate::or(PredicateKind::Raw {
            sql: sql.to_string(),
            bindings,
        }))
    }

    /// Compare two columns: `left op right`.
    pub fn where_column(self, left: &str, op: &str, right: &str) -> Self {
        self.push_where(Predicate::and(PredicateKind::Columns {
            left: left.to_string(),
            op: op.to_string(),
            right: right.to_string(),
        }))
    }

    pub fn or_where_column(self, left: &str, op: &str, right: &str) -> Self {
        self.push_where(Predicate::or(PredicateKind::Columns {
            left: left.to_string(),
            op: op.to_string(),
            right: right.to_string(),
        }))
    }

    /// `DATE(column) op ?`
    pub fn where_date(self, column: &str, op: &str, value: impl Into<Value>) -> Self {
        self.and_where(&format!("DATE({column})"), op, value)
    }

    /// `YEAR(column) op ?`
    pub fn where_year(self, column: &str, op: &str, value: impl Into<Value>) -> Self {
        self.and_where(&format!("YEAR({column})"), op, value)
    }

    /// `MONTH(column) op ?`
    pub fn where_month(self, column: &str, op: &str, value: impl Into<Value>) -> Self {
        self.and_where(&format!("MONTH({column})"), op, value)
    }

    /// `MONTH(column) IN (?, ...)`
    pub fn where_month_in<I, V>(self, column: &str, months: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.where_in(&format!("MONTH({column})"), months)
    }

    /// `DAY(column) op ?`
    pub fn where_day(self, column: &str, op: &str, value: impl Into<Value>) -> Self {
        self.and_where(&format!("DAY({column})"), op, value)
    }

    /// `EXISTS (sub)`
    pub fn where_exists(self, sub: Builder) -> Self {
        let (sql, bindings) = sub.build();
        self.where_raw(&format!("EXISTS ({sql})"), bindings)
    }

    /// `NOT EXISTS (sub)`
    pub fn where_not_exists(self, sub: Builder) -> Self {
        let (sql, bindings) = sub.build();
        self.where_raw(&format!("NOT EXISTS ({sql})"), bindings)
    }

    /// Merge the predicates built by `f` into this WHERE clause.
    pub fn where_group<F>(mut self, f: F) -> Self
    where
        F: FnOnce(Builder) -> Builder,
    {
        let child = f(self.child());
        self.wheres.extend(child.wheres);
        self
    }

    /// Like [`Builder::where_group`], but the first merged predicate is joined with OR.
    pub fn or_where_group<F>(mut self, f: F) -> Self
    where
        F: FnOnce(Builder) -> Builder,
    {
        let mut merged = f(self.child()).wheres;
        if let Some(first) = merged.first_mut() {
            first.connective = Connective::Or;
        }
        self.wheres.extend(merged);
        self
    }

    /// Wrap the predicates built by `f` in parentheses, joined with AND.
    pub fn where_nested<F>(self, f: F) -> Self
    where
        F: FnOnce(Builder) -> Builder,
    {
        let inner = f(self.child()).wheres;
        if inner.is_empty() {
            return self;
        }
        self.push_where(Predicate::and(PredicateKind::Group(inner)))
    }

    /// Wrap the predicates built by `f` in parentheses, joined with OR.
    pub fn or_where_nested<F>(self, f: F) -> Self
    where
        F: FnOnce(Builder) -> Builder,
    {
        let inner = f(self.child()).wheres;
        if inner.is_empty() {
            return self;
        }
        self.push_where(Predicate::or(PredicateKind::Group(inner)))
    }

    // ==================== JOIN ====================

    fn push_join(mut self, kind: JoinKind, target: String, condition: &str, bindings: Vec<Value>) -> Self {
        self.joins.push(Join {
            kind,
            target,
            condition: condition.to_string(),
            bindings,
        });
        self
    }

    /// Add INNER JOIN.
    pub fn join(self, table: &str, condition: &str) -> Self {
        self.push_join(JoinKind::Inner, table.to_string(), condition, Vec::new())
    }

    /// Add LEFT JOIN.
    pub fn left_join(self, table: &str, condition: &str) -> Self {
        self.push_join(JoinKind::Left, table.to_string(), condition, Vec::new())
    }

    /// Add RIGHT JOIN.
    pub fn right_join(self, table: &str, condition: &str) -> Self {
        self.push_join(JoinKind::Right, table.to_string(), condition, Vec::new())
    }

    /// Add CROSS JOIN (no ON clause).
    pub fn cross_join(self, table: &str) -> Self {
        self.push_join(JoinKind::Cross, table.to_string(), "", Vec::new())
    }

    /// Join a sub-statement: `INNER JOIN (sub) AS alias ON condition`.
    ///
    /// The sub-statement's bindings are placed at the join's position, ahead
    /// of any WHERE bindings, regardless of call order.
    pub fn join_sub(self, sub: Builder, alias: &str, condition: &str) -> Self {
        let (sql, bindings) = sub.build();
        self.push_join(JoinKind::Inner, format!("({sql}) AS {alias}"), condition, bindings)
    }

    /// INNER JOIN whose condition is built by `f`.
    ///
    /// Each predicate becomes one condition term; terms are joined with AND.
    pub fn join_with<F>(self, table: &str, f: F) -> Self
    where
        F: FnOnce(Builder) -> Builder,
    {
        self.join_kind_with(JoinKind::Inner, table, f)
    }

    /// LEFT JOIN whose condition is built by `f`.
    pub fn left_join_with<F>(self, table: &str, f: F) -> Self
    where
        F: FnOnce(Builder) -> Builder,
    {
        self.join_kind_with(JoinKind::Left, table, f)
    }

    fn join_kind_with<F>(self, kind: JoinKind, table: &str, f: F) -> Self
    where
        F: FnOnce(Builder) -> Builder,
    {
        let child = f(self.child());
        let mut terms = Vec::with_capacity(child.wheres.len());
        let mut bindings = Vec::new();
        for predicate in &child.wheres {
            let mut term = String::new();
            predicate.render(&mut term, &mut bindings);
            terms.push(term);
        }
        let condition = terms.join(" AND ");
        self.push_join(kind, table.to_string(), &condition, bindings)
    }

    // ==================== GROUP BY / HAVING ====================

    pub fn group_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Add HAVING: `column op ?` joined with AND.
    pub fn having(mut self, column: &str, op: &str, value: impl Into<Value>) -> Self {
        self.havings.push(Predicate::and(PredicateKind::Compare {
            column: column.to_string(),
            op: op.to_string(),
            value: value.into(),
        }));
        self
    }

    /// Add HAVING: `column op ?` joined with OR.
    pub fn or_having(mut self, column: &str, op: &str, value: impl Into<Value>) -> Self {
        self.havings.push(Predicate::or(PredicateKind::Compare {
            column: column.to_string(),
            op: op.to_string(),
            value: value.into(),
        }));
        self
    }

    pub fn having_raw(mut self, sql: &str, bindings: Vec<Value>) -> Self {
        self.havings.push(Predicate::and(PredicateKind::Raw {
            sql: sql.to_string(),
            bindings,
        }));
        self
    }

    /// Merge the predicates built by `f` into the HAVING clause.
    pub fn having_group<F>(mut self, f: F) -> Self
    where
        F: FnOnce(Builder) -> Builder,
    {
        let child = f(self.child());
        self.havings.extend(child.wheres);
        self
    }

    // ==================== ORDER / LIMIT / UNION ====================

    /// Add ORDER BY `column direction`. An empty direction emits the column alone.
    pub fn order_by(mut self, column: &str, direction: &str) -> Self {
        if direction.is_empty() {
            self.orders.push(column.to_string());
        } else {
            self.orders.push(format!("{column} {direction}"));
        }
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Append `UNION` with another statement.
    ///
    /// Unions attached to `other` are rendered after it, in order.
    pub fn union(mut self, other: Builder) -> Self {
        self.unions.push((UnionKind::Distinct, other));
        self
    }

    /// Append `UNION ALL` with another statement.
    pub fn union_all(mut self, other: Builder) -> Self {
        self.unions.push((UnionKind::All, other));
        self
    }

    // ==================== conditional ====================

    /// Apply `f` only when `condition` holds.
    pub fn when<F>(self, condition: bool, f: F) -> Self
    where
        F: FnOnce(Builder) -> Builder,
    {
        if condition { f(self) } else { self }
    }

    /// Apply `f` only when `condition` does not hold.
    pub fn unless<F>(self, condition: bool, f: F) -> Self
    where
        F: FnOnce(Builder) -> Builder,
    {
        self.when(!condition, f)
    }

    // ==================== rendering ====================

    pub(crate) fn render_where(&self, sql: &mut String, bindings: &mut Vec<Value>) {
        if !self.wheres.is_empty() {
            sql.push_str(" WHERE ");
            render_list(&self.wheres, sql, bindings);
        }
    }

    fn render_base(&self, sql: &mut String, bindings: &mut Vec<Value>) {
        sql.push_str("SELECT ");
        if self.projections.is_empty() {
            sql.push('*');
        } else {
            for (i, projection) in self.projections.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                sql.push_str(&projection.sql);
                bindings.extend(projection.bindings.iter().cloned());
            }
        }

        if !self.table.is_empty() {
            sql.push_str(" FROM ");
            sql.push_str(&self.table);
        }

        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join.kind.as_str());
            sql.push_str(" JOIN ");
            sql.push_str(&join.target);
            if !join.condition.is_empty() {
                sql.push_str(" ON ");
                sql.push_str(&join.condition);
            }
            bindings.extend(join.bindings.iter().cloned());
        }

        self.render_where(sql, bindings);

        if !self.groups.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.groups.join(", "));
        }

        if !self.havings.is_empty() {
            sql.push_str(" HAVING ");
            render_list(&self.havings, sql, bindings);
        }

        if !self.orders.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.orders.join(", "));
        }

        if let Some(limit) = self.limit {
            sql.push_str(" LIMIT ?");
            bindings.push(Value::Int(limit));
        }
        if let Some(offset) = self.offset {
            sql.push_str(" OFFSET ?");
            bindings.push(Value::Int(offset));
        }
    }

    // A child's own unions follow it, so nested unions flatten into one chain.
    fn render_with_unions(&self, sql: &mut String, bindings: &mut Vec<Value>) {
        self.render_base(sql, bindings);
        for (kind, other) in &self.unions {
            sql.push_str(match kind {
                UnionKind::Distinct => " UNION ",
                UnionKind::All => " UNION ALL ",
            });
            other.render_with_unions(sql, bindings);
        }
    }

    /// Render statement text and its ordered bindings.
    pub fn build(&self) -> (String, Vec<Value>) {
        let mut sql = String::new();
        let mut bindings = Vec::new();
        self.render_with_unions(&mut sql, &mut bindings);
        (sql, bindings)
    }

    pub fn to_sql(&self) -> String {
        self.build().0
    }

    pub fn bindings(&self) -> Vec<Value> {
        self.build().1
    }

    /// SQL with bindings interpolated as literals. For logs only.
    pub fn debug_sql(&self) -> String {
        let (sql, bindings) = self.build();
        interpolate(&sql, &bindings)
    }

    // ==================== execution ====================

    /// Run the SELECT and return a row cursor.
    pub fn cursor(&self, ctx: &Ctx) -> OrmResult<Box<dyn RowCursor>> {
        let db = self.require_db()?;
        let (sql, bindings) = self.build();
        db.cursor(ctx, &sql, &bindings)
    }

    /// Run the SELECT and collect every row.
    pub fn get(&self, ctx: &Ctx) -> OrmResult<Vec<Row>> {
        let db = self.require_db()?;
        let (sql, bindings) = self.build();
        db.query(ctx, &sql, &bindings)
    }

    /// Run the SELECT with `LIMIT 1`.
    pub fn first(&self, ctx: &Ctx) -> OrmResult<Option<Row>> {
        let rows = self.clone().limit(1).get(ctx)?;
        Ok(rows.into_iter().next())
    }

    /// First column of the first row, e.g. for aggregates.
    pub fn scalar(&self, ctx: &Ctx) -> OrmResult<Option<Value>> {
        Ok(self
            .first(ctx)?
            .and_then(|row| row.into_values().into_iter().next()))
    }

    /// Run the rendered statement as a non-query.
    pub fn execute(&self, ctx: &Ctx) -> OrmResult<ExecResult> {
        let db = self.require_db()?;
        let (sql, bindings) = self.build();
        db.execute(ctx, &sql, &bindings)
    }

    /// Run `f` inside a transaction with a copy of this builder bound to it.
    pub fn transaction<T, F>(&self, ctx: &Ctx, f: F) -> OrmResult<T>
    where
        F: FnOnce(Builder) -> OrmResult<T>,
    {
        let db = self.require_db()?;
        db.transaction(ctx, |tx| f(self.clone().with_db(tx)))
    }
}

/// Replace placeholders outside string literals with literal values.
fn interpolate(sql: &str, bindings: &[Value]) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut values = bindings.iter();
    let mut in_literal = false;
    for ch in sql.chars() {
        match ch {
            '\'' => {
                in_literal = !in_literal;
                out.push(ch);
            }
            '?' if !in_literal => match values.next() {
                Some(value) => out.push_str(&value.to_string()),
                None => out.push('?'),
            },
            _ => out.push(ch),
        }
    }
    out
}
