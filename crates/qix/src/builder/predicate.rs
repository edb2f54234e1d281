//! WHERE/HAVING predicates and their rendering.
//!
//! Every predicate owns the values it binds. Rendering appends SQL and
//! bindings side by side, so placeholder order always matches binding order.

use crate::value::Value;

/// Boolean connective placed before a predicate (ignored for the first one).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connective {
    And,
    Or,
}

impl Connective {
    pub fn as_str(self) -> &'static str {
        match self {
            Connective::And => "AND",
            Connective::Or => "OR",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PredicateKind {
    /// `column op ?`
    Compare { column: String, op: String, value: Value },
    /// `left op right`, no placeholder
    Columns { left: String, op: String, right: String },
    /// `column [NOT] IN (?, ?, ...)`
    In { column: String, negated: bool, values: Vec<Value> },
    /// `column IS [NOT] NULL`
    Null { column: String, negated: bool },
    /// `column BETWEEN ? AND ?`
    Between { column: String, low: Value, high: Value },
    /// Verbatim SQL with its own bindings
    Raw { sql: String, bindings: Vec<Value> },
    /// Parenthesized group
    Group(Vec<Predicate>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Predicate {
    pub connective: Connective,
    pub kind: PredicateKind,
}

impl Predicate {
    pub fn and(kind: PredicateKind) -> Self {
        Self {
            connective: Connective::And,
            kind,
        }
    }

    pub fn or(kind: PredicateKind) -> Self {
        Self {
            connective: Connective::Or,
            kind,
        }
    }

    pub fn render(&self, sql: &mut String, bindings: &mut Vec<Value>) {
        match &self.kind {
            PredicateKind::Compare { column, op, value } => {
                sql.push_str(column);
                sql.push(' ');
                sql.push_str(op);
                sql.push_str(" ?");
                bindings.push(value.clone());
            }
            PredicateKind::Columns { left, op, right } => {
                sql.push_str(left);
                sql.push(' ');
                sql.push_str(op);
                sql.push(' ');
                sql.push_str(right);
            }
            PredicateKind::In {
                column,
                negated,
                values,
            } => {
                sql.push_str(column);
                sql.push_str(if *negated { " NOT IN (" } else { " IN (" });
                sql.push_str(&placeholders(values.len()));
                sql.push(')');
                bindings.extend(values.iter().cloned());
            }
            PredicateKind::Null { column, negated } => {
                sql.push_str(column);
                sql.push_str(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }
            PredicateKind::Between { column, low, high } => {
                sql.push_str(column);
                sql.push_str(" BETWEEN ? AND ?");
                bindings.push(low.clone());
                bindings.push(high.clone());
            }
            PredicateKind::Raw { sql: raw, bindings: own } => {
                sql.push_str(raw);
                bindings.extend(own.iter().cloned());
            }
            PredicateKind::Group(inner) => {
                sql.push('(');
                render_list(inner, sql, bindings);
                sql.push(')');
            }
        }
    }
}

/// Render predicates left to right with connectives between consecutive items.
pub(crate) fn render_list(predicates: &[Predicate], sql: &mut String, bindings: &mut Vec<Value>) {
    for (i, predicate) in predicates.iter().enumerate() {
        if i > 0 {
            sql.push(' ');
            sql.push_str(predicate.connective.as_str());
            sql.push(' ');
        }
        predicate.render(sql, bindings);
    }
}

/// `?, ?, ?`
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}
