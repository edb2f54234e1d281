//! Handle-level configuration.

use serde::{Deserialize, Serialize};

/// Configuration carried by a [`Db`](crate::Db) handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Prefix for generated savepoint names (`{prefix}_{n}`).
    pub savepoint_prefix: String,
    /// Truncate logged SQL (in bytes). `None` means no truncation.
    pub max_sql_log_length: Option<usize>,
    /// Whether statement logs include the bound values.
    pub log_bindings: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            savepoint_prefix: "qix_sp".to_string(),
            max_sql_log_length: Some(200),
            log_bindings: false,
        }
    }
}

impl Config {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the savepoint name prefix.
    pub fn savepoint_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.savepoint_prefix = prefix.into();
        self
    }

    /// Set maximum SQL length to log.
    pub fn max_sql_log_length(mut self, len: usize) -> Self {
        self.max_sql_log_length = Some(len);
        self
    }

    /// Disable SQL truncation in logs.
    pub fn no_truncate(mut self) -> Self {
        self.max_sql_log_length = None;
        self
    }

    /// Include bound values in statement logs.
    pub fn log_bindings(mut self, enabled: bool) -> Self {
        self.log_bindings = enabled;
        self
    }

    pub(crate) fn truncate_sql<'a>(&self, sql: &'a str) -> std::borrow::Cow<'a, str> {
        match self.max_sql_log_length {
            Some(max) if sql.len() > max => {
                let mut end = max;
                while !sql.is_char_boundary(end) {
                    end -= 1;
                }
                std::borrow::Cow::Owned(format!("{}...", &sql[..end]))
            }
            _ => std::borrow::Cow::Borrowed(sql),
        }
    }
}
