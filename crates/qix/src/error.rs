//! Error types for qix

use thiserror::Error;

/// Boxed error produced by a data source.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for qix operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for query building, mapping and execution
#[derive(Debug, Error)]
pub enum OrmError {
    /// Misdeclared entity, malformed tag, unknown relation or missing handle
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Failure reported by the data source, passed through unchanged
    #[error("{0}")]
    Execution(#[source] BoxError),

    /// Begin/commit/savepoint failure
    #[error("Transaction error: {message}")]
    Transaction {
        message: String,
        #[source]
        source: Option<Box<OrmError>>,
    },

    /// The unit of work failed and so did the rollback that followed it
    #[error("{original} (rollback failed: {rollback})")]
    RollbackFailed {
        original: Box<OrmError>,
        rollback: Box<OrmError>,
    },

    /// The data source cannot run transactions
    #[error("Capability error: {0}")]
    Capability(String),

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Row-to-entity decode or relation slot adaptation error
    #[error("Mapping error on '{column}': {message}")]
    Mapping { column: String, message: String },
}

impl OrmError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a mapping error for a specific column or attribute
    pub fn mapping(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Mapping {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a capability error
    pub fn capability(message: impl Into<String>) -> Self {
        Self::Capability(message.into())
    }

    /// Wrap any data-source error
    pub fn execution<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Execution(Box::new(err))
    }

    /// Create a transaction error, optionally wrapping its cause
    pub fn transaction(message: impl Into<String>, source: Option<OrmError>) -> Self {
        Self::Transaction {
            message: message.into(),
            source: source.map(Box::new),
        }
    }

    /// Combine the error that triggered a rollback with the rollback failure.
    pub fn rollback_failed(original: OrmError, rollback: OrmError) -> Self {
        Self::RollbackFailed {
            original: Box::new(original),
            rollback: Box::new(rollback),
        }
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is a configuration error
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Check if this is a mapping error
    pub fn is_mapping(&self) -> bool {
        matches!(self, Self::Mapping { .. })
    }

    /// Check if this is a capability error
    pub fn is_capability(&self) -> bool {
        matches!(self, Self::Capability(_))
    }

    /// Check if this is a transaction error (including failed rollbacks)
    pub fn is_transaction(&self) -> bool {
        matches!(self, Self::Transaction { .. } | Self::RollbackFailed { .. })
    }

    /// The error that triggered a failed rollback, or `self` for every other variant.
    pub fn original(&self) -> &OrmError {
        match self {
            Self::RollbackFailed { original, .. } => original.original(),
            other => other,
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for OrmError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Execution(Box::new(err))
    }
}
