//! Convenient imports for typical `qix` usage.
//!
//! ```ignore
//! use qix::prelude::*;
//! ```

pub use crate::{Builder, Ctx, Db, Entity, Model, OrmError, OrmResult, Record, Value, table};

#[cfg(feature = "sqlite")]
pub use crate::SqliteSource;
