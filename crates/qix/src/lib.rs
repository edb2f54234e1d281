//! # qix
//!
//! A fluent SQL query builder and a small relation-aware ORM on top of it.
//!
//! ## Features
//!
//! - **Deterministic SQL**: builders render `?`-placeholder SQL plus an ordered binding list
//! - **Pluggable data sources**: anything implementing [`DataSource`] can run statements
//! - **Declarative entities**: `#[derive(Entity)]` with `db` and `rel` tags
//! - **Batched eager loading**: one extra query per relation, however many parents
//! - **Nested transactions**: inner scopes become savepoints
//!
//! ## Query builder
//!
//! ```ignore
//! use qix::prelude::*;
//!
//! let (sql, bindings) = qix::table("users")
//!     .select(["id", "name"])
//!     .and_where("age", ">", 18)
//!     .order_by("name", "ASC")
//!     .build();
//! assert_eq!(sql, "SELECT id, name FROM users WHERE age > ? ORDER BY name ASC");
//! ```
//!
//! ## Models
//!
//! ```ignore
//! #[derive(Debug, Clone, Default, Entity)]
//! #[orm(table = "posts")]
//! struct Post {
//!     #[orm(db = "id,pk,auto")]
//!     id: i64,
//!     user_id: i64,
//!     #[orm(rel = "belongsTo,foreignKey:user_id")]
//!     user: Option<User>,
//! }
//!
//! let db = Db::new(SqliteSource::open_in_memory()?);
//! let posts = Model::<Post>::new(&db)?.with(["user"]);
//! let post = posts.find(&Ctx::background(), 1)?;
//! ```

pub mod builder;
pub mod client;
pub mod config;
pub mod context;
pub mod db;
pub mod descriptor;
pub mod entity;
pub mod error;
pub mod model;
pub mod prelude;
pub mod registry;
pub mod row;
pub mod value;

mod eager;
mod tag;
mod transaction;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(test)]
mod testing;

pub use builder::{Builder, Connective, JoinKind, Record, UnionKind, table};
pub use client::{DataSource, ExecResult, TxResource};
pub use config::Config;
pub use context::{ContextError, Ctx};
pub use db::Db;
pub use descriptor::{EntityDescriptor, FieldDescriptor, FieldFlags, PivotDescriptor, RelationDescriptor};
pub use entity::{AnyEntity, AttrDecl, AttrShape, Entity, EntityDecl, Related, TargetRef};
pub use error::{BoxError, OrmError, OrmResult};
pub use model::Model;
pub use registry::{EntityRegistration, Registry};
pub use row::{Row, RowCursor, VecCursor, collect_rows};
pub use tag::RelationKind;
pub use value::{FromValue, Value};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteSource;

#[cfg(feature = "derive")]
pub use qix_derive::Entity;

// Re-export inventory for use by derive macros
pub use inventory;
