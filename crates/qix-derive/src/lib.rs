//! Derive macros for qix
//!
//! Provides `#[derive(Entity)]`.

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod common;
mod entity;

/// Derive `qix::Entity` for a struct with named fields.
///
/// # Example
///
/// ```ignore
/// use qix::Entity;
///
/// #[derive(Debug, Clone, Default, Entity)]
/// #[orm(table = "posts")]
/// struct Post {
///     #[orm(db = "id,pk,auto")]
///     id: i64,
///     user_id: i64,
///     #[orm(rel = "belongsTo,foreignKey:user_id")]
///     user: Option<User>,
///     #[orm(rel = "manyToMany,pivot:post_tags")]
///     tags: Vec<Tag>,
///     #[orm(db = "-")]
///     scratch: String,
/// }
/// ```
///
/// # Attributes
///
/// - `#[orm(table = "name")]` - Table name (defaults to the snake-cased struct name)
/// - `#[orm(primary_key = "col")]` - Primary key column override
/// - `#[orm(db = "column,flags")]` - Column name and flags (`pk`, `auto`, `omitempty`, `omit`, `ignore`)
/// - `#[orm(rel = "kind,key:value")]` - Relation declaration
/// - `#[orm(scalar)]` - Treat a user-defined type as a column value, not a nested entity
///
/// The struct must also implement `Clone` and `Default`. Every type submitted
/// is registered with `qix::Registry::register_all` through `inventory`.
#[proc_macro_derive(Entity, attributes(orm))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    entity::expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
