//! Entity declarations and the runtime entity trait.
//!
//! `#[derive(Entity)]` produces an [`EntityDecl`] (names, tags and attribute
//! shapes) plus typed decode/accessor code. Descriptors are built from the
//! declaration once per entity type and cached in the
//! [`Registry`](crate::Registry).
//!
//! Declarations can also be written by hand:
//!
//! ```ignore
//! impl Entity for Tag {
//!     fn declaration() -> EntityDecl {
//!         EntityDecl::new("Tag")
//!             .attr(AttrDecl::scalar("id").column("id,pk,auto"))
//!             .attr(AttrDecl::scalar("name"))
//!     }
//!     // ...
//! }
//! ```

use crate::descriptor::EntityDescriptor;
use crate::error::{OrmError, OrmResult};
use crate::row::Row;
use crate::value::{FromValue, Value};
use std::any::{Any, TypeId};
use std::fmt;

/// Static declaration of an entity type.
#[derive(Debug, Clone)]
pub struct EntityDecl {
    pub name: &'static str,
    /// Table override; defaults to the snake-cased entity name.
    pub table: Option<&'static str>,
    /// Primary-key column override.
    pub primary_key: Option<&'static str>,
    pub attrs: Vec<AttrDecl>,
}

impl EntityDecl {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            table: None,
            primary_key: None,
            attrs: Vec::new(),
        }
    }

    pub fn table(mut self, table: &'static str) -> Self {
        self.table = Some(table);
        self
    }

    pub fn primary_key(mut self, column: &'static str) -> Self {
        self.primary_key = Some(column);
        self
    }

    pub fn attr(mut self, attr: AttrDecl) -> Self {
        self.attrs.push(attr);
        self
    }
}

/// One declared attribute with its raw tags.
#[derive(Debug, Clone)]
pub struct AttrDecl {
    pub name: &'static str,
    pub column_tag: Option<&'static str>,
    pub relation_tag: Option<&'static str>,
    pub shape: AttrShape,
}

impl AttrDecl {
    pub fn scalar(name: &'static str) -> Self {
        Self::with_shape(name, AttrShape::Scalar)
    }

    /// A nested single entity (`T`, `Option<T>`, `Box<T>`, `Option<Box<T>>`).
    pub fn entity(name: &'static str, target: TargetRef) -> Self {
        Self::with_shape(name, AttrShape::Entity(target))
    }

    /// A collection of entities (`Vec<T>`, `Vec<Box<T>>`).
    pub fn collection(name: &'static str, target: TargetRef) -> Self {
        Self::with_shape(name, AttrShape::Collection(target))
    }

    fn with_shape(name: &'static str, shape: AttrShape) -> Self {
        Self {
            name,
            column_tag: None,
            relation_tag: None,
            shape,
        }
    }

    pub fn column(mut self, tag: &'static str) -> Self {
        self.column_tag = Some(tag);
        self
    }

    pub fn relation(mut self, tag: &'static str) -> Self {
        self.relation_tag = Some(tag);
        self
    }
}

/// Declared shape of an attribute.
#[derive(Debug, Clone, Copy)]
pub enum AttrShape {
    Scalar,
    Entity(TargetRef),
    Collection(TargetRef),
}

/// Type-erased handle to a related entity type.
#[derive(Clone, Copy)]
pub struct TargetRef {
    type_name: &'static str,
    type_id: fn() -> TypeId,
    declaration: fn() -> EntityDecl,
    decode: fn(&Row, &EntityDescriptor) -> OrmResult<Box<dyn AnyEntity>>,
}

impl TargetRef {
    pub fn of<T: Entity>() -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            type_id: TypeId::of::<T>,
            declaration: T::declaration,
            decode: decode_boxed::<T>,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn type_id(&self) -> TypeId {
        (self.type_id)()
    }

    pub fn declaration(&self) -> EntityDecl {
        (self.declaration)()
    }

    /// Decode one row into a boxed instance of the target type.
    pub fn decode(&self, row: &Row, descriptor: &EntityDescriptor) -> OrmResult<Box<dyn AnyEntity>> {
        (self.decode)(row, descriptor)
    }
}

impl fmt::Debug for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TargetRef").field(&self.type_name).finish()
    }
}

fn decode_boxed<T: Entity>(row: &Row, descriptor: &EntityDescriptor) -> OrmResult<Box<dyn AnyEntity>> {
    Ok(Box::new(T::from_row(row, descriptor)?))
}

/// A mapped entity type. Usually implemented with `#[derive(Entity)]`.
pub trait Entity: Any + Clone + Default + Send + Sync {
    fn declaration() -> EntityDecl;

    /// Decode a row. Columns absent from the row leave the attribute at its default.
    fn from_row(row: &Row, descriptor: &EntityDescriptor) -> OrmResult<Self>;

    /// Read a scalar attribute. `None` for unknown or relation attributes.
    fn get_attr(&self, attr: &str) -> Option<Value>;

    /// Write a scalar attribute.
    fn set_attr(&mut self, attr: &str, value: &Value) -> OrmResult<()>;

    /// Attach loaded related entities to a relation attribute.
    fn attach(&mut self, attr: &str, related: Related) -> OrmResult<()>;
}

/// Object-safe view of an entity, used to carry related rows between types.
pub trait AnyEntity: Any + Send + Sync {
    fn clone_entity(&self) -> Box<dyn AnyEntity>;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;

    fn as_any(&self) -> &dyn Any;
}

impl<T: Entity> AnyEntity for T {
    fn clone_entity(&self) -> Box<dyn AnyEntity> {
        Box::new(self.clone())
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Clone for Box<dyn AnyEntity> {
    fn clone(&self) -> Self {
        (**self).clone_entity()
    }
}

/// Related entities produced by eager loading.
#[derive(Clone)]
pub enum Related {
    One(Option<Box<dyn AnyEntity>>),
    Many(Vec<Box<dyn AnyEntity>>),
}

impl fmt::Debug for Related {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Related::One(one) => f.debug_tuple("One").field(&one.is_some()).finish(),
            Related::Many(many) => f.debug_tuple("Many").field(&many.len()).finish(),
        }
    }
}

fn downcast<T: Entity>(attr: &str, entity: Box<dyn AnyEntity>) -> OrmResult<T> {
    entity.into_any().downcast::<T>().map(|b| *b).map_err(|_| {
        OrmError::mapping(
            attr,
            format!("related entity is not a {}", std::any::type_name::<T>()),
        )
    })
}

fn expected_one(attr: &str) -> OrmError {
    OrmError::mapping(attr, "expected a single related entity, got a collection")
}

fn expected_many(attr: &str) -> OrmError {
    OrmError::mapping(attr, "expected a collection of related entities, got a single value")
}

// Slot adapters called from derived `attach` implementations, one per
// supported attribute representation.

/// `T`: assigned on match, otherwise left at its current value.
pub fn assign_one<T: Entity>(slot: &mut T, attr: &str, related: Related) -> OrmResult<()> {
    match related {
        Related::One(Some(entity)) => *slot = downcast(attr, entity)?,
        Related::One(None) => {}
        Related::Many(_) => return Err(expected_one(attr)),
    }
    Ok(())
}

/// `Option<T>`: `None` when nothing matched.
pub fn assign_optional<T: Entity>(slot: &mut Option<T>, attr: &str, related: Related) -> OrmResult<()> {
    match related {
        Related::One(entity) => *slot = entity.map(|e| downcast(attr, e)).transpose()?,
        Related::Many(_) => return Err(expected_one(attr)),
    }
    Ok(())
}

/// `Box<T>`: assigned on match, otherwise left at its current value.
pub fn assign_boxed<T: Entity>(slot: &mut Box<T>, attr: &str, related: Related) -> OrmResult<()> {
    match related {
        Related::One(Some(entity)) => *slot = Box::new(downcast(attr, entity)?),
        Related::One(None) => {}
        Related::Many(_) => return Err(expected_one(attr)),
    }
    Ok(())
}

/// `Option<Box<T>>`: `None` when nothing matched.
pub fn assign_optional_boxed<T: Entity>(
    slot: &mut Option<Box<T>>,
    attr: &str,
    related: Related,
) -> OrmResult<()> {
    match related {
        Related::One(entity) => {
            *slot = entity.map(|e| downcast(attr, e).map(Box::new)).transpose()?;
        }
        Related::Many(_) => return Err(expected_one(attr)),
    }
    Ok(())
}

/// `Vec<T>`: always replaced, empty when nothing matched.
pub fn assign_many<T: Entity>(slot: &mut Vec<T>, attr: &str, related: Related) -> OrmResult<()> {
    match related {
        Related::Many(items) => {
            *slot = items
                .into_iter()
                .map(|e| downcast(attr, e))
                .collect::<OrmResult<Vec<T>>>()?;
        }
        Related::One(_) => return Err(expected_many(attr)),
    }
    Ok(())
}

/// `Vec<Box<T>>`: always replaced, empty when nothing matched.
pub fn assign_many_boxed<T: Entity>(slot: &mut Vec<Box<T>>, attr: &str, related: Related) -> OrmResult<()> {
    match related {
        Related::Many(items) => {
            *slot = items
                .into_iter()
                .map(|e| downcast(attr, e).map(Box::new))
                .collect::<OrmResult<Vec<Box<T>>>>()?;
        }
        Related::One(_) => return Err(expected_many(attr)),
    }
    Ok(())
}

/// Decode one attribute from a row into `slot`, if the row has its column.
pub fn decode_attr<T: FromValue>(
    row: &Row,
    descriptor: &EntityDescriptor,
    attr: &str,
    slot: &mut T,
) -> OrmResult<()> {
    let Some(column) = descriptor.column_for(attr) else {
        return Ok(());
    };
    if let Some(value) = row.try_get_if_present::<T>(column)? {
        *slot = value;
    }
    Ok(())
}

/// Convert and store a value into a scalar attribute.
pub fn assign_attr<T: FromValue>(slot: &mut T, attr: &str, value: &Value) -> OrmResult<()> {
    *slot = T::from_value(value).map_err(|message| OrmError::mapping(attr, message))?;
    Ok(())
}

/// Error for attribute names an entity does not declare.
pub fn unknown_attr(entity: &str, attr: &str) -> OrmError {
    OrmError::configuration(format!("{entity} has no attribute '{attr}'"))
}
