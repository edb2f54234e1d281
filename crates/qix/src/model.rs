//! Typed entity access on top of the query builder.

use crate::builder::{Builder, Record};
use crate::context::Ctx;
use crate::db::Db;
use crate::descriptor::EntityDescriptor;
use crate::eager;
use crate::entity::Entity;
use crate::error::{OrmError, OrmResult};
use crate::tag::{singular, snake};
use crate::value::{FromValue, Value};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

type Customizer = Arc<dyn Fn(Builder) -> Builder + Send + Sync>;

#[derive(Clone)]
struct EagerLoad {
    relation: String,
    customize: Option<Customizer>,
}

/// CRUD, relation loading and transactions for one entity type.
///
/// ```ignore
/// let posts = Model::<Post>::new(&db)?.with(["user", "tags"]);
/// let recent = posts.get(&ctx, posts.query().order_by("id", "DESC").limit(10))?;
/// ```
pub struct Model<T: Entity> {
    db: Db,
    descriptor: Arc<EntityDescriptor>,
    eager: Vec<EagerLoad>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Clone for Model<T> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            descriptor: Arc::clone(&self.descriptor),
            eager: self.eager.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> fmt::Debug for Model<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("entity", &self.descriptor.name())
            .field("table", &self.descriptor.table())
            .field(
                "eager",
                &self.eager.iter().map(|e| e.relation.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl<T: Entity> Model<T> {
    /// Resolve `T` through the handle's registry.
    pub fn new(db: &Db) -> OrmResult<Self> {
        Ok(Self {
            db: db.clone(),
            descriptor: db.registry().get::<T>()?,
            eager: Vec::new(),
            _entity: PhantomData,
        })
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn descriptor(&self) -> &EntityDescriptor {
        &self.descriptor
    }

    /// Override the table for this model only.
    pub fn with_table(mut self, table: &str) -> Self {
        self.descriptor = Arc::new((*self.descriptor).clone().with_table(table));
        self
    }

    /// Override the primary-key column for this model only.
    pub fn with_primary_key(mut self, column: &str) -> Self {
        self.descriptor = Arc::new((*self.descriptor).clone().with_primary_key(column));
        self
    }

    /// A copy of this model bound to another handle, usually a transaction's.
    pub fn with_transaction(&self, db: &Db) -> Self {
        Self {
            db: db.clone(),
            ..self.clone()
        }
    }

    /// A fresh builder on the model's table.
    pub fn query(&self) -> Builder {
        self.db.table(self.descriptor.table())
    }

    // ==================== reads ====================

    /// Run `query`, decode every row and load the registered relations.
    pub fn get(&self, ctx: &Ctx, query: Builder) -> OrmResult<Vec<T>> {
        let rows = query.get(ctx)?;
        let mut items = rows
            .iter()
            .map(|row| T::from_row(row, &self.descriptor))
            .collect::<OrmResult<Vec<T>>>()?;
        self.load_eager(ctx, &mut items)?;
        Ok(items)
    }

    pub fn all(&self, ctx: &Ctx) -> OrmResult<Vec<T>> {
        self.get(ctx, self.query())
    }

    /// Fetch by primary key. Zero rows is [`OrmError::NotFound`].
    pub fn find(&self, ctx: &Ctx, id: impl Into<Value>) -> OrmResult<T> {
        let id = id.into();
        let query = self
            .query()
            .and_where(self.descriptor.primary_key(), "=", id.clone())
            .limit(1);
        self.get(ctx, query)?.into_iter().next().ok_or_else(|| {
            OrmError::not_found(format!(
                "{} with {} = {id}",
                self.descriptor.name(),
                self.descriptor.primary_key()
            ))
        })
    }

    pub fn first(&self, ctx: &Ctx) -> OrmResult<Option<T>> {
        Ok(self.get(ctx, self.query().limit(1))?.into_iter().next())
    }

    pub fn filter(&self, ctx: &Ctx, column: &str, op: &str, value: impl Into<Value>) -> OrmResult<Vec<T>> {
        self.get(ctx, self.query().and_where(column, op, value))
    }

    pub fn count(&self, ctx: &Ctx) -> OrmResult<i64> {
        match self.query().count("*").scalar(ctx)? {
            Some(value) => i64::from_value(&value).map_err(|m| OrmError::mapping("COUNT(*)", m)),
            None => Ok(0),
        }
    }

    // ==================== writes ====================

    /// Insert `entity`. The generated identifier is written back into an
    /// auto primary key and returned.
    pub fn create(&self, ctx: &Ctx, entity: &mut T) -> OrmResult<Option<i64>> {
        let record = self.record(entity, true);
        let id = self.query().insert_get_id(ctx, &record)?;
        if let (Some(id), Some(pk)) = (id, self.descriptor.primary_key_field()) {
            if pk.flags.auto {
                entity.set_attr(&pk.attr, &Value::Int(id))?;
            }
        }
        Ok(id)
    }

    /// Update the row matching `entity`'s primary key. Returns rows affected.
    pub fn update(&self, ctx: &Ctx, entity: &T) -> OrmResult<u64> {
        let pk = self.descriptor.primary_key_field().ok_or_else(|| {
            OrmError::configuration(format!(
                "{} has no attribute for primary key '{}'",
                self.descriptor.name(),
                self.descriptor.primary_key()
            ))
        })?;
        let id = entity
            .get_attr(&pk.attr)
            .filter(|v| !v.is_null())
            .ok_or_else(|| {
                OrmError::configuration(format!("{} has no primary key value", self.descriptor.name()))
            })?;
        self.query()
            .and_where(self.descriptor.primary_key(), "=", id)
            .update(ctx, &self.record(entity, false))
    }

    /// Delete by primary key. Returns rows affected.
    pub fn delete(&self, ctx: &Ctx, id: impl Into<Value>) -> OrmResult<u64> {
        self.query()
            .and_where(self.descriptor.primary_key(), "=", id)
            .delete(ctx)
    }

    // Writable columns: never `omit`, not zero with `omitempty`; inserts skip
    // an auto key and updates skip the key entirely.
    fn record(&self, entity: &T, creating: bool) -> Record {
        let pk = self.descriptor.primary_key();
        let mut record = Record::new();
        for field in self.descriptor.columns() {
            let is_pk = field.column == pk;
            if field.flags.omit || (is_pk && (!creating || field.flags.auto)) {
                continue;
            }
            let value = entity.get_attr(&field.attr).unwrap_or(Value::Null);
            if field.flags.omit_empty && value.is_zero() {
                continue;
            }
            record.push(&field.column, value);
        }
        record
    }

    // ==================== relations ====================

    /// Load `relations` (in order) after every read.
    pub fn with<I, S>(mut self, relations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.eager.extend(relations.into_iter().map(|r| EagerLoad {
            relation: r.into(),
            customize: None,
        }));
        self
    }

    /// Load `relation` after every read, with `f` extending its query.
    pub fn with_query<F>(mut self, relation: &str, f: F) -> Self
    where
        F: Fn(Builder) -> Builder + Send + Sync + 'static,
    {
        self.eager.push(EagerLoad {
            relation: relation.to_string(),
            customize: Some(Arc::new(f)),
        });
        self
    }

    fn load_eager(&self, ctx: &Ctx, items: &mut [T]) -> OrmResult<()> {
        for load in &self.eager {
            match &load.customize {
                Some(f) => {
                    eager::load_relation(&self.db, ctx, &self.descriptor, items, &load.relation, |q| f(q))?
                }
                None => eager::load_relation(&self.db, ctx, &self.descriptor, items, &load.relation, |q| q)?,
            }
        }
        Ok(())
    }

    /// Load a relation into already fetched entities.
    pub fn preload(&self, ctx: &Ctx, items: &mut [T], relation: &str) -> OrmResult<()> {
        eager::load_relation(&self.db, ctx, &self.descriptor, items, relation, |q| q)
    }

    pub fn preload_one(&self, ctx: &Ctx, item: &mut T, relation: &str) -> OrmResult<()> {
        self.preload(ctx, std::slice::from_mut(item), relation)
    }

    pub fn preload_with<F>(&self, ctx: &Ctx, items: &mut [T], relation: &str, f: F) -> OrmResult<()>
    where
        F: FnOnce(Builder) -> Builder,
    {
        eager::load_relation(&self.db, ctx, &self.descriptor, items, relation, f)
    }

    fn key_value(&self, entity: &T, column: &str) -> OrmResult<Value> {
        let attr = self.descriptor.attr_for_column(column).ok_or_else(|| {
            OrmError::configuration(format!("{} has no column '{column}'", self.descriptor.name()))
        })?;
        Ok(entity.get_attr(attr).unwrap_or(Value::Null))
    }

    /// `SELECT * FROM <R table> WHERE foreign_key = ?`, bound to `owner`'s local key.
    ///
    /// Defaults: foreign key `<owner>_id`, local key the owner's primary key.
    pub fn has_one<R: Entity>(
        &self,
        owner: &T,
        foreign_key: Option<&str>,
        local_key: Option<&str>,
    ) -> OrmResult<Builder> {
        let related = self.db.registry().get::<R>()?;
        let foreign_key = foreign_key
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}_id", snake(self.descriptor.name())));
        let value = self.key_value(owner, local_key.unwrap_or(self.descriptor.primary_key()))?;
        Ok(self.db.table(related.table()).and_where(&foreign_key, "=", value))
    }

    pub fn has_many<R: Entity>(
        &self,
        owner: &T,
        foreign_key: Option<&str>,
        local_key: Option<&str>,
    ) -> OrmResult<Builder> {
        self.has_one::<R>(owner, foreign_key, local_key)
    }

    /// `SELECT * FROM <R table> WHERE owner_key = ?`, bound to `owner`'s foreign key.
    ///
    /// Defaults: foreign key `<R>_id`, owner key R's primary key.
    pub fn belongs_to<R: Entity>(
        &self,
        owner: &T,
        foreign_key: Option<&str>,
        owner_key: Option<&str>,
    ) -> OrmResult<Builder> {
        let related = self.db.registry().get::<R>()?;
        let foreign_key = foreign_key
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}_id", snake(related.name())));
        let value = self.key_value(owner, &foreign_key)?;
        Ok(self
            .db
            .table(related.table())
            .and_where(owner_key.unwrap_or(related.primary_key()), "=", value))
    }

    /// Related rows through a pivot table.
    ///
    /// Defaults: pivot is both tables sorted and joined with `_`; pivot keys
    /// are `<singular table>_id` for each side.
    pub fn belongs_to_many<R: Entity>(
        &self,
        owner: &T,
        pivot: Option<&str>,
        foreign_pivot_key: Option<&str>,
        related_pivot_key: Option<&str>,
    ) -> OrmResult<Builder> {
        let related = self.db.registry().get::<R>()?;
        let table = related.table();
        let pivot = pivot.map(str::to_string).unwrap_or_else(|| {
            let mut tables = [self.descriptor.table(), table];
            tables.sort_unstable();
            tables.join("_")
        });
        let foreign_pivot_key = foreign_pivot_key
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}_id", singular(self.descriptor.table())));
        let related_pivot_key = related_pivot_key
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}_id", singular(table)));
        let value = self.key_value(owner, self.descriptor.primary_key())?;
        Ok(self
            .db
            .table(table)
            .join(
                &pivot,
                &format!("{table}.{} = {pivot}.{related_pivot_key}", related.primary_key()),
            )
            .and_where(&format!("{pivot}.{foreign_pivot_key}"), "=", value))
    }

    // ==================== transactions ====================

    /// Run `f` in a transaction (a savepoint when already inside one) with a
    /// model bound to the transactional handle.
    pub fn transaction<R, F>(&self, ctx: &Ctx, f: F) -> OrmResult<R>
    where
        F: FnOnce(&Model<T>) -> OrmResult<R>,
    {
        self.db.transaction(ctx, |tx| f(&self.with_transaction(tx)))
    }
}
