//! Descriptor cache keyed by entity type.

use crate::descriptor::{DEFAULT_PRIMARY_KEY, EntityDescriptor};
use crate::entity::{Entity, TargetRef};
use crate::error::OrmResult;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

/// Submitted by `#[derive(Entity)]` so [`Registry::register_all`] can find every entity.
pub struct EntityRegistration {
    pub name: &'static str,
    pub register_fn: fn(&Registry) -> OrmResult<()>,
}

inventory::collect!(EntityRegistration);

/// Maps entity types to their descriptors, building each one on first use.
#[derive(Debug)]
pub struct Registry {
    descriptors: RwLock<HashMap<TypeId, Arc<EntityDescriptor>>>,
    default_primary_key: String,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            descriptors: RwLock::new(HashMap::new()),
            default_primary_key: DEFAULT_PRIMARY_KEY.to_string(),
        }
    }

    /// Primary key column assumed for entities without a `pk` flag.
    pub fn with_default_primary_key(mut self, column: impl Into<String>) -> Self {
        self.default_primary_key = column.into();
        self
    }

    /// The process-wide registry used by handles that were not given one.
    pub fn global() -> Arc<Registry> {
        static GLOBAL: OnceLock<Arc<Registry>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Registry::new())))
    }

    pub fn default_primary_key(&self) -> &str {
        &self.default_primary_key
    }

    /// Descriptor for `T`, built and cached on first request.
    pub fn get<T: Entity>(&self) -> OrmResult<Arc<EntityDescriptor>> {
        self.resolve(&TargetRef::of::<T>())
    }

    /// Build and cache `T` now, surfacing declaration errors early.
    pub fn register<T: Entity>(&self) -> OrmResult<Arc<EntityDescriptor>> {
        self.get::<T>()
    }

    pub fn resolve(&self, target: &TargetRef) -> OrmResult<Arc<EntityDescriptor>> {
        let key = target.type_id();
        if let Some(found) = self
            .descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(Arc::clone(found));
        }

        let mut map = self.descriptors.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(found) = map.get(&key) {
            return Ok(Arc::clone(found));
        }
        let descriptor = Arc::new(EntityDescriptor::build_with_default_key(
            &target.declaration(),
            &self.default_primary_key,
        )?);
        map.insert(key, Arc::clone(&descriptor));

        #[cfg(feature = "tracing")]
        tracing::debug!(
            target: "qix.registry",
            entity = descriptor.name(),
            table = descriptor.table(),
            "registered entity"
        );

        Ok(descriptor)
    }

    /// Register every entity submitted through `inventory`. Returns how many were registered.
    pub fn register_all(&self) -> OrmResult<usize> {
        let mut count = 0;
        for registration in inventory::iter::<EntityRegistration> {
            (registration.register_fn)(self)?;
            count += 1;
        }
        Ok(count)
    }

    pub fn contains<T: Entity>(&self) -> bool {
        self.descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.descriptors.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
