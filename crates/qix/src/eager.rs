//! Batched relation loading: one extra query per relation, whatever the
//! number of parents.

use crate::builder::Builder;
use crate::context::Ctx;
use crate::db::Db;
use crate::descriptor::{EntityDescriptor, RelationDescriptor};
use crate::entity::{AnyEntity, Entity, Related};
use crate::error::{OrmError, OrmResult};
use crate::tag::RelationKind;
use crate::value::Value;
use std::collections::{HashMap, HashSet};

/// Load `relation` for every parent and attach the results.
///
/// `customize` can extend the relation query (extra predicates, ordering).
/// An empty key set issues no query.
pub(crate) fn load_relation<T, F>(
    db: &Db,
    ctx: &Ctx,
    owner: &EntityDescriptor,
    parents: &mut [T],
    relation: &str,
    customize: F,
) -> OrmResult<()>
where
    T: Entity,
    F: FnOnce(Builder) -> Builder,
{
    let (field, rel) = owner.relation(relation)?;
    let target = db.registry().resolve(&rel.target)?;

    let key_column = match rel.kind {
        RelationKind::BelongsTo => &rel.foreign_key,
        _ => &rel.local_key,
    };
    let key_attr = owner.attr_for_column(key_column).ok_or_else(|| {
        OrmError::configuration(format!(
            "{}.{}: key column '{key_column}' is not mapped",
            owner.name(),
            field.attr
        ))
    })?;

    let keys = collect_keys(parents, key_attr);
    if keys.is_empty() {
        return Ok(());
    }
    let key_count = keys.len();

    let (query, group_column) = relation_query(db, rel, keys)?;
    let rows = customize(query).get(ctx)?;

    #[cfg(feature = "tracing")]
    tracing::debug!(
        target: "qix.eager",
        relation = %field.attr,
        kind = rel.kind.as_str(),
        keys = key_count,
        rows = rows.len(),
        "loaded relation"
    );
    #[cfg(not(feature = "tracing"))]
    let _ = key_count;

    let mut groups: HashMap<Value, Vec<Box<dyn AnyEntity>>> = HashMap::new();
    for row in &rows {
        let key: Value = row.try_get(&group_column)?;
        if key.is_null() {
            continue;
        }
        let entity = rel.target.decode(row, &target)?;
        groups.entry(key).or_default().push(entity);
    }

    for parent in parents.iter_mut() {
        let matched = parent.get_attr(key_attr).and_then(|key| groups.get(&key));
        let related = if rel.kind.is_to_one() {
            Related::One(matched.and_then(|group| group.first().cloned()))
        } else {
            Related::Many(matched.cloned().unwrap_or_default())
        };
        parent.attach(&field.attr, related)?;
    }
    Ok(())
}

// Non-null key values in first-seen order, without duplicates.
fn collect_keys<T: Entity>(parents: &[T], attr: &str) -> Vec<Value> {
    let mut seen = HashSet::new();
    parents
        .iter()
        .filter_map(|parent| parent.get_attr(attr))
        .filter(|key| !key.is_null() && seen.insert(key.clone()))
        .collect()
}

// The single query for a relation and the row column that holds each row's group key.
fn relation_query(db: &Db, rel: &RelationDescriptor, keys: Vec<Value>) -> OrmResult<(Builder, String)> {
    let table = &rel.target_table;
    Ok(match rel.kind {
        RelationKind::HasOne | RelationKind::HasMany => (
            db.table(table).where_in(&rel.foreign_key, keys),
            rel.foreign_key.clone(),
        ),
        RelationKind::BelongsTo => (
            db.table(table).where_in(&rel.local_key, keys),
            rel.local_key.clone(),
        ),
        RelationKind::ManyToMany => {
            let pivot = rel.pivot.as_ref().ok_or_else(|| {
                OrmError::configuration(format!("many-to-many relation on {table} has no pivot"))
            })?;
            let alias = format!("pivot_{}", pivot.owner_key);
            let query = db
                .table(table)
                .select_raw(
                    &format!("{table}.*, {}.{} AS {alias}", pivot.table, pivot.owner_key),
                    Vec::new(),
                )
                .join(
                    &pivot.table,
                    &format!("{table}.{} = {}.{}", rel.foreign_key, pivot.table, pivot.related_key),
                )
                .where_in(&format!("{}.{}", pivot.table, pivot.owner_key), keys);
            (query, alias)
        }
    })
}
