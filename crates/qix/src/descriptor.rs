//! Entity descriptors: the resolved column list, table, primary key and
//! relations of one entity type.

use crate::entity::{AttrDecl, AttrShape, EntityDecl, TargetRef};
use crate::error::{OrmError, OrmResult};
use crate::tag::{
    ColumnTag, RelationKind, RelationTag, parse_column_tag, parse_relation_tag, singular, snake,
};

pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// Column flags from the `db` tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldFlags {
    pub primary_key: bool,
    pub auto: bool,
    /// Skip on insert when the value is the zero value.
    pub omit_empty: bool,
    /// Never written.
    pub omit: bool,
}

#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub attr: String,
    pub column: String,
    pub flags: FieldFlags,
    pub relation: Option<RelationDescriptor>,
}

impl FieldDescriptor {
    pub fn is_relation(&self) -> bool {
        self.relation.is_some()
    }
}

/// Join table of a many-to-many relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PivotDescriptor {
    pub table: String,
    /// Pivot column holding the owner key (`pivotFk`).
    pub owner_key: String,
    /// Pivot column holding the target key (`pivotRfk`).
    pub related_key: String,
}

#[derive(Debug, Clone)]
pub struct RelationDescriptor {
    pub kind: RelationKind,
    /// hasOne/hasMany: column on the target. belongsTo: column on the owner.
    /// manyToMany: target column joined to the pivot's related key.
    pub foreign_key: String,
    /// hasOne/hasMany/manyToMany: owner column. belongsTo: column on the target.
    pub local_key: String,
    pub target: TargetRef,
    pub target_table: String,
    pub pivot: Option<PivotDescriptor>,
    /// Derived without a relation tag.
    pub inferred: bool,
    /// Pivot guess recorded for inferred collections. Never used for loading.
    pub suggested_pivot: Option<PivotDescriptor>,
}

#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    name: String,
    table: String,
    primary_key: String,
    fields: Vec<FieldDescriptor>,
}

impl EntityDescriptor {
    /// Build with the default primary key column `id`.
    pub fn build(decl: &EntityDecl) -> OrmResult<Self> {
        Self::build_with_default_key(decl, DEFAULT_PRIMARY_KEY)
    }

    pub fn build_with_default_key(decl: &EntityDecl, default_primary_key: &str) -> OrmResult<Self> {
        let fail = |message: String| OrmError::configuration(format!("entity {}: {message}", decl.name));

        let owner = snake(decl.name);
        let table = decl.table.map(str::to_string).unwrap_or_else(|| owner.clone());

        let mut pending = Vec::with_capacity(decl.attrs.len());
        for attr in &decl.attrs {
            let column = match attr.column_tag {
                Some(tag) => parse_column_tag(tag).map_err(|e| fail(e.to_string()))?,
                None => ColumnTag::default(),
            };
            if column.ignore {
                continue;
            }
            let relation = match (attr.relation_tag, &attr.shape) {
                (Some(tag), AttrShape::Scalar) => {
                    return Err(fail(format!(
                        "relation tag '{tag}' on scalar attribute '{}'",
                        attr.name
                    )));
                }
                (Some(tag), _) => Some(parse_relation_tag(tag).map_err(|e| fail(e.to_string()))?),
                (None, _) => None,
            };
            pending.push((attr, column, relation));
        }

        let pk_columns: Vec<String> = pending
            .iter()
            .filter(|(a, c, _)| c.primary_key && matches!(a.shape, AttrShape::Scalar))
            .map(|(a, c, _)| column_name(a, c))
            .collect();
        let primary_key = match (decl.primary_key, pk_columns.as_slice()) {
            (Some(pk), _) => pk.to_string(),
            (None, [pk]) => pk.clone(),
            (None, []) => default_primary_key.to_string(),
            (None, many) => {
                return Err(fail(format!(
                    "multiple primary key columns ({}) without a primary_key override",
                    many.join(", ")
                )));
            }
        };

        let mut fields = Vec::with_capacity(pending.len());
        for (attr, column, relation) in pending {
            let relation = match attr.shape {
                AttrShape::Scalar => None,
                AttrShape::Entity(target) | AttrShape::Collection(target) => Some(resolve_relation(
                    attr,
                    target,
                    relation,
                    &owner,
                    &table,
                    &primary_key,
                    default_primary_key,
                )?),
            };
            fields.push(FieldDescriptor {
                attr: attr.name.to_string(),
                column: column_name(attr, &column),
                flags: FieldFlags {
                    primary_key: column.primary_key,
                    auto: column.auto,
                    omit_empty: column.omit_empty,
                    omit: column.omit,
                },
                relation,
            });
        }

        let descriptor = Self {
            name: decl.name.to_string(),
            table,
            primary_key,
            fields,
        };
        descriptor.validate().map_err(fail)?;
        Ok(descriptor)
    }

    // Relation key columns that live on the owner must be mapped.
    fn validate(&self) -> Result<(), String> {
        if self.columns().next().is_none() {
            return Err("no mapped columns".to_string());
        }
        for field in &self.fields {
            let Some(rel) = &field.relation else { continue };
            let owner_column = match rel.kind {
                RelationKind::BelongsTo => &rel.foreign_key,
                _ => &rel.local_key,
            };
            if self.attr_for_column(owner_column).is_none() {
                return Err(format!(
                    "relation '{}' uses column '{owner_column}' which no attribute maps",
                    field.attr
                ));
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    /// Scalar (column-backed) fields in declaration order.
    pub fn columns(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| !f.is_relation())
    }

    /// Column of a scalar attribute.
    pub fn column_for(&self, attr: &str) -> Option<&str> {
        self.columns()
            .find(|f| f.attr == attr)
            .map(|f| f.column.as_str())
    }

    /// Attribute mapped to a column.
    pub fn attr_for_column(&self, column: &str) -> Option<&str> {
        self.columns()
            .find(|f| f.column == column)
            .map(|f| f.attr.as_str())
    }

    pub fn field(&self, attr: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.attr == attr)
    }

    /// The field mapped to the primary-key column, if any attribute maps it.
    pub fn primary_key_field(&self) -> Option<&FieldDescriptor> {
        self.columns().find(|f| f.column == self.primary_key)
    }

    /// Relation attribute by case-insensitive name.
    pub fn relation(&self, name: &str) -> OrmResult<(&FieldDescriptor, &RelationDescriptor)> {
        let field = self
            .fields
            .iter()
            .find(|f| f.attr.eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                OrmError::configuration(format!("{} has no relation '{name}'", self.name))
            })?;
        match &field.relation {
            Some(rel) => Ok((field, rel)),
            None => Err(OrmError::configuration(format!(
                "{}.{} is not a relation",
                self.name, field.attr
            ))),
        }
    }

    pub fn relations(&self) -> impl Iterator<Item = (&FieldDescriptor, &RelationDescriptor)> {
        self.fields
            .iter()
            .filter_map(|f| f.relation.as_ref().map(|r| (f, r)))
    }
}

fn column_name(attr: &AttrDecl, tag: &ColumnTag) -> String {
    tag.column.clone().unwrap_or_else(|| snake(attr.name))
}

// Primary key a target declares, read from its column tags only.
fn declared_primary_key(decl: &EntityDecl, default_primary_key: &str) -> String {
    if let Some(pk) = decl.primary_key {
        return pk.to_string();
    }
    decl.attrs
        .iter()
        .filter(|a| matches!(a.shape, AttrShape::Scalar))
        .find_map(|a| {
            let tag = parse_column_tag(a.column_tag?).ok()?;
            tag.primary_key.then(|| column_name(a, &tag))
        })
        .unwrap_or_else(|| default_primary_key.to_string())
}

fn resolve_relation(
    attr: &AttrDecl,
    target: TargetRef,
    tag: Option<RelationTag>,
    owner: &str,
    owner_table: &str,
    owner_pk: &str,
    default_primary_key: &str,
) -> OrmResult<RelationDescriptor> {
    let target_decl = target.declaration();
    let target_snake = snake(target_decl.name);
    let attr_snake = snake(attr.name);
    let is_collection = matches!(attr.shape, AttrShape::Collection(_));

    let Some(tag) = tag else {
        let target_table = target_decl.table.map(str::to_string).unwrap_or(target_snake.clone());
        let inferred = |kind, foreign_key: String, local_key: String| RelationDescriptor {
            kind,
            foreign_key,
            local_key,
            target,
            target_table: target_table.clone(),
            pivot: None,
            inferred: true,
            suggested_pivot: None,
        };
        return Ok(if is_collection {
            let stem = singular(&attr_snake);
            RelationDescriptor {
                suggested_pivot: Some(PivotDescriptor {
                    table: format!("{stem}_{owner}"),
                    owner_key: format!("{stem}_id"),
                    related_key: format!("{owner}_id"),
                }),
                ..inferred(RelationKind::HasMany, format!("{owner}_id"), owner_pk.to_string())
            }
        } else if attr_snake.ends_with(&target_snake) {
            inferred(
                RelationKind::BelongsTo,
                format!("{attr_snake}_id"),
                declared_primary_key(&target_decl, default_primary_key),
            )
        } else {
            inferred(RelationKind::HasOne, format!("{owner}_id"), owner_pk.to_string())
        });
    };

    if tag.kind.is_to_one() == is_collection {
        return Err(OrmError::configuration(format!(
            "{} relation '{}' does not match its attribute shape",
            tag.kind.as_str(),
            attr.name
        )));
    }

    let target_table = tag
        .table
        .clone()
        .or_else(|| target_decl.table.map(str::to_string))
        .unwrap_or(target_snake);

    let (foreign_key, local_key, pivot) = match tag.kind {
        RelationKind::HasOne | RelationKind::HasMany => (
            tag.foreign_key.unwrap_or_else(|| format!("{owner}_id")),
            tag.local_key.unwrap_or_else(|| owner_pk.to_string()),
            None,
        ),
        RelationKind::BelongsTo => (
            tag.foreign_key.unwrap_or_else(|| format!("{attr_snake}_id")),
            tag.local_key
                .unwrap_or_else(|| declared_primary_key(&target_decl, default_primary_key)),
            None,
        ),
        RelationKind::ManyToMany => {
            let pivot_table = tag.pivot.unwrap_or_else(|| {
                let mut tables = [owner_table, target_table.as_str()];
                tables.sort_unstable();
                tables.join("_")
            });
            let pivot = PivotDescriptor {
                table: pivot_table,
                owner_key: tag
                    .pivot_fk
                    .unwrap_or_else(|| format!("{}_id", singular(owner_table))),
                related_key: tag
                    .pivot_rfk
                    .unwrap_or_else(|| format!("{}_id", singular(&target_table))),
            };
            (
                tag.foreign_key
                    .unwrap_or_else(|| declared_primary_key(&target_decl, default_primary_key)),
                tag.local_key.unwrap_or_else(|| owner_pk.to_string()),
                Some(pivot),
            )
        }
    };

    Ok(RelationDescriptor {
        kind: tag.kind,
        foreign_key,
        local_key,
        target,
        target_table,
        pivot,
        inferred: false,
        suggested_pivot: None,
    })
}
