//! Column and relation tag grammar.
//!
//! Column tags: `column-name[,flag]*` with flags `pk`, `auto`, `omitempty`,
//! `omit` and `ignore`; a bare `-` ignores the attribute.
//!
//! Relation tags: `kind[,key:value]*` where kind is one of `hasOne`,
//! `hasMany`, `belongsTo`, `manyToMany` and keys are `foreignKey`,
//! `localKey`, `table`, `pivot`, `pivotFk`, `pivotRfk`.

use crate::error::{OrmError, OrmResult};
use heck::ToSnakeCase;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ColumnTag {
    pub column: Option<String>,
    pub primary_key: bool,
    pub auto: bool,
    pub omit_empty: bool,
    pub omit: bool,
    pub ignore: bool,
}

pub(crate) fn parse_column_tag(tag: &str) -> OrmResult<ColumnTag> {
    let tag = tag.trim();
    if tag == "-" {
        return Ok(ColumnTag {
            ignore: true,
            ..ColumnTag::default()
        });
    }

    let mut parts = tag.split(',').map(str::trim);
    let column = parts.next().unwrap_or_default();
    let mut parsed = ColumnTag {
        column: (!column.is_empty()).then(|| column.to_string()),
        ..ColumnTag::default()
    };

    for flag in parts {
        match flag {
            "pk" => parsed.primary_key = true,
            "auto" => parsed.auto = true,
            "omitempty" => parsed.omit_empty = true,
            "omit" => parsed.omit = true,
            "ignore" | "-" => parsed.ignore = true,
            "" => {}
            other => {
                return Err(OrmError::configuration(format!(
                    "unknown column flag '{other}' in tag '{tag}'"
                )));
            }
        }
    }
    Ok(parsed)
}

/// Relation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    HasOne,
    HasMany,
    BelongsTo,
    ManyToMany,
}

impl RelationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RelationKind::HasOne => "hasOne",
            RelationKind::HasMany => "hasMany",
            RelationKind::BelongsTo => "belongsTo",
            RelationKind::ManyToMany => "manyToMany",
        }
    }

    /// Whether the relation attaches at most one related entity.
    pub fn is_to_one(self) -> bool {
        matches!(self, RelationKind::HasOne | RelationKind::BelongsTo)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RelationTag {
    pub kind: RelationKind,
    pub foreign_key: Option<String>,
    pub local_key: Option<String>,
    pub table: Option<String>,
    pub pivot: Option<String>,
    pub pivot_fk: Option<String>,
    pub pivot_rfk: Option<String>,
}

pub(crate) fn parse_relation_tag(tag: &str) -> OrmResult<RelationTag> {
    let mut parts = tag.split(',').map(str::trim);
    let kind = match parts.next().unwrap_or_default().to_ascii_lowercase().as_str() {
        "hasone" => RelationKind::HasOne,
        "hasmany" => RelationKind::HasMany,
        "belongsto" => RelationKind::BelongsTo,
        "manytomany" => RelationKind::ManyToMany,
        "" => {
            return Err(OrmError::configuration(format!(
                "relation tag '{tag}' is missing a relation kind"
            )));
        }
        other => {
            return Err(OrmError::configuration(format!(
                "unknown relation kind '{other}' in tag '{tag}'"
            )));
        }
    };

    let mut parsed = RelationTag {
        kind,
        foreign_key: None,
        local_key: None,
        table: None,
        pivot: None,
        pivot_fk: None,
        pivot_rfk: None,
    };

    for entry in parts.filter(|p| !p.is_empty()) {
        let Some((key, value)) = entry.split_once(':') else {
            return Err(OrmError::configuration(format!(
                "malformed relation option '{entry}' in tag '{tag}', expected key:value"
            )));
        };
        let value = value.trim();
        if value.is_empty() {
            return Err(OrmError::configuration(format!(
                "relation option '{key}' in tag '{tag}' has an empty value"
            )));
        }
        let slot = match key.trim() {
            "foreignKey" => &mut parsed.foreign_key,
            "localKey" => &mut parsed.local_key,
            "table" => &mut parsed.table,
            "pivot" => &mut parsed.pivot,
            "pivotFk" => &mut parsed.pivot_fk,
            "pivotRfk" => &mut parsed.pivot_rfk,
            other => {
                return Err(OrmError::configuration(format!(
                    "unknown relation option '{other}' in tag '{tag}'"
                )));
            }
        };
        *slot = Some(value.to_string());
    }
    Ok(parsed)
}

/// `UserProfile` -> `user_profile`
pub(crate) fn snake(name: &str) -> String {
    name.to_snake_case()
}

/// Naive singular: `categories` -> `category`, `posts` -> `post`.
pub(crate) fn singular(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        format!("{stem}y")
    } else if let Some(stem) = word.strip_suffix('s') {
        stem.to_string()
    } else {
        word.to_string()
    }
}
