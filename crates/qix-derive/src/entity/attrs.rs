//! Attribute parsing for the Entity derive macro.
//!
//! Handles struct-level and field-level `#[orm(...)]` attributes.

use syn::{Attribute, Result};

/// One `key = "value"` or bare `key` entry.
struct OrmEntry {
    key: syn::Ident,
    value: Option<syn::LitStr>,
}

/// Comma-separated `#[orm(...)]` entries.
struct OrmArgs(Vec<OrmEntry>);

impl syn::parse::Parse for OrmArgs {
    fn parse(input: syn::parse::ParseStream) -> Result<Self> {
        let mut entries = Vec::new();
        while !input.is_empty() {
            let key: syn::Ident = input.parse()?;
            let value = if input.peek(syn::Token![=]) {
                let _: syn::Token![=] = input.parse()?;
                Some(input.parse::<syn::LitStr>()?)
            } else {
                None
            };
            entries.push(OrmEntry { key, value });

            if input.peek(syn::Token![,]) {
                let _: syn::Token![,] = input.parse()?;
            } else {
                break;
            }
        }
        Ok(OrmArgs(entries))
    }
}

fn orm_entries(attrs: &[Attribute]) -> Result<Vec<OrmEntry>> {
    let mut entries = Vec::new();
    for attr in attrs.iter().filter(|a| a.path().is_ident("orm")) {
        entries.extend(attr.parse_args::<OrmArgs>()?.0);
    }
    Ok(entries)
}

fn string_value(entry: &OrmEntry) -> Result<String> {
    match &entry.value {
        Some(lit) => Ok(lit.value()),
        None => Err(syn::Error::new_spanned(
            &entry.key,
            format!("`{}` expects a string value", entry.key),
        )),
    }
}

/// Struct-level attributes.
#[derive(Default)]
pub(super) struct StructAttr {
    pub table: Option<String>,
    pub primary_key: Option<String>,
}

pub(super) fn parse_struct_attrs(attrs: &[Attribute]) -> Result<StructAttr> {
    let mut parsed = StructAttr::default();
    for entry in orm_entries(attrs)? {
        if entry.key == "table" {
            parsed.table = Some(string_value(&entry)?);
        } else if entry.key == "primary_key" {
            parsed.primary_key = Some(string_value(&entry)?);
        } else {
            return Err(syn::Error::new_spanned(
                &entry.key,
                format!("unknown struct attribute `{}`", entry.key),
            ));
        }
    }
    Ok(parsed)
}

/// Field-level attributes.
#[derive(Default)]
pub(super) struct FieldAttr {
    /// Raw column tag.
    pub db: Option<String>,
    /// Raw relation tag.
    pub rel: Option<String>,
    pub scalar: bool,
}

impl FieldAttr {
    /// `db = "-"` or an `ignore` flag.
    pub fn is_ignored(&self) -> bool {
        let Some(db) = &self.db else {
            return false;
        };
        let mut parts = db.split(',').map(str::trim);
        let column = parts.next().unwrap_or_default();
        column == "-" || parts.any(|flag| flag == "ignore" || flag == "-")
    }
}

pub(super) fn parse_field_attrs(field: &syn::Field) -> Result<FieldAttr> {
    let mut parsed = FieldAttr::default();
    for entry in orm_entries(&field.attrs)? {
        if entry.key == "db" {
            parsed.db = Some(string_value(&entry)?);
        } else if entry.key == "rel" {
            parsed.rel = Some(string_value(&entry)?);
        } else if entry.key == "scalar" && entry.value.is_none() {
            parsed.scalar = true;
        } else {
            return Err(syn::Error::new_spanned(
                &entry.key,
                format!("unknown field attribute `{}`", entry.key),
            ));
        }
    }
    Ok(parsed)
}
