//! Type helper utilities for syn type analysis.

/// Extract `T` from a single-argument generic named `wrapper` (`Option<T>`, `Vec<T>`, `Box<T>`).
///
/// Matches on the last path segment, so `std::option::Option<T>` works too.
fn generic_inner<'a>(ty: &'a syn::Type, wrapper: &str) -> Option<&'a syn::Type> {
    let syn::Type::Path(type_path) = ty else {
        return None;
    };
    let seg = type_path.path.segments.last()?;
    if seg.ident != wrapper {
        return None;
    }
    let syn::PathArguments::AngleBracketed(args) = &seg.arguments else {
        return None;
    };
    if args.args.len() != 1 {
        return None;
    }
    let syn::GenericArgument::Type(inner) = args.args.first()? else {
        return None;
    };
    Some(inner)
}

pub fn option_inner(ty: &syn::Type) -> Option<&syn::Type> {
    generic_inner(ty, "Option")
}

pub fn vec_inner(ty: &syn::Type) -> Option<&syn::Type> {
    generic_inner(ty, "Vec")
}

pub fn box_inner(ty: &syn::Type) -> Option<&syn::Type> {
    generic_inner(ty, "Box")
}

const SCALAR_IDENTS: &[&str] = &[
    "i8", "i16", "i32", "i64", "isize", "u8", "u16", "u32", "u64", "usize", "f32", "f64",
    "bool", "String", "NaiveDateTime", "NaiveDate", "Uuid", "Value",
];

fn last_segment(ty: &syn::Type) -> Option<&syn::PathSegment> {
    let syn::Type::Path(type_path) = ty else {
        return None;
    };
    if type_path.qself.is_some() {
        return None;
    }
    type_path.path.segments.last()
}

fn is_ident_type(ty: &syn::Type, ident: &str) -> bool {
    last_segment(ty).is_some_and(|seg| seg.ident == ident && seg.arguments.is_none())
}

/// Whether a type converts to and from a column value out of the box.
///
/// Covers the idents in `SCALAR_IDENTS`, `DateTime<Utc>`, `Vec<u8>` and
/// `Option` of any of those.
pub fn is_scalar_type(ty: &syn::Type) -> bool {
    if let Some(inner) = option_inner(ty) {
        return is_scalar_type(inner);
    }
    if let Some(inner) = vec_inner(ty) {
        return is_ident_type(inner, "u8");
    }
    let Some(seg) = last_segment(ty) else {
        return false;
    };
    if seg.ident == "DateTime" {
        return generic_inner(ty, "DateTime").is_some_and(|tz| is_ident_type(tz, "Utc"));
    }
    seg.arguments.is_none() && SCALAR_IDENTS.iter().any(|s| seg.ident == s)
}

// A non-generic path that is not a known scalar or wrapper: assumed to be an entity.
fn is_entity_type(ty: &syn::Type) -> bool {
    let Some(seg) = last_segment(ty) else {
        return false;
    };
    seg.arguments.is_none()
        && !SCALAR_IDENTS.iter().any(|s| seg.ident == s)
        && !["Option", "Vec", "Box", "DateTime"].iter().any(|s| seg.ident == s)
}

/// How a single related entity is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OneSlot {
    Plain,
    Optional,
    Boxed,
    OptionalBoxed,
}

/// Syntactic shape of a field type.
#[derive(Clone, Copy)]
pub enum FieldShape<'a> {
    Scalar,
    One { target: &'a syn::Type, slot: OneSlot },
    Many { target: &'a syn::Type, boxed: bool },
}

fn unsupported(ty: &syn::Type) -> syn::Error {
    let ty_str = quote::quote!(#ty).to_string().replace(' ', "");
    syn::Error::new_spanned(
        ty,
        format!(
            "unsupported field type `{ty_str}`: implement `From<T> for qix::Value` and \
             `qix::FromValue` for it and mark the field `#[orm(scalar)]`, or skip it with \
             `#[orm(db = \"-\")]`"
        ),
    )
}

pub fn classify(ty: &syn::Type) -> syn::Result<FieldShape<'_>> {
    if is_scalar_type(ty) {
        return Ok(FieldShape::Scalar);
    }
    if let Some(item) = vec_inner(ty) {
        let (target, boxed) = match box_inner(item) {
            Some(target) => (target, true),
            None => (item, false),
        };
        if !is_entity_type(target) {
            return Err(unsupported(ty));
        }
        return Ok(FieldShape::Many { target, boxed });
    }
    let (inner, optional) = match option_inner(ty) {
        Some(inner) => (inner, true),
        None => (ty, false),
    };
    let (target, boxed) = match box_inner(inner) {
        Some(target) => (target, true),
        None => (inner, false),
    };
    if !is_entity_type(target) {
        return Err(unsupported(ty));
    }
    let slot = match (optional, boxed) {
        (false, false) => OneSlot::Plain,
        (true, false) => OneSlot::Optional,
        (false, true) => OneSlot::Boxed,
        (true, true) => OneSlot::OptionalBoxed,
    };
    Ok(FieldShape::One { target, slot })
}
