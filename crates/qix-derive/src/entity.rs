//! Entity derive macro implementation.

mod attrs;

use crate::common::syn_types::{FieldShape, OneSlot, classify};
use attrs::{FieldAttr, parse_field_attrs, parse_struct_attrs};
use proc_macro2::TokenStream;
use quote::quote;
use syn::ext::IdentExt;
use syn::{Data, DeriveInput, Fields, Result};

struct EntityField<'a> {
    ident: &'a syn::Ident,
    name: String,
    attr: FieldAttr,
    shape: FieldShape<'a>,
}

pub fn expand(input: DeriveInput) -> Result<TokenStream> {
    let name = &input.ident;
    let name_str = name.to_string();

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Entity cannot be derived for generic structs",
        ));
    }

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input,
                    "Entity can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input,
                "Entity can only be derived for structs",
            ));
        }
    };

    let struct_attr = parse_struct_attrs(&input.attrs)?;

    let mut entity_fields = Vec::with_capacity(fields.len());
    for field in fields {
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        let attr = parse_field_attrs(field)?;
        let shape = if attr.scalar || attr.is_ignored() {
            FieldShape::Scalar
        } else {
            classify(&field.ty)?
        };
        if matches!(shape, FieldShape::Scalar) && attr.rel.is_some() && !attr.is_ignored() {
            return Err(syn::Error::new_spanned(
                &field.ty,
                "`rel` needs an entity-typed field (T, Option<T>, Box<T> or Vec<T>)",
            ));
        }
        entity_fields.push(EntityField {
            ident,
            name: ident.unraw().to_string(),
            attr,
            shape,
        });
    }

    let declaration = expand_declaration(&name_str, &struct_attr, &entity_fields);
    let live: Vec<&EntityField> = entity_fields.iter().filter(|f| !f.attr.is_ignored()).collect();

    let scalars: Vec<&EntityField> = live
        .iter()
        .copied()
        .filter(|f| matches!(f.shape, FieldShape::Scalar))
        .collect();
    let relations: Vec<&EntityField> = live
        .iter()
        .copied()
        .filter(|f| !matches!(f.shape, FieldShape::Scalar))
        .collect();

    let decode_stmts = scalars.iter().map(|f| {
        let ident = f.ident;
        let attr_name = &f.name;
        quote! {
            qix::entity::decode_attr(row, descriptor, #attr_name, &mut entity.#ident)?;
        }
    });

    let get_arms = scalars.iter().map(|f| {
        let ident = f.ident;
        let attr_name = &f.name;
        quote! {
            #attr_name => ::core::option::Option::Some(
                qix::Value::from(::core::clone::Clone::clone(&self.#ident))
            ),
        }
    });

    let set_arms = scalars.iter().map(|f| {
        let ident = f.ident;
        let attr_name = &f.name;
        quote! {
            #attr_name => qix::entity::assign_attr(&mut self.#ident, attr, value),
        }
    });

    let attach_arms = relations.iter().filter_map(|f| {
        let ident = f.ident;
        let attr_name = &f.name;
        let assign = match f.shape {
            FieldShape::One { slot: OneSlot::Plain, .. } => quote!(assign_one),
            FieldShape::One { slot: OneSlot::Optional, .. } => quote!(assign_optional),
            FieldShape::One { slot: OneSlot::Boxed, .. } => quote!(assign_boxed),
            FieldShape::One { slot: OneSlot::OptionalBoxed, .. } => quote!(assign_optional_boxed),
            FieldShape::Many { boxed: false, .. } => quote!(assign_many),
            FieldShape::Many { boxed: true, .. } => quote!(assign_many_boxed),
            FieldShape::Scalar => return None,
        };
        Some(quote! {
            #attr_name => qix::entity::#assign(&mut self.#ident, attr, related),
        })
    });

    Ok(quote! {
        #[allow(clippy::clone_on_copy)]
        impl qix::Entity for #name {
            fn declaration() -> qix::EntityDecl {
                #declaration
            }

            fn from_row(
                row: &qix::Row,
                descriptor: &qix::EntityDescriptor,
            ) -> qix::OrmResult<Self> {
                let mut entity = <Self as ::core::default::Default>::default();
                #(#decode_stmts)*
                ::core::result::Result::Ok(entity)
            }

            fn get_attr(&self, attr: &str) -> ::core::option::Option<qix::Value> {
                match attr {
                    #(#get_arms)*
                    _ => ::core::option::Option::None,
                }
            }

            fn set_attr(&mut self, attr: &str, value: &qix::Value) -> qix::OrmResult<()> {
                match attr {
                    #(#set_arms)*
                    _ => ::core::result::Result::Err(qix::entity::unknown_attr(#name_str, attr)),
                }
            }

            fn attach(&mut self, attr: &str, related: qix::Related) -> qix::OrmResult<()> {
                match attr {
                    #(#attach_arms)*
                    _ => ::core::result::Result::Err(qix::entity::unknown_attr(#name_str, attr)),
                }
            }
        }

        qix::inventory::submit! {
            qix::EntityRegistration {
                name: #name_str,
                register_fn: |registry: &qix::Registry| {
                    registry.register::<#name>().map(|_| ())
                },
            }
        }
    })
}

fn expand_declaration(
    name_str: &str,
    struct_attr: &attrs::StructAttr,
    fields: &[EntityField<'_>],
) -> TokenStream {
    let table = struct_attr.table.as_ref().map(|t| quote!(.table(#t)));
    let primary_key = struct_attr.primary_key.as_ref().map(|pk| quote!(.primary_key(#pk)));

    let attrs = fields.iter().map(|f| {
        let attr_name = &f.name;
        let base = match f.shape {
            FieldShape::Scalar => quote!(qix::AttrDecl::scalar(#attr_name)),
            FieldShape::One { target, .. } => quote! {
                qix::AttrDecl::entity(#attr_name, qix::TargetRef::of::<#target>())
            },
            FieldShape::Many { target, .. } => quote! {
                qix::AttrDecl::collection(#attr_name, qix::TargetRef::of::<#target>())
            },
        };
        let column = f.attr.db.as_ref().map(|db| quote!(.column(#db)));
        let relation = f.attr.rel.as_ref().map(|rel| quote!(.relation(#rel)));
        quote!(.attr(#base #column #relation))
    });

    quote! {
        qix::EntityDecl::new(#name_str)
            #table
            #primary_key
            #(#attrs)*
    }
}
