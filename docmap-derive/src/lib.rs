use proc_macro::TokenStream;
use quote::quote;
use syn::{DeriveInput, parse_macro_input};

mod fields;

/// Derive macro making a named-field struct usable by the docmap codecs.
///
/// Generates `Reflect`, `Typed` and `Struct` implementations. The struct must
/// also implement `Debug`, and every field type must implement `Typed`.
///
/// # Example
///
/// ```ignore
/// use docmap_core::Record;
///
/// #[derive(Debug, Default, Record)]
/// struct User {
///     #[docmap(tag = "_id")]
///     pub id: String,
///     #[docmap(tag = "age,omitempty")]
///     pub age: Option<u32>,
/// }
/// ```
///
/// # Attributes
///
/// - `#[docmap(tag = "name,omitempty,minsize,truncate,inline")]` - Native field annotation;
///   `"-"` skips the field
/// - `#[docmap(json = "name,omitempty")]` - Alternate annotation, read when JSON-style tags
///   are enabled
/// - `#[docmap(embedded)]` - Marks the field as embedded, so a private field can still be mapped
#[proc_macro_derive(Record, attributes(docmap))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match derive_record_impl(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn derive_record_impl(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let generics = &input.generics;

    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();
    let where_clause = build_where_clause(generics, where_clause);

    let fields = fields::collect_fields(input)?;
    let idents: Vec<_> = fields.iter().map(|f| &f.ident).collect();
    let field_impls = fields::generate_struct_methods(&fields);

    Ok(quote! {
        impl #impl_generics ::docmap_core::Reflect for #name #ty_generics #where_clause {
            fn shape(&self) -> ::docmap_core::Shape {
                <Self as ::docmap_core::Typed>::type_shape()
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }

            fn into_any(self: ::std::boxed::Box<Self>) -> ::std::boxed::Box<dyn ::std::any::Any> {
                self
            }

            fn reflect_ref(&self) -> ::docmap_core::ReflectRef<'_> {
                ::docmap_core::ReflectRef::Struct(self)
            }

            fn reflect_mut(&mut self) -> ::docmap_core::ReflectMut<'_> {
                ::docmap_core::ReflectMut::Struct(self)
            }

            fn reset(&mut self) {
                #( ::docmap_core::Reflect::reset(&mut self.#idents); )*
            }

            fn is_zero_value(&self) -> bool {
                true #( && ::docmap_core::Reflect::is_zero_value(&self.#idents) )*
            }
        }

        impl #impl_generics ::docmap_core::Typed for #name #ty_generics #where_clause {
            fn type_shape() -> ::docmap_core::Shape {
                ::docmap_core::Shape::of::<Self>(::docmap_core::ShapeKind::Struct {
                    fields: <Self as ::docmap_core::Struct>::field_shapes,
                })
            }
        }

        impl #impl_generics ::docmap_core::Struct for #name #ty_generics #where_clause {
            #field_impls
        }
    })
}

fn build_where_clause(
    generics: &syn::Generics,
    existing: Option<&syn::WhereClause>,
) -> proc_macro2::TokenStream {
    let type_params: Vec<_> = generics.type_params().map(|p| &p.ident).collect();

    if type_params.is_empty() && existing.is_none() {
        return quote! {};
    }

    let record_bounds = type_params.iter().map(|p| {
        quote! { #p: ::docmap_core::Typed + ::std::default::Default }
    });

    let existing_predicates = existing
        .map(|w| {
            let predicates = &w.predicates;
            quote! { #predicates, }
        })
        .unwrap_or_default();

    quote! {
        where
            #existing_predicates
            #(#record_bounds),*
    }
}

#[derive(Default)]
pub(crate) struct FieldAttrs {
    pub tag: Option<String>,
    pub json: Option<String>,
    pub embedded: bool,
}

pub(crate) fn parse_field_attrs(attrs: &[syn::Attribute]) -> syn::Result<FieldAttrs> {
    let mut result = FieldAttrs::default();

    for attr in attrs {
        if !attr.path().is_ident("docmap") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("tag") {
                let value: syn::LitStr = meta.value()?.parse()?;
                result.tag = Some(value.value());
            } else if meta.path.is_ident("json") {
                let value: syn::LitStr = meta.value()?.parse()?;
                result.json = Some(value.value());
            } else if meta.path.is_ident("embedded") {
                result.embedded = true;
            } else {
                return Err(meta.error("expected `tag`, `json` or `embedded`"));
            }
            Ok(())
        })?;
    }

    Ok(result)
}
