use proc_macro2::TokenStream;
use quote::quote;
use syn::DeriveInput;
use syn::ext::IdentExt;

use crate::parse_field_attrs;

pub struct RecordField {
    pub ident: syn::Ident,
    pub ty: syn::Type,
    pub public: bool,
    pub embedded: bool,
    pub tags: Vec<(&'static str, String)>,
}

/// Collects the named fields of a struct, rejecting every other item kind.
pub fn collect_fields(input: &DeriveInput) -> syn::Result<Vec<RecordField>> {
    let data = match &input.data {
        syn::Data::Struct(data) => data,
        syn::Data::Enum(_) => {
            return Err(syn::Error::new_spanned(
                input,
                "Record cannot be derived for enums",
            ));
        }
        syn::Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                input,
                "Record cannot be derived for unions",
            ));
        }
    };

    let named = match &data.fields {
        syn::Fields::Named(named) => named,
        _ => {
            return Err(syn::Error::new_spanned(
                input,
                "Record can only be derived for structs with named fields",
            ));
        }
    };

    named
        .named
        .iter()
        .map(|f| {
            let attrs = parse_field_attrs(&f.attrs)?;
            let ident = f
                .ident
                .clone()
                .ok_or_else(|| syn::Error::new_spanned(f, "expected a named field"))?;
            let mut tags = Vec::new();
            if let Some(tag) = attrs.tag {
                tags.push(("docmap", tag));
            }
            if let Some(json) = attrs.json {
                tags.push(("json", json));
            }
            Ok(RecordField {
                ident,
                ty: f.ty.clone(),
                public: matches!(f.vis, syn::Visibility::Public(_)),
                embedded: attrs.embedded,
                tags,
            })
        })
        .collect()
}

/// Generates the body of the `Struct` implementation.
pub fn generate_struct_methods(fields: &[RecordField]) -> TokenStream {
    let count = fields.len();

    let refs = fields.iter().enumerate().map(|(i, f)| {
        let ident = &f.ident;
        quote! {
            #i => ::std::option::Option::Some(&self.#ident as &dyn ::docmap_core::Reflect),
        }
    });

    let muts = fields.iter().enumerate().map(|(i, f)| {
        let ident = &f.ident;
        quote! {
            #i => ::std::option::Option::Some(
                &mut self.#ident as &mut dyn ::docmap_core::Reflect
            ),
        }
    });

    let shapes = fields.iter().enumerate().map(|(i, f)| {
        let name = f.ident.unraw().to_string();
        let ty = &f.ty;
        let public = f.public;
        let embedded = f.embedded;
        let tags = f.tags.iter().map(|(key, value)| quote! { (#key, #value) });
        quote! {
            ::docmap_core::FieldShape {
                name: #name,
                index: #i,
                public: #public,
                embedded: #embedded,
                tags: &[#(#tags),*],
                shape: <#ty as ::docmap_core::Typed>::type_shape,
            }
        }
    });

    quote! {
        fn field(&self, index: usize) -> ::std::option::Option<&dyn ::docmap_core::Reflect> {
            match index {
                #(#refs)*
                _ => ::std::option::Option::None,
            }
        }

        fn field_mut(
            &mut self,
            index: usize,
        ) -> ::std::option::Option<&mut dyn ::docmap_core::Reflect> {
            match index {
                #(#muts)*
                _ => ::std::option::Option::None,
            }
        }

        fn field_len(&self) -> usize {
            #count
        }

        fn field_shapes() -> ::std::vec::Vec<::docmap_core::FieldShape> {
            ::std::vec![#(#shapes),*]
        }
    }
}
