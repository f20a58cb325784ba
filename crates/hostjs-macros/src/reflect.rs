// #[derive(Reflect)] implementation
//
// Generates the field table (and the method table hook) that the
// reflection binder turns into a class.

use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, LitStr, Path, Result, Visibility};

/// Struct-level `#[js(..)]` options.
#[derive(Default)]
struct StructAttrs {
    name: Option<LitStr>,
    methods: Option<Path>,
}

/// Field-level `#[js(..)]` options.
#[derive(Default)]
struct FieldAttrs {
    rename: Option<LitStr>,
    skip: bool,
}

fn parse_struct_attrs(input: &DeriveInput) -> Result<StructAttrs> {
    let mut attrs = StructAttrs::default();
    for attr in input.attrs.iter().filter(|a| a.path().is_ident("js")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                attrs.name = Some(meta.value()?.parse()?);
                Ok(())
            } else if meta.path.is_ident("methods") {
                attrs.methods = Some(meta.value()?.parse()?);
                Ok(())
            } else {
                Err(meta.error("expected `name` or `methods`"))
            }
        })?;
    }
    Ok(attrs)
}

fn parse_field_attrs(field: &syn::Field) -> Result<FieldAttrs> {
    let mut attrs = FieldAttrs::default();
    for attr in field.attrs.iter().filter(|a| a.path().is_ident("js")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                attrs.rename = Some(meta.value()?.parse()?);
                Ok(())
            } else if meta.path.is_ident("skip") {
                attrs.skip = true;
                Ok(())
            } else {
                Err(meta.error("expected `rename` or `skip`"))
            }
        })?;
    }
    Ok(attrs)
}

/// Expands #[derive(Reflect)].
///
/// Example expansion:
/// ```ignore
/// // Input:
/// #[derive(Default, Reflect)]
/// pub struct Point {
///     pub x: f64,
/// }
///
/// // Output:
/// impl ::hostjs::Reflect for Point {
///     fn class_name() -> &'static str { "Point" }
///     fn fields() -> Vec<::hostjs::FieldInfo<Self>> {
///         vec![::hostjs::FieldInfo {
///             name: "x",
///             field: "x",
///             get: |this: &Self, ctx: &::hostjs::Context| { /* clone + IntoJs */ },
///             set: |this: &mut Self, value: &::hostjs::Value| { /* FromJs */ },
///         }]
///     }
/// }
/// ```
pub fn expand_reflect(input: DeriveInput) -> Result<TokenStream> {
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input.ident,
                    "Reflect can only be derived for structs with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input.ident,
                "Reflect can only be derived for structs",
            ))
        }
    };

    let attrs = parse_struct_attrs(&input)?;
    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let class_name = match &attrs.name {
        Some(name) => name.value(),
        None => ident.to_string(),
    };

    let mut entries = Vec::new();
    for field in fields {
        if !matches!(field.vis, Visibility::Public(_)) {
            continue;
        }
        let field_attrs = parse_field_attrs(field)?;
        if field_attrs.skip {
            continue;
        }
        let Some(field_ident) = &field.ident else {
            continue;
        };
        let field_name = field_ident.to_string();
        let js_name = match &field_attrs.rename {
            Some(name) => name.value(),
            None => field_name.clone(),
        };
        entries.push(quote! {
            ::hostjs::FieldInfo {
                name: #js_name,
                field: #field_name,
                get: |this: &Self, ctx: &::hostjs::Context| {
                    ::hostjs::IntoJs::into_js(::std::clone::Clone::clone(&this.#field_ident), ctx)
                },
                set: |this: &mut Self, value: &::hostjs::Value| {
                    this.#field_ident = ::hostjs::FromJs::from_js(value)?;
                    ::std::result::Result::Ok(())
                },
            }
        });
    }

    let methods = attrs.methods.map(|path| {
        quote! {
            fn methods() -> ::std::vec::Vec<::hostjs::MethodInfo<Self>> {
                #path()
            }
        }
    });

    Ok(quote! {
        impl #impl_generics ::hostjs::Reflect for #ident #ty_generics #where_clause {
            fn class_name() -> &'static str {
                #class_name
            }

            fn fields() -> ::std::vec::Vec<::hostjs::FieldInfo<Self>> {
                ::std::vec![#(#entries),*]
            }

            #methods
        }
    })
}
