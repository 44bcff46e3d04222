//! `#[derive(Validate)]` generates a validating `new` constructor.
//!
//! Rules are declared on the struct (applied to every field) or per field
//! (replacing the struct rules for that field). `#[validate(skip)]` exempts a
//! field. `whole_seconds` truncates a `chrono::DateTime` argument before it is
//! stored. The error type defaults to `String`; `#[validate_error(MyError)]`
//! selects another type, which must implement `From<String>`.
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{ToTokens, quote};
use syn::{Attribute, Data, DeriveInput, Fields, Type, parse_macro_input};

mod rules;

fn extract_error_type(attrs: &[Attribute]) -> syn::Result<TokenStream2> {
    for attr in attrs.iter().filter(|a| a.path().is_ident("validate_error")) {
        let mut ty = None;
        attr.parse_nested_meta(|meta| {
            ty = Some(meta.path.to_token_stream());
            Ok(())
        })?;
        if let Some(t) = ty {
            return Ok(t);
        }
    }
    Ok(quote! { ::std::string::String })
}

fn extract_rules(attrs: &[Attribute]) -> syn::Result<Vec<String>> {
    let mut out = vec![];
    for attr in attrs.iter().filter(|a| a.path().is_ident("validate")) {
        attr.parse_nested_meta(|meta| {
            if let Some(id) = meta.path.get_ident() {
                out.push(id.to_string());
            }
            Ok(())
        })?;
    }
    Ok(out)
}

/// Only allow rules on String for now.
fn is_string_type(ty: &Type) -> bool {
    match ty {
        Type::Path(p) => p
            .path
            .segments
            .last()
            .map(|s| s.ident == "String")
            .unwrap_or(false),
        _ => false,
    }
}

#[proc_macro_derive(Validate, attributes(validate, validate_error))]
pub fn derive_validate(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);
    match expand(ast) {
        Ok(ts) => ts.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(ast: DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &ast.ident;
    let error_type = extract_error_type(&ast.attrs)?;
    let struct_rules = extract_rules(&ast.attrs)?;

    let fields = match &ast.data {
        Data::Struct(s) => match &s.fields {
            Fields::Named(n) => n.named.clone(),
            _ => {
                return Err(syn::Error::new_spanned(
                    struct_name,
                    "Validate supports named structs only",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                struct_name,
                "Validate can only be used on structs",
            ));
        }
    };

    let mut ctor_params = vec![];
    let mut ctor_assigns = vec![];
    let mut validations = vec![];

    for field in fields {
        let Some(ident) = field.ident.clone() else {
            continue;
        };
        let ty = field.ty.clone();

        ctor_params.push(quote! { #ident: #ty });
        ctor_assigns.push(quote! { #ident });

        let mut field_rules = extract_rules(&field.attrs)?;
        if field_rules.iter().any(|r| r == "skip") {
            continue;
        }
        if field_rules.is_empty() {
            field_rules = struct_rules.clone();
        }
        if field_rules.is_empty() {
            continue;
        }

        for rule in field_rules {
            if !rules::accepts_any_type(&rule) && !is_string_type(&ty) {
                return Err(syn::Error::new_spanned(
                    &field,
                    format!("rule `{rule}` can only be applied to String fields: {ident}"),
                ));
            }
            let ts = rules::dispatch(&rule, &ident).ok_or_else(|| {
                syn::Error::new_spanned(&field, format!("unknown validation rule `{rule}`"))
            })?;
            validations.push(ts);
        }
    }

    Ok(quote! {
        impl #struct_name {
            #[allow(clippy::too_many_arguments)]
            pub fn new(
                #(#ctor_params),*
            ) -> ::std::result::Result<Self, #error_type> {
                fn __reject(message: ::std::string::String) -> #error_type {
                    <#error_type as ::std::convert::From<::std::string::String>>::from(message)
                }

                #(
                    #validations
                )*

                Ok(Self {
                    #(#ctor_assigns),*
                })
            }
        }
    })
}
