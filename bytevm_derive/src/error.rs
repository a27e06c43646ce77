//! Derive macro for error enums.
//!
//! Generates `std::fmt::Display`, `std::error::Error` and, for variants with a
//! single `#[from]` field, `From<T>` conversions.
//!
//! ```ignore
//! use bytevm_derive::Error;
//!
//! #[derive(Debug, Error)]
//! pub enum LoadError {
//!     #[error("image truncated at byte {0}")]
//!     Truncated(usize),
//!
//!     #[error("bad width {width} in table at {offset}")]
//!     BadWidth { width: u8, offset: usize },
//!
//!     #[error("io: {0}")]
//!     Io(#[from] std::io::Error),
//! }
//! ```
//!
//! Format strings may reference tuple fields positionally (`{0}`) and struct
//! fields by name (`{width}`). A `#[from]` field is also reported through
//! `Error::source`.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{ToTokens, format_ident, quote};
use syn::{Attribute, Data, DataEnum, DeriveInput, Fields, Lit, Meta, Variant, parse_macro_input};

pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    match &input.data {
        Data::Enum(data) => expand_enum(input, data),
        Data::Struct(data) => expand_struct(input, &data.fields),
        Data::Union(_) => Err(syn::Error::new_spanned(
            input,
            "Error derive does not support unions",
        )),
    }
}

fn expand_enum(input: &DeriveInput, data: &DataEnum) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let mut display_arms = Vec::with_capacity(data.variants.len());
    let mut source_arms = Vec::new();
    let mut from_impls = Vec::new();

    for variant in &data.variants {
        let message = message_from_attrs(
            &variant.attrs,
            &variant.ident,
            &format!("variant `{}`", variant.ident),
        )?;
        display_arms.push(display_arm(variant, &message));

        if let Some(from) = from_field(variant)? {
            let ident = &variant.ident;
            let ty = &from.ty;
            source_arms.push(quote! {
                Self::#ident(inner) => Some(inner),
            });
            from_impls.push(quote! {
                impl #impl_generics ::std::convert::From<#ty> for #name #ty_generics #where_clause {
                    fn from(value: #ty) -> Self {
                        Self::#ident(value)
                    }
                }
            });
        }
    }

    let source_fn = if source_arms.is_empty() {
        quote! {}
    } else {
        quote! {
            fn source(&self) -> Option<&(dyn ::std::error::Error + 'static)> {
                match self {
                    #(#source_arms)*
                    _ => None,
                }
            }
        }
    };

    Ok(quote! {
        impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                match self {
                    #(#display_arms)*
                }
            }
        }

        impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {
            #source_fn
        }

        #(#from_impls)*
    })
}

fn expand_struct(input: &DeriveInput, fields: &Fields) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let message = message_from_attrs(&input.attrs, &input.ident, &format!("type `{}`", name))?;

    let body = match fields {
        Fields::Unit => quote! { write!(f, #message) },
        Fields::Named(named) => {
            let idents: Vec<_> = named.named.iter().map(|f| &f.ident).collect();
            quote! { write!(f, #message, #(#idents = self.#idents),*) }
        }
        Fields::Unnamed(unnamed) => {
            let count = unnamed.unnamed.len();
            let idents = positional_idents(count);
            let indices = (0..count).map(syn::Index::from);
            let message = positional_to_named(&message, count);
            quote! { write!(f, #message, #(#idents = self.#indices),*) }
        }
    };

    Ok(quote! {
        impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                #body
            }
        }

        impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {}
    })
}

fn display_arm(variant: &Variant, message: &str) -> TokenStream2 {
    let ident = &variant.ident;
    match &variant.fields {
        Fields::Unit => quote! {
            Self::#ident => write!(f, #message),
        },
        Fields::Unnamed(unnamed) => {
            let count = unnamed.unnamed.len();
            let idents = positional_idents(count);
            let message = positional_to_named(message, count);
            quote! {
                Self::#ident(#(#idents),*) => write!(f, #message, #(#idents = #idents),*),
            }
        }
        Fields::Named(named) => {
            let idents: Vec<_> = named.named.iter().map(|f| &f.ident).collect();
            quote! {
                Self::#ident { #(#idents),* } => write!(f, #message, #(#idents = #idents),*),
            }
        }
    }
}

/// Returns the field carrying `#[from]`, if any.
///
/// Only single-field tuple variants may use `#[from]`.
fn from_field(variant: &Variant) -> syn::Result<Option<&syn::Field>> {
    let tagged: Vec<_> = variant
        .fields
        .iter()
        .filter(|field| field.attrs.iter().any(|a| a.path().is_ident("from")))
        .collect();

    match (tagged.first(), &variant.fields) {
        (None, _) => Ok(None),
        (Some(field), Fields::Unnamed(unnamed)) if unnamed.unnamed.len() == 1 => Ok(Some(field)),
        (Some(field), _) => Err(syn::Error::new_spanned(
            field,
            "#[from] is only supported on tuple variants with exactly one field",
        )),
    }
}

fn message_from_attrs<T: ToTokens>(
    attrs: &[Attribute],
    target: &T,
    target_desc: &str,
) -> syn::Result<String> {
    let Some(attr) = attrs.iter().find(|a| a.path().is_ident("error")) else {
        return Err(syn::Error::new_spanned(
            target,
            format!("missing #[error(\"...\")] attribute on {target_desc}"),
        ));
    };

    let Meta::List(list) = &attr.meta else {
        return Err(syn::Error::new_spanned(
            &attr.meta,
            "expected #[error(\"message\")]",
        ));
    };

    match syn::parse2::<Lit>(list.tokens.clone()) {
        Ok(Lit::Str(lit)) => Ok(lit.value()),
        _ => Err(syn::Error::new_spanned(
            &attr.meta,
            "#[error] takes a single string literal, e.g. #[error(\"bad opcode {0}\")]",
        )),
    }
}

fn positional_idents(count: usize) -> Vec<syn::Ident> {
    (0..count).map(|i| format_ident!("f{}", i)).collect()
}

/// Rewrites `{0}`, `{1:x}` ... into `{f0}`, `{f1:x}` so they bind to named arguments.
fn positional_to_named(format_str: &str, field_count: usize) -> String {
    let mut result = format_str.to_string();
    for i in (0..field_count).rev() {
        result = result
            .replace(&format!("{{{i}}}"), &format!("{{f{i}}}"))
            .replace(&format!("{{{i}:"), &format!("{{f{i}:"));
    }
    result
}
