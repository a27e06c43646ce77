//! Derive macros for the bytevm crate.
//!
//! Provides `#[derive(Error)]`, which generates `Display` and `Error`
//! implementations from `#[error("...")]` attributes (a thiserror replacement).

mod error;

use proc_macro::TokenStream;

/// Implements `Display`, `Error` and `#[from]` conversions for error types.
#[proc_macro_derive(Error, attributes(error, from))]
pub fn derive_error(input: TokenStream) -> TokenStream {
    error::derive_error(input)
}
