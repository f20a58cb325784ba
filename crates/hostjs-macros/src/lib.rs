// hostjs-macros: derive support for the reflection binder
//
// Provides:
// - #[derive(Reflect)] - Describes a struct's public fields (and optionally
//   a method table) so it can be bound as a script class
//
// Example:
// ```
// #[derive(Default, Reflect)]
// #[js(name = "Person", methods = person_methods)]
// pub struct Person {
//     pub name: String,
//     #[js(rename = "years")]
//     pub age: i32,
//     #[js(skip)]
//     pub cache: Vec<u8>,
// }
// ```

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

mod reflect;

/// Derives `hostjs::Reflect` for a struct with named fields.
///
/// Only `pub` fields are reflected; each becomes a read/write accessor on
/// the bound class. Field types must implement `IntoJs`, `FromJs` and
/// `Clone`.
///
/// Field attributes:
/// - `#[js(rename = "other")]` - script-side name of the field
/// - `#[js(skip)]` - leave the field out
///
/// Struct attributes:
/// - `#[js(name = "Other")]` - script-side class name (default: the
///   struct name).
/// - `#[js(methods = path)]` - function returning the method table,
///   `fn() -> Vec<hostjs::MethodInfo<Self>>`.
///
/// # Example
///
/// ```ignore
/// #[derive(Default, Reflect)]
/// pub struct Counter {
///     pub count: i32,
/// }
/// ```
#[proc_macro_derive(Reflect, attributes(js))]
pub fn derive_reflect(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    reflect::expand_reflect(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
