//! Procedural macros for Rivet.
//!
//! This crate provides the `#[derive(Model)]` macro, re-exported by
//! `rivet-core`.

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod crate_paths;
mod model_derive;

/// Derives a `Model` implementation for a struct with named fields.
///
/// # Attributes
///
/// ## Struct-level attributes
///
/// - `#[rivet(name = "products")]` - Model (and table) name, defaults to the
///   snake_case struct name
///
/// ## Field-level attributes
///
/// - `#[rivet(rename = "wire_name")]` - Wire name of the field; `#[serde(rename = "...")]`
///   is used when absent
/// - `#[rivet(primary_key)]` - Marks the identifier field (defaults to `id`)
/// - `#[rivet(relation)]` - Association to another model, excluded from the
///   default serializer fields
/// - `#[rivet(embed)]` - Flattens the fields of another model
/// - `#[rivet(skip)]` - Not a model field; `#[serde(skip)]` has the same effect.
///   The field is filled with `Default::default()` when the model is built
///   from an internal value
///
/// # Example
///
/// ```ignore
/// use rivet::{BaseModel, Model};
///
/// #[derive(Model)]
/// #[rivet(name = "products")]
/// pub struct Product {
///     #[rivet(embed)]
///     pub base: BaseModel,
///     pub name: String,
///     #[rivet(relation)]
///     pub tags: Vec<Tag>,
///     #[rivet(skip)]
///     pub cached_score: f64,
/// }
/// ```
///
/// This generates a `Model` implementation whose `meta()` is built once:
///
/// ```ignore
/// impl rivet::Model for Product {
///     fn meta() -> &'static rivet::ModelMeta {
///         static META: std::sync::OnceLock<rivet::ModelMeta> = std::sync::OnceLock::new();
///         META.get_or_init(|| {
///             rivet::ModelMeta::builder::<Self>("products")
///                 .embed(<BaseModel as rivet::Model>::meta())
///                 .field::<String>("name", "name")
///                 .relation::<Vec<Tag>>("tags", "tags")
///                 .build()
///         })
///     }
///     // into_internal_value / from_internal_value
/// }
/// ```
#[proc_macro_derive(Model, attributes(rivet))]
pub fn derive_model(input: TokenStream) -> TokenStream {
	let input = parse_macro_input!(input as DeriveInput);
	model_derive::derive_model_impl(input)
		.unwrap_or_else(|err| err.to_compile_error())
		.into()
}
