//! # Rivet Core
//!
//! Fundamental types shared by the Rivet crates:
//!
//! - [`Value`] and [`InternalValue`]: the canonical, backend-agnostic form of
//!   model data
//! - [`FieldType`] and [`Capabilities`]: how a field type converts between
//!   stored, internal and wire forms
//! - [`TypeRegistry`]: fallback conversions for primitive types, keyed by type
//! - [`Model`], [`ModelMeta`] and [`probe`]: model reflection
//! - [`exception`]: error kinds surfaced to the view layer
//! - [`conf`]: TOML settings
//!
//! ## Deriving models
//!
//! ```
//! use rivet_core::{Model, ModelMeta};
//!
//! #[derive(Model)]
//! #[rivet(name = "products")]
//! struct Product {
//!     id: i64,
//!     name: String,
//!     #[rivet(rename = "unit_price")]
//!     price: f64,
//! }
//!
//! let meta: &ModelMeta = Product::meta();
//! assert_eq!(meta.name(), "products");
//! assert_eq!(meta.field_names().collect::<Vec<_>>(), ["id", "name", "unit_price"]);
//! ```

extern crate self as rivet_core;

pub mod conf;
pub mod context;
pub mod exception;
pub mod reflect;
pub mod types;

pub use context::RequestContext;
pub use exception::{Error, ValidationError};
pub use reflect::{BaseModel, FieldMeta, FieldSettings, Model, ModelMeta, probe};
pub use types::{
	Capabilities, ConvertError, CustomValue, FieldType, InternalValue, JsonBlob, NullValue,
	NullableKind, Parsable, Representable, Representation, TypeKey, TypeMapping, TypeRegistry,
	Value,
};

#[cfg(feature = "macros")]
pub use rivet_macros::Model;
