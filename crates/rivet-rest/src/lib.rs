//! # Rivet REST
//!
//! Wire conversion of model data:
//!
//! - [`detectors`]: ordered strategy chains that bind one converter per field
//!   from the capabilities the field type declares
//! - [`fields`]: [`Field`], the per-field bundle of conversions and
//!   read/write flags
//! - [`serializers`]: [`ModelSerializer`] and the serializer wrappers
//!
//! ## Example
//!
//! ```
//! use rivet_core::{Model, RequestContext};
//! use rivet_rest::{ModelSerializer, Serializer};
//! use serde_json::json;
//!
//! #[derive(Model)]
//! struct Product {
//!     id: i64,
//!     name: String,
//! }
//!
//! let serializer = ModelSerializer::<Product>::new().unwrap();
//! let ctx = RequestContext::default();
//!
//! let payload = json!({"id": 9, "name": "lamp"});
//! let internal = serializer
//!     .to_internal_value(payload.as_object().unwrap(), &ctx)
//!     .unwrap();
//!
//! // `id` is read-only, the payload value is ignored
//! assert!(!internal.contains_key("id"));
//! assert_eq!(internal["name"].as_str(), Some("lamp"));
//! ```

pub mod detectors;
pub mod fields;
pub mod serializers;

pub use detectors::{
	DetectionError, Detectors, InternalValueChain, InternalValueStrategy, RepresentationChain,
	RepresentationStrategy,
};
pub use fields::{Field, FieldError};
pub use serializers::{
	FnValidator, MissingSerializer, ModelSerializer, RequiredFields, Serializer, SerializerError,
	ValidatingSerializer, Validator,
};
