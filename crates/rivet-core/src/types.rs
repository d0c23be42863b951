//! Value model and field type conversions.

pub mod builtin;
mod error;
mod field_type;
pub mod registry;
mod value;

pub use builtin::{JsonBlob, SliceItem, format_date_time, parse_date_time, parse_slice, render_slice};
pub use error::ConvertError;
pub use field_type::{
	Capabilities, FieldType, ParseFn, Parsable, Representable, StoreFn, TypeKey, WireFn,
};
pub use registry::{RegistryError, TypeMapping, TypeRegistry, register};
pub use value::{CustomValue, InternalValue, NullValue, NullableKind, Representation, Value, json_kind};
