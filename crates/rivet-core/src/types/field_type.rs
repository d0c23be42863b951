//! Declared capabilities of field types.
//!
//! Every type usable as a model field implements [`FieldType`]. Besides
//! moving values in and out of [`Value`], the type declares which conversion
//! capabilities it offers through [`Capabilities`]; the detector chains bind
//! converters from these declarations once per model.

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::value::json_kind;
use super::{ConvertError, NullableKind, Value};

/// Converts an internal value into its wire form.
pub type WireFn = Arc<dyn Fn(&Value) -> Result<JsonValue, ConvertError> + Send + Sync>;

/// Converts a wire value into an internal value.
pub type ParseFn = Arc<dyn Fn(&JsonValue) -> Result<Value, ConvertError> + Send + Sync>;

/// Converts between stored and internal values.
pub type StoreFn = Arc<dyn Fn(&Value) -> Result<Value, ConvertError> + Send + Sync>;

/// A type usable as a model field.
///
/// # Examples
///
/// ```
/// use rivet_core::{Capabilities, ConvertError, FieldType, Value};
///
/// #[derive(Debug, Clone, PartialEq)]
/// struct Color(String);
///
/// impl std::fmt::Display for Color {
///     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
///         write!(f, "#{}", self.0)
///     }
/// }
///
/// impl std::str::FromStr for Color {
///     type Err = String;
///     fn from_str(s: &str) -> Result<Self, Self::Err> {
///         s.strip_prefix('#').map(|hex| Color(hex.to_string())).ok_or_else(|| "missing #".to_string())
///     }
/// }
///
/// impl FieldType for Color {
///     fn into_value(self) -> Value {
///         Value::custom(self)
///     }
///     fn from_value(value: &Value) -> Result<Self, ConvertError> {
///         value.downcast_custom::<Self>()
///     }
///     fn capabilities() -> Capabilities {
///         Capabilities::new().text::<Self>()
///     }
/// }
///
/// assert!(Color::capabilities().is_text_marshaler());
/// ```
pub trait FieldType: Sized + Send + Sync + 'static {
	fn into_value(self) -> Value;

	fn from_value(value: &Value) -> Result<Self, ConvertError>;

	fn capabilities() -> Capabilities {
		Capabilities::new()
	}
}

/// A type that renders its own wire form.
pub trait Representable {
	fn to_representation(&self) -> Result<JsonValue, ConvertError>;
}

/// A type that parses itself from its wire form.
pub trait Parsable: Sized {
	fn from_representation(value: &JsonValue) -> Result<Self, ConvertError>;
}

/// Stable identifier of a field type, with its name kept for messages.
#[derive(Debug, Clone, Copy)]
pub struct TypeKey {
	id: TypeId,
	name: &'static str,
}

impl TypeKey {
	pub fn of<T: 'static>() -> Self {
		Self {
			id: TypeId::of::<T>(),
			name: std::any::type_name::<T>(),
		}
	}

	pub fn id(&self) -> TypeId {
		self.id
	}

	pub fn name(&self) -> &'static str {
		self.name
	}
}

impl PartialEq for TypeKey {
	fn eq(&self, other: &Self) -> bool {
		self.id == other.id
	}
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.id.hash(state);
	}
}

impl fmt::Display for TypeKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name)
	}
}

/// Conversion capabilities a field type exposes.
#[derive(Clone, Default)]
pub struct Capabilities {
	representable: Option<WireFn>,
	parsable: Option<ParseFn>,
	text_marshal: Option<WireFn>,
	text_unmarshal: Option<ParseFn>,
	scanner: Option<StoreFn>,
	valuer: Option<StoreFn>,
	nullable: Option<NullableKind>,
	date_time: bool,
	json_blob: bool,
}

impl Capabilities {
	pub fn new() -> Self {
		Self::default()
	}

	/// Binds [`Representable`] of `T`.
	pub fn representable<T>(mut self) -> Self
	where
		T: FieldType + Representable,
	{
		self.representable = Some(Arc::new(|value: &Value| {
			T::from_value(value)?.to_representation()
		}));
		self
	}

	/// Binds [`Parsable`] of `T`.
	pub fn parsable<T>(mut self) -> Self
	where
		T: FieldType + Parsable,
	{
		self.parsable = Some(Arc::new(|value: &JsonValue| {
			T::from_representation(value).map(FieldType::into_value)
		}));
		self
	}

	/// Binds both text directions of `T`.
	pub fn text<T>(self) -> Self
	where
		T: FieldType + fmt::Display + FromStr,
		T::Err: fmt::Display,
	{
		self.text_marshaler::<T>().text_unmarshaler::<T>()
	}

	/// Binds `Display` of `T` as its wire form.
	pub fn text_marshaler<T>(mut self) -> Self
	where
		T: FieldType + fmt::Display,
	{
		self.text_marshal = Some(Arc::new(|value: &Value| {
			Ok(JsonValue::String(T::from_value(value)?.to_string()))
		}));
		self
	}

	/// Binds `FromStr` of `T` as its parser; only string input is accepted.
	pub fn text_unmarshaler<T>(mut self) -> Self
	where
		T: FieldType + FromStr,
		T::Err: fmt::Display,
	{
		self.text_unmarshal = Some(Arc::new(|value: &JsonValue| match value {
			JsonValue::String(text) => text
				.parse::<T>()
				.map(FieldType::into_value)
				.map_err(|err| ConvertError::invalid(err.to_string())),
			other => Err(ConvertError::type_mismatch("string", json_kind(other))),
		}));
		self
	}

	/// Conversion from a raw stored value into the internal value.
	pub fn scanner<F>(mut self, scan: F) -> Self
	where
		F: Fn(&Value) -> Result<Value, ConvertError> + Send + Sync + 'static,
	{
		self.scanner = Some(Arc::new(scan));
		self
	}

	/// Conversion from the internal value into a storable value.
	pub fn valuer<F>(mut self, value: F) -> Self
	where
		F: Fn(&Value) -> Result<Value, ConvertError> + Send + Sync + 'static,
	{
		self.valuer = Some(Arc::new(value));
		self
	}

	pub fn nullable(mut self, kind: NullableKind) -> Self {
		self.nullable = Some(kind);
		self
	}

	pub fn date_time(mut self) -> Self {
		self.date_time = true;
		self
	}

	pub fn json_blob(mut self) -> Self {
		self.json_blob = true;
		self
	}

	pub fn is_representable(&self) -> bool {
		self.representable.is_some()
	}

	pub fn is_parsable(&self) -> bool {
		self.parsable.is_some()
	}

	pub fn is_text_marshaler(&self) -> bool {
		self.text_marshal.is_some()
	}

	pub fn is_text_unmarshaler(&self) -> bool {
		self.text_unmarshal.is_some()
	}

	pub fn nullable_kind(&self) -> Option<NullableKind> {
		self.nullable
	}

	pub fn is_date_time(&self) -> bool {
		self.date_time
	}

	pub fn is_json_blob(&self) -> bool {
		self.json_blob
	}

	pub fn representable_fn(&self) -> Option<&WireFn> {
		self.representable.as_ref()
	}

	pub fn parsable_fn(&self) -> Option<&ParseFn> {
		self.parsable.as_ref()
	}

	pub fn text_marshal_fn(&self) -> Option<&WireFn> {
		self.text_marshal.as_ref()
	}

	pub fn text_unmarshal_fn(&self) -> Option<&ParseFn> {
		self.text_unmarshal.as_ref()
	}

	pub fn scanner_fn(&self) -> Option<&StoreFn> {
		self.scanner.as_ref()
	}

	pub fn valuer_fn(&self) -> Option<&StoreFn> {
		self.valuer.as_ref()
	}
}

impl fmt::Debug for Capabilities {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Capabilities")
			.field("representable", &self.is_representable())
			.field("parsable", &self.is_parsable())
			.field("text_marshal", &self.is_text_marshaler())
			.field("text_unmarshal", &self.is_text_unmarshaler())
			.field("scanner", &self.scanner.is_some())
			.field("valuer", &self.valuer.is_some())
			.field("nullable", &self.nullable)
			.field("date_time", &self.date_time)
			.field("json_blob", &self.json_blob)
			.finish()
	}
}
