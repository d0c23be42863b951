//! Dynamic values flowing between storage, internal and wire forms.

use std::any::Any;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use super::ConvertError;

/// Canonical, backend-agnostic form of one model instance.
pub type InternalValue = HashMap<String, Value>;

/// Wire form of one model instance.
pub type Representation = serde_json::Map<String, JsonValue>;

/// A dynamically typed value held by an [`InternalValue`].
///
/// # Examples
///
/// ```
/// use rivet_core::Value;
///
/// let value = Value::from("widget");
/// assert_eq!(value.as_str(), Some("widget"));
/// assert_eq!(value.kind_name(), "string");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
	#[default]
	Null,
	Bool(bool),
	Int(i64),
	UInt(u64),
	Float(f64),
	String(String),
	DateTime(DateTime<Utc>),
	Bytes(Vec<u8>),
	/// Content of a JSON blob column
	Json(JsonValue),
	Nullable(NullValue),
	List(Vec<Value>),
	/// Nested model instance, used by relations
	Object(InternalValue),
	Custom(CustomValue),
}

impl Value {
	/// Wraps a user-defined type.
	pub fn custom<T>(value: T) -> Self
	where
		T: Any + Send + Sync + PartialEq + fmt::Debug,
	{
		Value::Custom(CustomValue::new(value))
	}

	/// Short name of the variant, used in error messages.
	pub fn kind_name(&self) -> &'static str {
		match self {
			Value::Null => "null",
			Value::Bool(_) => "bool",
			Value::Int(_) => "int",
			Value::UInt(_) => "uint",
			Value::Float(_) => "float",
			Value::String(_) => "string",
			Value::DateTime(_) => "datetime",
			Value::Bytes(_) => "bytes",
			Value::Json(_) => "json",
			Value::Nullable(_) => "nullable",
			Value::List(_) => "list",
			Value::Object(_) => "object",
			Value::Custom(custom) => custom.type_name(),
		}
	}

	pub fn is_null(&self) -> bool {
		matches!(self, Value::Null)
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Value::String(s) => Some(s),
			Value::Nullable(NullValue::String(Some(s))) => Some(s),
			_ => None,
		}
	}

	pub fn as_i64(&self) -> Option<i64> {
		match self {
			Value::Int(i) => Some(*i),
			Value::UInt(u) => i64::try_from(*u).ok(),
			_ => None,
		}
	}

	/// Returns the wrapped custom value if it has type `T`.
	pub fn downcast_custom<T>(&self) -> Result<T, ConvertError>
	where
		T: Any + Clone,
	{
		match self {
			Value::Custom(custom) => custom.downcast_ref::<T>().cloned().ok_or_else(|| {
				ConvertError::type_mismatch(std::any::type_name::<T>(), custom.type_name())
			}),
			other => Err(ConvertError::type_mismatch(
				std::any::type_name::<T>(),
				other.kind_name(),
			)),
		}
	}

	/// Textual key of a scalar value.
	///
	/// Identifiers coming from a path segment and identifiers produced by a
	/// backend compare equal when their keys match, so `"1"` and `1` address
	/// the same record.
	pub fn id_key(&self) -> Option<String> {
		match self {
			Value::Int(i) => Some(i.to_string()),
			Value::UInt(u) => Some(u.to_string()),
			Value::Float(f) if f.fract() == 0.0 => Some(format!("{}", *f as i64)),
			Value::Float(f) => Some(f.to_string()),
			Value::String(s) => Some(s.clone()),
			Value::Bool(b) => Some(b.to_string()),
			Value::DateTime(dt) => Some(dt.to_rfc3339()),
			Value::Nullable(inner) => inner.clone().into_value().id_key(),
			Value::Json(JsonValue::String(s)) => Some(s.clone()),
			Value::Json(JsonValue::Number(n)) => Some(n.to_string()),
			Value::Json(JsonValue::Bool(b)) => Some(b.to_string()),
			_ => None,
		}
	}

	/// Equality that tolerates differing scalar variants with the same text.
	pub fn loose_eq(&self, other: &Value) -> bool {
		if self == other {
			return true;
		}
		match (self.id_key(), other.id_key()) {
			(Some(left), Some(right)) => left == right,
			_ => false,
		}
	}

	/// Ordering between comparable scalars. Nulls sort first.
	pub fn compare(&self, other: &Value) -> Option<Ordering> {
		match (self.unwrap_nullable(), other.unwrap_nullable()) {
			(Value::Null, Value::Null) => Some(Ordering::Equal),
			(Value::Null, _) => Some(Ordering::Less),
			(_, Value::Null) => Some(Ordering::Greater),
			(Value::Bool(a), Value::Bool(b)) => a.partial_cmp(&b),
			(Value::Int(a), Value::Int(b)) => a.partial_cmp(&b),
			(Value::UInt(a), Value::UInt(b)) => a.partial_cmp(&b),
			(Value::Int(a), Value::UInt(b)) => i128::from(a).partial_cmp(&i128::from(b)),
			(Value::UInt(a), Value::Int(b)) => i128::from(a).partial_cmp(&i128::from(b)),
			(Value::Float(a), Value::Float(b)) => a.partial_cmp(&b),
			(Value::Float(a), Value::Int(b)) => a.partial_cmp(&(b as f64)),
			(Value::Int(a), Value::Float(b)) => (a as f64).partial_cmp(&b),
			(Value::String(a), Value::String(b)) => a.partial_cmp(&b),
			(Value::DateTime(a), Value::DateTime(b)) => a.partial_cmp(&b),
			_ => None,
		}
	}

	fn unwrap_nullable(&self) -> Value {
		match self {
			Value::Nullable(inner) => inner.clone().into_value(),
			other => other.clone(),
		}
	}

	/// Plain conversion of a JSON value, without any field-specific parsing.
	pub fn from_json(value: &JsonValue) -> Value {
		match value {
			JsonValue::Null => Value::Null,
			JsonValue::Bool(b) => Value::Bool(*b),
			JsonValue::Number(n) => {
				if let Some(i) = n.as_i64() {
					Value::Int(i)
				} else if let Some(u) = n.as_u64() {
					Value::UInt(u)
				} else {
					Value::Float(n.as_f64().unwrap_or_default())
				}
			}
			JsonValue::String(s) => Value::String(s.clone()),
			JsonValue::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
			JsonValue::Object(fields) => Value::Object(
				fields
					.iter()
					.map(|(key, value)| (key.clone(), Value::from_json(value)))
					.collect(),
			),
		}
	}

	/// Plain JSON rendering, without any field-specific conversion.
	pub fn to_json(&self) -> JsonValue {
		match self {
			Value::Null => JsonValue::Null,
			Value::Bool(b) => JsonValue::Bool(*b),
			Value::Int(i) => JsonValue::from(*i),
			Value::UInt(u) => JsonValue::from(*u),
			Value::Float(f) => serde_json::Number::from_f64(*f)
				.map(JsonValue::Number)
				.unwrap_or(JsonValue::Null),
			Value::String(s) => JsonValue::String(s.clone()),
			Value::DateTime(dt) => JsonValue::String(dt.to_rfc3339()),
			Value::Bytes(bytes) => JsonValue::String(String::from_utf8_lossy(bytes).into_owned()),
			Value::Json(json) => json.clone(),
			Value::Nullable(inner) => inner.clone().into_value().to_json(),
			Value::List(items) => JsonValue::Array(items.iter().map(Value::to_json).collect()),
			Value::Object(fields) => JsonValue::Object(
				fields
					.iter()
					.map(|(key, value)| (key.clone(), value.to_json()))
					.collect(),
			),
			Value::Custom(custom) => JsonValue::String(format!("{:?}", custom)),
		}
	}
}

impl From<&str> for Value {
	fn from(value: &str) -> Self {
		Value::String(value.to_string())
	}
}

impl From<String> for Value {
	fn from(value: String) -> Self {
		Value::String(value)
	}
}

impl From<bool> for Value {
	fn from(value: bool) -> Self {
		Value::Bool(value)
	}
}

impl From<i64> for Value {
	fn from(value: i64) -> Self {
		Value::Int(value)
	}
}

impl From<i32> for Value {
	fn from(value: i32) -> Self {
		Value::Int(i64::from(value))
	}
}

impl From<u64> for Value {
	fn from(value: u64) -> Self {
		Value::UInt(value)
	}
}

impl From<f64> for Value {
	fn from(value: f64) -> Self {
		Value::Float(value)
	}
}

impl From<DateTime<Utc>> for Value {
	fn from(value: DateTime<Utc>) -> Self {
		Value::DateTime(value)
	}
}

/// Kind of a nullable primitive wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NullableKind {
	Bool,
	Int16,
	Int32,
	Int64,
	Float64,
	String,
	Byte,
}

impl NullableKind {
	pub fn name(&self) -> &'static str {
		match self {
			NullableKind::Bool => "nullable bool",
			NullableKind::Int16 => "nullable int16",
			NullableKind::Int32 => "nullable int32",
			NullableKind::Int64 => "nullable int64",
			NullableKind::Float64 => "nullable float64",
			NullableKind::String => "nullable string",
			NullableKind::Byte => "nullable byte",
		}
	}
}

/// A nullable primitive: `None` is the invalid (SQL `NULL`) state.
#[derive(Debug, Clone, PartialEq)]
pub enum NullValue {
	Bool(Option<bool>),
	Int16(Option<i16>),
	Int32(Option<i32>),
	Int64(Option<i64>),
	Float64(Option<f64>),
	String(Option<String>),
	Byte(Option<u8>),
}

impl NullValue {
	/// The invalid wrapper of the given kind.
	pub fn invalid(kind: NullableKind) -> Self {
		match kind {
			NullableKind::Bool => NullValue::Bool(None),
			NullableKind::Int16 => NullValue::Int16(None),
			NullableKind::Int32 => NullValue::Int32(None),
			NullableKind::Int64 => NullValue::Int64(None),
			NullableKind::Float64 => NullValue::Float64(None),
			NullableKind::String => NullValue::String(None),
			NullableKind::Byte => NullValue::Byte(None),
		}
	}

	pub fn kind(&self) -> NullableKind {
		match self {
			NullValue::Bool(_) => NullableKind::Bool,
			NullValue::Int16(_) => NullableKind::Int16,
			NullValue::Int32(_) => NullableKind::Int32,
			NullValue::Int64(_) => NullableKind::Int64,
			NullValue::Float64(_) => NullableKind::Float64,
			NullValue::String(_) => NullableKind::String,
			NullValue::Byte(_) => NullableKind::Byte,
		}
	}

	pub fn is_valid(&self) -> bool {
		match self {
			NullValue::Bool(v) => v.is_some(),
			NullValue::Int16(v) => v.is_some(),
			NullValue::Int32(v) => v.is_some(),
			NullValue::Int64(v) => v.is_some(),
			NullValue::Float64(v) => v.is_some(),
			NullValue::String(v) => v.is_some(),
			NullValue::Byte(v) => v.is_some(),
		}
	}

	/// The inner scalar as a plain value, `Value::Null` when invalid.
	pub fn into_value(self) -> Value {
		match self {
			NullValue::Bool(v) => v.map(Value::Bool),
			NullValue::Int16(v) => v.map(|v| Value::Int(i64::from(v))),
			NullValue::Int32(v) => v.map(|v| Value::Int(i64::from(v))),
			NullValue::Int64(v) => v.map(Value::Int),
			NullValue::Float64(v) => v.map(Value::Float),
			NullValue::String(v) => v.map(Value::String),
			NullValue::Byte(v) => v.map(|v| Value::UInt(u64::from(v))),
		}
		.unwrap_or(Value::Null)
	}
}

/// An opaque value of a user-defined field type.
#[derive(Clone)]
pub struct CustomValue {
	inner: Arc<dyn Any + Send + Sync>,
	type_name: &'static str,
	eq: fn(&dyn Any, &dyn Any) -> bool,
	debug: fn(&dyn Any, &mut fmt::Formatter<'_>) -> fmt::Result,
}

fn eq_any<T: Any + PartialEq>(left: &dyn Any, right: &dyn Any) -> bool {
	match (left.downcast_ref::<T>(), right.downcast_ref::<T>()) {
		(Some(left), Some(right)) => left == right,
		_ => false,
	}
}

fn debug_any<T: Any + fmt::Debug>(value: &dyn Any, f: &mut fmt::Formatter<'_>) -> fmt::Result {
	match value.downcast_ref::<T>() {
		Some(value) => value.fmt(f),
		None => f.write_str("<custom>"),
	}
}

impl CustomValue {
	pub fn new<T>(value: T) -> Self
	where
		T: Any + Send + Sync + PartialEq + fmt::Debug,
	{
		Self {
			inner: Arc::new(value),
			type_name: std::any::type_name::<T>(),
			eq: eq_any::<T>,
			debug: debug_any::<T>,
		}
	}

	pub fn type_name(&self) -> &'static str {
		self.type_name
	}

	pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
		let inner: &dyn Any = &*self.inner;
		inner.downcast_ref::<T>()
	}
}

impl PartialEq for CustomValue {
	fn eq(&self, other: &Self) -> bool {
		let left: &dyn Any = &*self.inner;
		let right: &dyn Any = &*other.inner;
		(self.eq)(left, right)
	}
}

impl fmt::Debug for CustomValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let inner: &dyn Any = &*self.inner;
		(self.debug)(inner, f)
	}
}

/// Name of a JSON value's kind, used in type mismatch messages.
pub fn json_kind(value: &JsonValue) -> &'static str {
	match value {
		JsonValue::Null => "null",
		JsonValue::Bool(_) => "bool",
		JsonValue::Number(_) => "number",
		JsonValue::String(_) => "string",
		JsonValue::Array(_) => "array",
		JsonValue::Object(_) => "object",
	}
}
