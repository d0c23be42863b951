//! [`FieldType`] implementations for the built-in field types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::value::json_kind;
use super::{
	Capabilities, ConvertError, FieldType, NullValue, NullableKind, Parsable, Representable, Value,
};
use crate::reflect::Model;

/// Wire format of date-time values.
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Renders a date-time in the wire format.
pub fn format_date_time(value: &DateTime<Utc>) -> String {
	value.format(DATE_TIME_FORMAT).to_string()
}

/// Parses a strict RFC 3339 timestamp.
///
/// chrono accepts a space or a lowercase `t` as the date/time separator, a
/// lowercase `z` and a leap second. None of these are valid on the wire.
pub fn parse_date_time(text: &str) -> Result<DateTime<Utc>, ConvertError> {
	if let Some(reason) = strict_rfc3339_violation(text) {
		return Err(ConvertError::invalid(format!(
			"parsing time \"{text}\" as RFC3339: {reason}"
		)));
	}
	DateTime::parse_from_rfc3339(text)
		.map(|parsed| parsed.with_timezone(&Utc))
		.map_err(|err| ConvertError::invalid(format!("parsing time \"{text}\" as RFC3339: {err}")))
}

fn strict_rfc3339_violation(text: &str) -> Option<&'static str> {
	let bytes = text.as_bytes();
	if bytes.len() < 20 {
		return None;
	}
	if bytes[10] != b'T' {
		return Some("date and time must be separated by `T`");
	}
	if &bytes[17..19] == b"60" {
		return Some("second out of range");
	}
	if bytes.ends_with(b"Z") {
		return None;
	}
	let offset = &bytes[bytes.len() - 6..];
	let numeric = matches!(offset[0], b'+' | b'-')
		&& offset[3] == b':'
		&& [1, 2, 4, 5].iter().all(|&i| offset[i].is_ascii_digit());
	if numeric {
		None
	} else {
		Some("offset must be `Z` or `±hh:mm`")
	}
}

/// A JSON document stored in a single column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JsonBlob(pub JsonValue);

impl JsonBlob {
	pub fn new(value: JsonValue) -> Self {
		Self(value)
	}

	pub fn into_inner(self) -> JsonValue {
		self.0
	}
}

fn mismatch(expected: &str, found: &Value) -> ConvertError {
	ConvertError::type_mismatch(expected, found.kind_name())
}

impl FieldType for String {
	fn into_value(self) -> Value {
		Value::String(self)
	}

	fn from_value(value: &Value) -> Result<Self, ConvertError> {
		match value {
			Value::String(s) => Ok(s.clone()),
			Value::Nullable(NullValue::String(Some(s))) => Ok(s.clone()),
			other => Err(mismatch("string", other)),
		}
	}
}

impl FieldType for bool {
	fn into_value(self) -> Value {
		Value::Bool(self)
	}

	fn from_value(value: &Value) -> Result<Self, ConvertError> {
		match value {
			Value::Bool(b) => Ok(*b),
			Value::Int(0) | Value::UInt(0) => Ok(false),
			Value::Int(1) | Value::UInt(1) => Ok(true),
			other => Err(mismatch("bool", other)),
		}
	}

	fn capabilities() -> Capabilities {
		Capabilities::new().scanner(|stored| match stored {
			Value::Int(i) => Ok(Value::Bool(*i != 0)),
			Value::UInt(u) => Ok(Value::Bool(*u != 0)),
			other => Ok(other.clone()),
		})
	}
}

macro_rules! signed_field_type {
	($($ty:ty),* $(,)?) => {
		$(
			impl FieldType for $ty {
				fn into_value(self) -> Value {
					Value::Int(self as i64)
				}

				fn from_value(value: &Value) -> Result<Self, ConvertError> {
					let out_of_range = |v: String| ConvertError::OutOfRange {
						value: v,
						target: stringify!($ty),
					};
					match value {
						Value::Int(i) => <$ty>::try_from(*i).map_err(|_| out_of_range(i.to_string())),
						Value::UInt(u) => <$ty>::try_from(*u).map_err(|_| out_of_range(u.to_string())),
						other => Err(mismatch("int", other)),
					}
				}
			}
		)*
	};
}

macro_rules! unsigned_field_type {
	($($ty:ty),* $(,)?) => {
		$(
			impl FieldType for $ty {
				fn into_value(self) -> Value {
					Value::UInt(self as u64)
				}

				fn from_value(value: &Value) -> Result<Self, ConvertError> {
					let out_of_range = |v: String| ConvertError::OutOfRange {
						value: v,
						target: stringify!($ty),
					};
					match value {
						Value::UInt(u) => <$ty>::try_from(*u).map_err(|_| out_of_range(u.to_string())),
						Value::Int(i) if *i < 0 => Err(ConvertError::Negative(i.to_string())),
						Value::Int(i) => <$ty>::try_from(*i).map_err(|_| out_of_range(i.to_string())),
						other => Err(mismatch("uint", other)),
					}
				}

				fn capabilities() -> Capabilities {
					Capabilities::new().scanner(|stored| match stored {
						Value::Int(i) if *i >= 0 => Ok(Value::UInt(*i as u64)),
						Value::Int(i) => Err(ConvertError::Negative(i.to_string())),
						other => Ok(other.clone()),
					})
				}
			}
		)*
	};
}

signed_field_type!(i8, i16, i32, i64, isize);
unsigned_field_type!(u8, u16, u32, u64, usize);

macro_rules! float_field_type {
	($($ty:ty),* $(,)?) => {
		$(
			impl FieldType for $ty {
				fn into_value(self) -> Value {
					Value::Float(self as f64)
				}

				fn from_value(value: &Value) -> Result<Self, ConvertError> {
					match value {
						Value::Float(f) => Ok(*f as $ty),
						Value::Int(i) => Ok(*i as $ty),
						Value::UInt(u) => Ok(*u as $ty),
						other => Err(mismatch("float", other)),
					}
				}

				fn capabilities() -> Capabilities {
					Capabilities::new().scanner(|stored| match stored {
						Value::Int(i) => Ok(Value::Float(*i as f64)),
						other => Ok(other.clone()),
					})
				}
			}
		)*
	};
}

float_field_type!(f32, f64);

impl FieldType for DateTime<Utc> {
	fn into_value(self) -> Value {
		Value::DateTime(self)
	}

	fn from_value(value: &Value) -> Result<Self, ConvertError> {
		match value {
			Value::DateTime(dt) => Ok(*dt),
			Value::String(text) => parse_date_time(text),
			other => Err(mismatch("datetime", other)),
		}
	}

	fn capabilities() -> Capabilities {
		Capabilities::new()
			.date_time()
			.scanner(|stored| match stored {
				Value::String(text) => parse_date_time(text).map(Value::DateTime),
				other => Ok(other.clone()),
			})
			.valuer(|value| match value {
				Value::DateTime(dt) => Ok(Value::String(dt.to_rfc3339())),
				other => Ok(other.clone()),
			})
	}
}

impl FieldType for Uuid {
	fn into_value(self) -> Value {
		Value::String(self.hyphenated().to_string())
	}

	fn from_value(value: &Value) -> Result<Self, ConvertError> {
		match value {
			Value::String(text) => {
				Uuid::parse_str(text).map_err(|err| ConvertError::invalid(err.to_string()))
			}
			Value::Bytes(bytes) => {
				Uuid::from_slice(bytes).map_err(|err| ConvertError::invalid(err.to_string()))
			}
			other => Err(mismatch("uuid", other)),
		}
	}

	fn capabilities() -> Capabilities {
		Capabilities::new().scanner(|stored| match stored {
			Value::Bytes(bytes) => Uuid::from_slice(bytes)
				.map(FieldType::into_value)
				.map_err(|err| ConvertError::invalid(err.to_string())),
			other => Ok(other.clone()),
		})
	}
}

fn decode_blob(stored: &Value) -> Result<Value, ConvertError> {
	match stored {
		Value::String(text) => serde_json::from_str(text)
			.map(Value::Json)
			.map_err(|err| ConvertError::invalid(err.to_string())),
		Value::Bytes(bytes) => serde_json::from_slice(bytes)
			.map(Value::Json)
			.map_err(|err| ConvertError::invalid(err.to_string())),
		other => Ok(other.clone()),
	}
}

fn encode_json(value: &JsonValue) -> Result<Value, ConvertError> {
	serde_json::to_string(value)
		.map(Value::String)
		.map_err(|err| ConvertError::invalid(err.to_string()))
}

impl FieldType for JsonBlob {
	fn into_value(self) -> Value {
		Value::Json(self.0)
	}

	fn from_value(value: &Value) -> Result<Self, ConvertError> {
		match decode_blob(value)? {
			Value::Json(json) => Ok(JsonBlob(json)),
			other => Err(mismatch("json", &other)),
		}
	}

	fn capabilities() -> Capabilities {
		Capabilities::new()
			.json_blob()
			.scanner(decode_blob)
			.valuer(|value| match value {
				Value::Json(json) => encode_json(json),
				other => Ok(other.clone()),
			})
	}
}

fn scan_nullable(kind: NullableKind, stored: &Value) -> Result<Value, ConvertError> {
	if stored.is_null() {
		return Ok(Value::Nullable(NullValue::invalid(kind)));
	}
	if let Value::Nullable(_) = stored {
		return Ok(stored.clone());
	}
	let wrapped = match kind {
		NullableKind::Bool => NullValue::Bool(Some(bool::from_value(stored)?)),
		NullableKind::Int16 => NullValue::Int16(Some(i16::from_value(stored)?)),
		NullableKind::Int32 => NullValue::Int32(Some(i32::from_value(stored)?)),
		NullableKind::Int64 => NullValue::Int64(Some(i64::from_value(stored)?)),
		NullableKind::Float64 => NullValue::Float64(Some(f64::from_value(stored)?)),
		NullableKind::String => NullValue::String(Some(String::from_value(stored)?)),
		NullableKind::Byte => NullValue::Byte(Some(u8::from_value(stored)?)),
	};
	Ok(Value::Nullable(wrapped))
}

macro_rules! nullable_field_type {
	($($ty:ty => $variant:ident),* $(,)?) => {
		$(
			impl FieldType for Option<$ty> {
				fn into_value(self) -> Value {
					Value::Nullable(NullValue::$variant(self))
				}

				fn from_value(value: &Value) -> Result<Self, ConvertError> {
					match value {
						Value::Nullable(NullValue::$variant(inner)) => Ok(inner.clone()),
						Value::Nullable(other) => Err(ConvertError::type_mismatch(
							NullableKind::$variant.name(),
							other.kind().name(),
						)),
						Value::Null => Ok(None),
						other => <$ty as FieldType>::from_value(other).map(Some),
					}
				}

				fn capabilities() -> Capabilities {
					Capabilities::new()
						.nullable(NullableKind::$variant)
						.scanner(|stored| scan_nullable(NullableKind::$variant, stored))
						.valuer(|value| match value {
							Value::Nullable(inner) => Ok(inner.clone().into_value()),
							other => Ok(other.clone()),
						})
				}
			}
		)*
	};
}

nullable_field_type!(
	bool => Bool,
	i16 => Int16,
	i32 => Int32,
	i64 => Int64,
	f64 => Float64,
	String => String,
	u8 => Byte,
);

/// Scalar types allowed as items of slice fields.
pub trait SliceItem: FieldType + Clone {
	const ITEM_NAME: &'static str;

	fn item_from_json(value: &JsonValue) -> Option<Self>;

	fn item_to_json(&self) -> JsonValue;
}

impl SliceItem for String {
	const ITEM_NAME: &'static str = "string";

	fn item_from_json(value: &JsonValue) -> Option<Self> {
		value.as_str().map(str::to_string)
	}

	fn item_to_json(&self) -> JsonValue {
		JsonValue::String(self.clone())
	}
}

impl SliceItem for bool {
	const ITEM_NAME: &'static str = "bool";

	fn item_from_json(value: &JsonValue) -> Option<Self> {
		value.as_bool()
	}

	fn item_to_json(&self) -> JsonValue {
		JsonValue::Bool(*self)
	}
}

impl SliceItem for i64 {
	const ITEM_NAME: &'static str = "int64";

	fn item_from_json(value: &JsonValue) -> Option<Self> {
		value.as_i64()
	}

	fn item_to_json(&self) -> JsonValue {
		JsonValue::from(*self)
	}
}

impl SliceItem for i32 {
	const ITEM_NAME: &'static str = "int32";

	fn item_from_json(value: &JsonValue) -> Option<Self> {
		value.as_i64().and_then(|i| i32::try_from(i).ok())
	}

	fn item_to_json(&self) -> JsonValue {
		JsonValue::from(*self)
	}
}

impl SliceItem for f64 {
	const ITEM_NAME: &'static str = "float64";

	fn item_from_json(value: &JsonValue) -> Option<Self> {
		value.as_f64()
	}

	fn item_to_json(&self) -> JsonValue {
		serde_json::Number::from_f64(*self)
			.map(JsonValue::Number)
			.unwrap_or(JsonValue::Null)
	}
}

fn slice_from_value<T: SliceItem>(value: &Value) -> Result<Vec<T>, ConvertError> {
	match value {
		Value::List(items) => items.iter().map(T::from_value).collect(),
		Value::Json(JsonValue::Array(items)) => slice_from_json::<T>(items),
		Value::String(text) => match serde_json::from_str::<JsonValue>(text) {
			Ok(JsonValue::Array(items)) => slice_from_json::<T>(&items),
			Ok(other) => Err(ConvertError::type_mismatch("array", json_kind(&other))),
			Err(err) => Err(ConvertError::invalid(err.to_string())),
		},
		Value::Null => Ok(Vec::new()),
		other => Err(mismatch("list", other)),
	}
}

fn slice_from_json<T: SliceItem>(items: &[JsonValue]) -> Result<Vec<T>, ConvertError> {
	items
		.iter()
		.enumerate()
		.map(|(index, item)| {
			T::item_from_json(item).ok_or_else(|| {
				ConvertError::invalid(format!("[{index}] is not a valid {}", T::ITEM_NAME))
			})
		})
		.collect()
}

macro_rules! slice_field_type {
	($($ty:ty),* $(,)?) => {
		$(
			impl FieldType for Vec<$ty> {
				fn into_value(self) -> Value {
					Value::List(self.into_iter().map(FieldType::into_value).collect())
				}

				fn from_value(value: &Value) -> Result<Self, ConvertError> {
					slice_from_value::<$ty>(value)
				}

				fn capabilities() -> Capabilities {
					Capabilities::new()
						.representable::<Self>()
						.parsable::<Self>()
						.scanner(|stored| {
							slice_from_value::<$ty>(stored).map(FieldType::into_value)
						})
						.valuer(|value| {
							let items = slice_from_value::<$ty>(value)?;
							encode_json(&JsonValue::Array(
								items.iter().map(SliceItem::item_to_json).collect(),
							))
						})
				}
			}
		)*
	};
}

slice_field_type!(String, bool, i64, i32, f64);

impl<T: SliceItem> Representable for Vec<T> {
	fn to_representation(&self) -> Result<JsonValue, ConvertError> {
		Ok(JsonValue::Array(self.iter().map(SliceItem::item_to_json).collect()))
	}
}

impl<T: SliceItem> Parsable for Vec<T> {
	fn from_representation(value: &JsonValue) -> Result<Self, ConvertError> {
		match value {
			JsonValue::Array(items) => slice_from_json::<T>(items),
			other => Err(ConvertError::type_mismatch("array", json_kind(other))),
		}
	}
}

/// Parses a JSON array into a typed slice value, naming the failing index.
pub fn parse_slice<T: SliceItem>(value: &JsonValue) -> Result<Value, ConvertError> {
	match value {
		JsonValue::Array(items) => {
			slice_from_json::<T>(items).map(|items| Value::List(items.into_iter().map(FieldType::into_value).collect()))
		}
		other => Err(ConvertError::type_mismatch("array", json_kind(other))),
	}
}

/// Renders a typed slice value as a JSON array.
pub fn render_slice<T: SliceItem>(value: &Value) -> Result<JsonValue, ConvertError> {
	let items = slice_from_value::<T>(value)?;
	Ok(JsonValue::Array(items.iter().map(SliceItem::item_to_json).collect()))
}

impl<M: Model> FieldType for Option<M> {
	fn into_value(self) -> Value {
		match self {
			Some(model) => Value::Object(model.into_internal_value()),
			None => Value::Null,
		}
	}

	fn from_value(value: &Value) -> Result<Self, ConvertError> {
		match value {
			Value::Null => Ok(None),
			Value::Object(fields) => M::from_internal_value(fields).map(Some),
			other => Err(mismatch("object", other)),
		}
	}
}

impl<M: Model> FieldType for Vec<M> {
	fn into_value(self) -> Value {
		Value::List(
			self.into_iter()
				.map(|model| Value::Object(model.into_internal_value()))
				.collect(),
		)
	}

	fn from_value(value: &Value) -> Result<Self, ConvertError> {
		match value {
			Value::Null => Ok(Vec::new()),
			Value::List(items) => items
				.iter()
				.map(|item| match item {
					Value::Object(fields) => M::from_internal_value(fields),
					other => Err(mismatch("object", other)),
				})
				.collect(),
			other => Err(mismatch("list", other)),
		}
	}
}
