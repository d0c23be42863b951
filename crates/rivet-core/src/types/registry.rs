//! Type registry mapping field types to wire conversions.
//!
//! The registry is the fallback used by the detector chains for primitive
//! types. Host applications extend it with [`register`] to teach Rivet about
//! types that do not declare their own capabilities, such as decimals from a
//! third-party crate.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::{RwLock, RwLockReadGuard};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use super::builtin::{JsonBlob, format_date_time, parse_date_time};
use super::field_type::{ParseFn, TypeKey, WireFn};
use super::value::json_kind;
use super::{ConvertError, Value};

/// Errors raised by registry lookups.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
	#[error("No type mapper registered for type `{0}`")]
	NotRegistered(String),
}

/// Pair of conversions registered for one type.
#[derive(Clone)]
pub struct TypeMapping {
	pub to_wire: WireFn,
	pub to_internal: ParseFn,
}

impl TypeMapping {
	pub fn new<W, P>(to_wire: W, to_internal: P) -> Self
	where
		W: Fn(&Value) -> Result<JsonValue, ConvertError> + Send + Sync + 'static,
		P: Fn(&JsonValue) -> Result<Value, ConvertError> + Send + Sync + 'static,
	{
		Self {
			to_wire: Arc::new(to_wire),
			to_internal: Arc::new(to_internal),
		}
	}
}

impl fmt::Debug for TypeMapping {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TypeMapping").finish_non_exhaustive()
	}
}

/// Registry of type mappings keyed by [`TypeKey`].
///
/// # Examples
///
/// ```
/// use rivet_core::{TypeKey, TypeRegistry};
///
/// let registry = TypeRegistry::with_defaults();
/// let parse = registry.to_internal(TypeKey::of::<i32>()).unwrap();
/// assert!(parse(&serde_json::json!(1.5)).is_err());
/// assert!(registry.to_wire(TypeKey::of::<Vec<u8>>()).is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
	mappings: HashMap<TypeKey, TypeMapping>,
}

impl TypeRegistry {
	/// A registry without any mapping.
	pub fn empty() -> Self {
		Self::default()
	}

	/// A registry with mappings for strings, numbers, booleans, date-times,
	/// UUIDs and JSON blobs.
	pub fn with_defaults() -> Self {
		let mut registry = Self::empty();
		registry.register::<String>(TypeMapping::new(
			|value| match value {
				Value::String(s) => Ok(JsonValue::String(s.clone())),
				other => Err(ConvertError::type_mismatch("string", other.kind_name())),
			},
			|raw| match raw {
				JsonValue::String(s) => Ok(Value::String(s.clone())),
				other => Err(ConvertError::type_mismatch("string", json_kind(other))),
			},
		));
		registry.register::<bool>(TypeMapping::new(
			|value| match value {
				Value::Bool(b) => Ok(JsonValue::Bool(*b)),
				other => Err(ConvertError::type_mismatch("bool", other.kind_name())),
			},
			|raw| match raw {
				JsonValue::Bool(b) => Ok(Value::Bool(*b)),
				other => Err(ConvertError::type_mismatch("bool", json_kind(other))),
			},
		));
		registry.register::<f64>(float_mapping());
		registry.register::<f32>(float_mapping());

		registry.register::<i8>(signed_mapping(i64::from(i8::MIN), i64::from(i8::MAX), "i8"));
		registry.register::<i16>(signed_mapping(i64::from(i16::MIN), i64::from(i16::MAX), "i16"));
		registry.register::<i32>(signed_mapping(i64::from(i32::MIN), i64::from(i32::MAX), "i32"));
		registry.register::<i64>(signed_mapping(i64::MIN, i64::MAX, "i64"));
		registry.register::<isize>(signed_mapping(i64::MIN, i64::MAX, "isize"));

		registry.register::<u8>(unsigned_mapping(u64::from(u8::MAX), "u8"));
		registry.register::<u16>(unsigned_mapping(u64::from(u16::MAX), "u16"));
		registry.register::<u32>(unsigned_mapping(u64::from(u32::MAX), "u32"));
		registry.register::<u64>(unsigned_mapping(u64::MAX, "u64"));
		registry.register::<usize>(unsigned_mapping(u64::MAX, "usize"));

		registry.register::<DateTime<Utc>>(TypeMapping::new(
			|value| match value {
				Value::DateTime(dt) => Ok(JsonValue::String(format_date_time(dt))),
				other => Err(ConvertError::type_mismatch("datetime", other.kind_name())),
			},
			|raw| match raw {
				JsonValue::String(text) => parse_date_time(text).map(Value::DateTime),
				other => Err(ConvertError::type_mismatch("string", json_kind(other))),
			},
		));
		registry.register::<Uuid>(TypeMapping::new(
			|value| match value {
				Value::String(s) => Ok(JsonValue::String(s.clone())),
				other => Err(ConvertError::type_mismatch("uuid", other.kind_name())),
			},
			|raw| match raw {
				JsonValue::String(text) => Uuid::parse_str(text)
					.map(|id| Value::String(id.hyphenated().to_string()))
					.map_err(|err| ConvertError::invalid(err.to_string())),
				other => Err(ConvertError::type_mismatch("string", json_kind(other))),
			},
		));
		registry.register::<JsonBlob>(TypeMapping::new(
			|value| match value {
				Value::Json(json) => Ok(json.clone()),
				other => Ok(other.to_json()),
			},
			|raw| Ok(Value::Json(raw.clone())),
		));
		registry
	}

	/// Registers or replaces the mapping of `T`.
	pub fn register<T: 'static>(&mut self, mapping: TypeMapping) {
		self.register_key(TypeKey::of::<T>(), mapping);
	}

	pub fn register_key(&mut self, key: TypeKey, mapping: TypeMapping) {
		self.mappings.insert(key, mapping);
	}

	pub fn contains(&self, key: TypeKey) -> bool {
		self.mappings.contains_key(&key)
	}

	/// The internal-to-wire conversion of a type; errors name the type.
	pub fn to_wire(&self, key: TypeKey) -> Result<WireFn, RegistryError> {
		let mapping = self
			.mappings
			.get(&key)
			.ok_or_else(|| RegistryError::NotRegistered(key.name().to_string()))?;
		let inner = mapping.to_wire.clone();
		let type_name = key.name();
		Ok(Arc::new(move |value: &Value| {
			inner(value).map_err(|err| err.in_mapper(type_name))
		}))
	}

	/// The wire-to-internal conversion of a type; errors name the type.
	pub fn to_internal(&self, key: TypeKey) -> Result<ParseFn, RegistryError> {
		let mapping = self
			.mappings
			.get(&key)
			.ok_or_else(|| RegistryError::NotRegistered(key.name().to_string()))?;
		let inner = mapping.to_internal.clone();
		let type_name = key.name();
		Ok(Arc::new(move |raw: &JsonValue| {
			inner(raw).map_err(|err| err.in_mapper(type_name))
		}))
	}
}

fn float_mapping() -> TypeMapping {
	TypeMapping::new(
		|value| match value {
			Value::Float(f) => serde_json::Number::from_f64(*f)
				.map(JsonValue::Number)
				.ok_or_else(|| ConvertError::invalid(format!("Value {f} is not a finite number"))),
			Value::Int(i) => Ok(JsonValue::from(*i)),
			Value::UInt(u) => Ok(JsonValue::from(*u)),
			other => Err(ConvertError::type_mismatch("float", other.kind_name())),
		},
		|raw| match raw {
			JsonValue::Number(n) => n
				.as_f64()
				.map(Value::Float)
				.ok_or_else(|| ConvertError::invalid(format!("Value {n} is not a float"))),
			other => Err(ConvertError::type_mismatch("number", json_kind(other))),
		},
	)
}

fn integer_to_wire(value: &Value) -> Result<JsonValue, ConvertError> {
	match value {
		Value::Int(i) => Ok(JsonValue::from(*i)),
		Value::UInt(u) => Ok(JsonValue::from(*u)),
		other => Err(ConvertError::type_mismatch("int", other.kind_name())),
	}
}

/// Reads a JSON number as an integer, accepting integral floats.
pub fn integer_from_json(raw: &JsonValue) -> Result<i128, ConvertError> {
	let JsonValue::Number(number) = raw else {
		return Err(ConvertError::type_mismatch("number", json_kind(raw)));
	};
	if let Some(i) = number.as_i64() {
		return Ok(i128::from(i));
	}
	if let Some(u) = number.as_u64() {
		return Ok(i128::from(u));
	}
	match number.as_f64() {
		Some(f) if f.fract() == 0.0 && f.abs() < 1e38 => Ok(f as i128),
		_ => Err(ConvertError::NotAnInteger(number.to_string())),
	}
}

fn signed_mapping(min: i64, max: i64, target: &'static str) -> TypeMapping {
	TypeMapping::new(integer_to_wire, move |raw| {
		let value = integer_from_json(raw)?;
		if value < i128::from(min) || value > i128::from(max) {
			return Err(ConvertError::OutOfRange {
				value: value.to_string(),
				target,
			});
		}
		Ok(Value::Int(value as i64))
	})
}

fn unsigned_mapping(max: u64, target: &'static str) -> TypeMapping {
	TypeMapping::new(integer_to_wire, move |raw| {
		let value = integer_from_json(raw)?;
		if value < 0 {
			return Err(ConvertError::Negative(value.to_string()));
		}
		if value > i128::from(max) {
			return Err(ConvertError::OutOfRange {
				value: value.to_string(),
				target,
			});
		}
		Ok(Value::UInt(value as u64))
	})
}

static GLOBAL: Lazy<RwLock<TypeRegistry>> = Lazy::new(|| RwLock::new(TypeRegistry::with_defaults()));

/// The process-wide registry used when a serializer is not given its own.
pub fn global() -> RwLockReadGuard<'static, TypeRegistry> {
	GLOBAL.read()
}

/// Registers a mapping in the process-wide registry.
///
/// Serializers resolve converters when they are built, so registrations must
/// happen before the serializers that need them are constructed.
pub fn register<T: 'static>(mapping: TypeMapping) {
	tracing::debug!(type_name = std::any::type_name::<T>(), "registering type mapping");
	GLOBAL.write().register::<T>(mapping);
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use serde_json::json;
	use serial_test::serial;

	#[rstest]
	#[case(TypeKey::of::<i16>(), json!(12), Ok(Value::Int(12)))]
	#[case(TypeKey::of::<i64>(), json!(3.0), Ok(Value::Int(3)))]
	#[case(TypeKey::of::<u32>(), json!(7), Ok(Value::UInt(7)))]
	#[case(TypeKey::of::<String>(), json!("x"), Ok(Value::from("x")))]
	#[case(TypeKey::of::<bool>(), json!(false), Ok(Value::Bool(false)))]
	#[case(TypeKey::of::<f64>(), json!(2.5), Ok(Value::Float(2.5)))]
	fn test_default_to_internal(
		#[case] key: TypeKey,
		#[case] raw: JsonValue,
		#[case] expected: Result<Value, ()>,
	) {
		let registry = TypeRegistry::with_defaults();
		let parse = registry.to_internal(key).unwrap();
		assert_eq!(parse(&raw).map_err(|_| ()), expected);
	}

	#[rstest]
	#[case(TypeKey::of::<i16>(), json!(40000), "Value 40000 is out of range for `i16`")]
	#[case(TypeKey::of::<i32>(), json!(1.5), "Value 1.5 is not an integer")]
	#[case(TypeKey::of::<u8>(), json!(-1), "Value -1 is negative")]
	#[case(TypeKey::of::<String>(), json!(1.5), "Expected type `string`, got `number`")]
	#[case(TypeKey::of::<bool>(), json!("true"), "Expected type `bool`, got `string`")]
	fn test_default_to_internal_errors(
		#[case] key: TypeKey,
		#[case] raw: JsonValue,
		#[case] message: &str,
	) {
		let registry = TypeRegistry::with_defaults();
		let err = registry.to_internal(key).unwrap()(&raw).unwrap_err();
		match err {
			ConvertError::Mapper { source, type_name } => {
				assert_eq!(type_name, key.name());
				assert_eq!(source.to_string(), message);
			}
			other => panic!("unexpected error {other:?}"),
		}
	}

	#[rstest]
	fn test_lookup_miss_is_an_error() {
		let registry = TypeRegistry::empty();
		assert_eq!(
			registry.to_wire(TypeKey::of::<String>()).err(),
			Some(RegistryError::NotRegistered("alloc::string::String".into()))
		);
	}

	#[rstest]
	fn test_register_replaces_mapping() {
		let mut registry = TypeRegistry::with_defaults();
		registry.register::<String>(TypeMapping::new(
			|_| Ok(json!("redacted")),
			|raw| Ok(Value::String(raw.to_string())),
		));
		let render = registry.to_wire(TypeKey::of::<String>()).unwrap();
		assert_eq!(render(&Value::from("secret")).unwrap(), json!("redacted"));
	}

	struct Celsius;

	#[rstest]
	#[serial]
	fn test_global_registration() {
		assert!(global().to_wire(TypeKey::of::<Celsius>()).is_err());

		register::<Celsius>(TypeMapping::new(
			|value| Ok(json!({ "celsius": value.to_json() })),
			|raw| Ok(Value::from_json(&raw["celsius"])),
		));

		let render = global().to_wire(TypeKey::of::<Celsius>()).unwrap();
		assert_eq!(render(&Value::Float(21.5)).unwrap(), json!({"celsius": 21.5}));
		let parse = global().to_internal(TypeKey::of::<Celsius>()).unwrap();
		assert_eq!(parse(&json!({"celsius": 3})).unwrap(), Value::Int(3));
	}

	#[rstest]
	fn test_date_time_mapping_rejects_numbers() {
		let registry = TypeRegistry::with_defaults();
		let parse = registry.to_internal(TypeKey::of::<DateTime<Utc>>()).unwrap();
		assert!(parse(&json!(1700000000)).is_err());
		assert!(parse(&json!("2024-01-01T00:00:00Z")).is_ok());
	}
}
