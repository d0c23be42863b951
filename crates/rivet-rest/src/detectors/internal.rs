//! Strategies of the internal value chain.

use std::sync::Arc;

use rivet_core::types::registry::integer_from_json;
use rivet_core::types::{ParseFn, json_kind, parse_date_time};
use rivet_core::{ConvertError, FieldSettings, NullValue, NullableKind, TypeRegistry, Value};
use serde_json::Value as JsonValue;

use super::InternalValueStrategy;

/// Uses the type's own [`Parsable`](rivet_core::Parsable) impl.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelfParsable;

impl InternalValueStrategy for SelfParsable {
	fn name(&self) -> &'static str {
		"self_parsable"
	}

	fn detect(&self, settings: &FieldSettings<'_>, _registry: &TypeRegistry) -> Option<ParseFn> {
		settings.capabilities().parsable_fn().cloned()
	}
}

/// Parses strict RFC 3339 strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateTimeParser;

impl InternalValueStrategy for DateTimeParser {
	fn name(&self) -> &'static str {
		"date_time"
	}

	fn detect(&self, settings: &FieldSettings<'_>, _registry: &TypeRegistry) -> Option<ParseFn> {
		if !settings.is_date_time() {
			return None;
		}
		Some(Arc::new(|raw: &JsonValue| match raw {
			JsonValue::String(text) => parse_date_time(text).map(Value::DateTime),
			other => Err(ConvertError::type_mismatch("string", json_kind(other))),
		}))
	}
}

/// Looks the field type up in the type registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryParser;

impl InternalValueStrategy for RegistryParser {
	fn name(&self) -> &'static str {
		"type_registry"
	}

	fn detect(&self, settings: &FieldSettings<'_>, registry: &TypeRegistry) -> Option<ParseFn> {
		registry.to_internal(settings.type_key()).ok()
	}
}

/// Parses strings through the type's `FromStr` impl.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextUnmarshaler;

impl InternalValueStrategy for TextUnmarshaler {
	fn name(&self) -> &'static str {
		"text_unmarshaler"
	}

	fn detect(&self, settings: &FieldSettings<'_>, _registry: &TypeRegistry) -> Option<ParseFn> {
		settings.capabilities().text_unmarshal_fn().cloned()
	}
}

/// Builds nullable wrappers: `null` gives the invalid wrapper.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullableParser;

impl InternalValueStrategy for NullableParser {
	fn name(&self) -> &'static str {
		"nullable"
	}

	fn detect(&self, settings: &FieldSettings<'_>, _registry: &TypeRegistry) -> Option<ParseFn> {
		let kind = settings.nullable_kind()?;
		Some(Arc::new(move |raw: &JsonValue| {
			parse_nullable(kind, raw).map(Value::Nullable)
		}))
	}
}

fn narrow<T: TryFrom<i128>>(raw: &JsonValue, target: &'static str) -> Result<T, ConvertError> {
	let value = integer_from_json(raw)?;
	T::try_from(value).map_err(|_| ConvertError::OutOfRange {
		value: value.to_string(),
		target,
	})
}

fn parse_nullable(kind: NullableKind, raw: &JsonValue) -> Result<NullValue, ConvertError> {
	if raw.is_null() {
		return Ok(NullValue::invalid(kind));
	}
	let mismatch = || ConvertError::type_mismatch(kind.name(), json_kind(raw));
	match kind {
		NullableKind::Bool => raw
			.as_bool()
			.map(|b| NullValue::Bool(Some(b)))
			.ok_or_else(mismatch),
		NullableKind::Int16 if raw.is_number() => narrow(raw, "i16").map(|i| NullValue::Int16(Some(i))),
		NullableKind::Int32 if raw.is_number() => narrow(raw, "i32").map(|i| NullValue::Int32(Some(i))),
		NullableKind::Int64 if raw.is_number() => narrow(raw, "i64").map(|i| NullValue::Int64(Some(i))),
		NullableKind::Float64 => raw
			.as_f64()
			.map(|f| NullValue::Float64(Some(f)))
			.ok_or_else(mismatch),
		NullableKind::String => raw
			.as_str()
			.map(|s| NullValue::String(Some(s.to_string())))
			.ok_or_else(mismatch),
		NullableKind::Byte => {
			let text = raw.as_str().ok_or_else(mismatch)?;
			match text.as_bytes() {
				[byte] => Ok(NullValue::Byte(Some(*byte))),
				_ => Err(ConvertError::invalid(format!(
					"Expected a single character, got \"{text}\""
				))),
			}
		}
		NullableKind::Int16 | NullableKind::Int32 | NullableKind::Int64 => Err(mismatch()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use serde_json::json;

	#[rstest]
	#[case(NullableKind::Bool, json!(null), NullValue::Bool(None))]
	#[case(NullableKind::Bool, json!(true), NullValue::Bool(Some(true)))]
	#[case(NullableKind::Int16, json!(-12), NullValue::Int16(Some(-12)))]
	#[case(NullableKind::Int32, json!(70000), NullValue::Int32(Some(70000)))]
	#[case(NullableKind::Int64, json!(4.0), NullValue::Int64(Some(4)))]
	#[case(NullableKind::Float64, json!(2), NullValue::Float64(Some(2.0)))]
	#[case(NullableKind::String, json!("x"), NullValue::String(Some("x".into())))]
	#[case(NullableKind::Byte, json!("z"), NullValue::Byte(Some(b'z')))]
	#[case(NullableKind::Byte, json!(null), NullValue::Byte(None))]
	fn test_parse_nullable_accepts(
		#[case] kind: NullableKind,
		#[case] raw: JsonValue,
		#[case] expected: NullValue,
	) {
		assert_eq!(parse_nullable(kind, &raw).unwrap(), expected);
	}

	#[rstest]
	#[case(NullableKind::Bool, json!("true"), "Expected type `nullable bool`, got `string`")]
	#[case(NullableKind::Int16, json!(40000), "Value 40000 is out of range for `i16`")]
	#[case(NullableKind::Int32, json!(1.5), "Value 1.5 is not an integer")]
	#[case(NullableKind::Int64, json!("1"), "Expected type `nullable int64`, got `string`")]
	#[case(NullableKind::Byte, json!("ab"), "Expected a single character, got \"ab\"")]
	#[case(NullableKind::String, json!(3), "Expected type `nullable string`, got `number`")]
	fn test_parse_nullable_rejects(
		#[case] kind: NullableKind,
		#[case] raw: JsonValue,
		#[case] message: &str,
	) {
		assert_eq!(parse_nullable(kind, &raw).unwrap_err().to_string(), message);
	}
}
