//! Strategies of the representation chain.

use std::sync::Arc;

use rivet_core::types::{WireFn, format_date_time, parse_date_time};
use rivet_core::{ConvertError, FieldSettings, NullValue, TypeRegistry, Value};
use serde_json::Value as JsonValue;

use super::RepresentationStrategy;

/// Uses the type's own [`Representable`](rivet_core::Representable) impl.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelfRepresentable;

impl RepresentationStrategy for SelfRepresentable {
	fn name(&self) -> &'static str {
		"self_representable"
	}

	fn detect(&self, settings: &FieldSettings<'_>, _registry: &TypeRegistry) -> Option<WireFn> {
		settings.capabilities().representable_fn().cloned()
	}
}

/// Renders date-times as `%Y-%m-%dT%H:%M:%SZ`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateTimeRepresentation;

impl RepresentationStrategy for DateTimeRepresentation {
	fn name(&self) -> &'static str {
		"date_time"
	}

	fn detect(&self, settings: &FieldSettings<'_>, _registry: &TypeRegistry) -> Option<WireFn> {
		if !settings.is_date_time() {
			return None;
		}
		Some(Arc::new(|value: &Value| match value {
			Value::DateTime(dt) => Ok(JsonValue::String(format_date_time(dt))),
			Value::String(text) => {
				parse_date_time(text).map(|dt| JsonValue::String(format_date_time(&dt)))
			}
			Value::Null => Ok(JsonValue::Null),
			other => Err(ConvertError::type_mismatch("datetime", other.kind_name())),
		}))
	}
}

/// Decodes stored JSON blobs into JSON values.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBlobRepresentation;

impl RepresentationStrategy for JsonBlobRepresentation {
	fn name(&self) -> &'static str {
		"json_blob"
	}

	fn detect(&self, settings: &FieldSettings<'_>, _registry: &TypeRegistry) -> Option<WireFn> {
		if !settings.is_json_blob() {
			return None;
		}
		Some(Arc::new(|value: &Value| match value {
			Value::Json(json) => Ok(json.clone()),
			Value::String(text) => {
				serde_json::from_str(text).map_err(|err| ConvertError::invalid(err.to_string()))
			}
			Value::Bytes(bytes) => {
				serde_json::from_slice(bytes).map_err(|err| ConvertError::invalid(err.to_string()))
			}
			Value::Null => Ok(JsonValue::Null),
			other => Err(ConvertError::type_mismatch("json", other.kind_name())),
		}))
	}
}

/// Looks the field type up in the type registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryRepresentation;

impl RepresentationStrategy for RegistryRepresentation {
	fn name(&self) -> &'static str {
		"type_registry"
	}

	fn detect(&self, settings: &FieldSettings<'_>, registry: &TypeRegistry) -> Option<WireFn> {
		registry.to_wire(settings.type_key()).ok()
	}
}

/// Renders the type through its `Display` impl.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextMarshaler;

impl RepresentationStrategy for TextMarshaler {
	fn name(&self) -> &'static str {
		"text_marshaler"
	}

	fn detect(&self, settings: &FieldSettings<'_>, _registry: &TypeRegistry) -> Option<WireFn> {
		settings.capabilities().text_marshal_fn().cloned()
	}
}

/// Emits `null` for invalid nullable wrappers, else the inner scalar.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullableRepresentation;

impl RepresentationStrategy for NullableRepresentation {
	fn name(&self) -> &'static str {
		"nullable"
	}

	fn detect(&self, settings: &FieldSettings<'_>, _registry: &TypeRegistry) -> Option<WireFn> {
		let kind = settings.nullable_kind()?;
		Some(Arc::new(move |value: &Value| match value {
			Value::Nullable(inner) if inner.kind() == kind => Ok(render_nullable(inner)),
			Value::Null => Ok(JsonValue::Null),
			other => Err(ConvertError::type_mismatch(kind.name(), other.kind_name())),
		}))
	}
}

fn render_nullable(value: &NullValue) -> JsonValue {
	match value {
		NullValue::Bool(Some(b)) => JsonValue::Bool(*b),
		NullValue::Int16(Some(i)) => JsonValue::from(*i),
		NullValue::Int32(Some(i)) => JsonValue::from(*i),
		NullValue::Int64(Some(i)) => JsonValue::from(*i),
		NullValue::Float64(Some(f)) => serde_json::Number::from_f64(*f)
			.map(JsonValue::Number)
			.unwrap_or(JsonValue::Null),
		NullValue::String(Some(s)) => JsonValue::String(s.clone()),
		NullValue::Byte(Some(b)) => JsonValue::String(char::from(*b).to_string()),
		_ => JsonValue::Null,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::{TimeZone, Utc};
	use rivet_core::{JsonBlob, ModelMeta, probe};
	use rstest::rstest;
	use serde_json::json;

	struct Event;

	fn meta() -> ModelMeta {
		ModelMeta::builder::<Event>("events")
			.field::<chrono::DateTime<Utc>>("at", "at")
			.field::<JsonBlob>("payload", "payload")
			.field::<Option<u8>>("grade", "grade")
			.field::<Option<f64>>("score", "score")
			.build()
	}

	fn detect(strategy: impl RepresentationStrategy, field: &str) -> Option<WireFn> {
		let meta = meta();
		let settings = probe(&meta, field).unwrap();
		strategy.detect(&settings, &TypeRegistry::with_defaults())
	}

	#[rstest]
	fn test_date_time_formats_utc() {
		let render = detect(DateTimeRepresentation, "at").unwrap();
		let at = Utc.with_ymd_and_hms(2023, 11, 2, 9, 5, 0).unwrap();
		assert_eq!(render(&Value::DateTime(at)).unwrap(), json!("2023-11-02T09:05:00Z"));
		assert_eq!(
			render(&Value::from("2023-11-02T10:05:00+01:00")).unwrap(),
			json!("2023-11-02T09:05:00Z")
		);
		assert!(detect(DateTimeRepresentation, "payload").is_none());
	}

	#[rstest]
	fn test_json_blob_decodes_bytes() {
		let render = detect(JsonBlobRepresentation, "payload").unwrap();
		assert_eq!(
			render(&Value::Bytes(b"[true]".to_vec())).unwrap(),
			json!([true])
		);
		assert!(render(&Value::from("{oops")).is_err());
	}

	#[rstest]
	#[case("grade", Value::Nullable(NullValue::Byte(Some(b'A'))), json!("A"))]
	#[case("grade", Value::Nullable(NullValue::Byte(None)), json!(null))]
	#[case("score", Value::Nullable(NullValue::Float64(Some(1.5))), json!(1.5))]
	#[case("score", Value::Null, json!(null))]
	fn test_nullable_rendering(#[case] field: &str, #[case] value: Value, #[case] expected: JsonValue) {
		let render = detect(NullableRepresentation, field).unwrap();
		assert_eq!(render(&value).unwrap(), expected);
	}

	#[rstest]
	fn test_nullable_rejects_other_kind() {
		let render = detect(NullableRepresentation, "score").unwrap();
		let err = render(&Value::Nullable(NullValue::Bool(Some(true)))).unwrap_err();
		assert_eq!(
			err.to_string(),
			"Expected type `nullable float64`, got `nullable`"
		);
	}
}
