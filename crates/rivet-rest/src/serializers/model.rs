//! Model serializer

use std::marker::PhantomData;
use std::sync::Arc;

use indexmap::IndexMap;
use rivet_core::{
	ConvertError, InternalValue, Model, RequestContext, Representation, ValidationError, Value,
};
use serde_json::Value as JsonValue;

use super::{Serializer, SerializerError};
use crate::detectors::{Detectors, detect_from_db};
use crate::fields::{Field, FieldError};

/// Serializer of a [`Model`], one [`Field`] per wire name.
///
/// Construction binds the converters of every field once and fails when a
/// field has none. Relation fields are left out unless a nested serializer is
/// attached with [`with_nested`](Self::with_nested). The primary key field is
/// read-only.
///
/// # Examples
///
/// ```
/// use rivet_core::{Model, RequestContext};
/// use rivet_rest::{ModelSerializer, Serializer};
/// use serde_json::json;
///
/// #[derive(Model)]
/// struct Account {
///     id: i64,
///     email: String,
///     password: String,
/// }
///
/// let serializer = ModelSerializer::<Account>::new()
///     .unwrap()
///     .with_field("password", |field| field.write_only())
///     .unwrap();
///
/// let ctx = RequestContext::default();
/// let payload = json!({"email": "a@b.c", "password": "hunter2"});
/// let internal = serializer
///     .to_internal_value(payload.as_object().unwrap(), &ctx)
///     .unwrap();
/// let rendered = serializer.to_representation(&internal, &ctx).unwrap();
/// assert_eq!(serde_json::Value::Object(rendered), json!({"email": "a@b.c"}));
///
/// let err = serializer
///     .to_internal_value(json!({"nick": "x"}).as_object().unwrap(), &ctx)
///     .unwrap_err();
/// assert!(err.to_string().contains("accepted fields: email, id, password"));
/// ```
pub struct ModelSerializer<M: Model> {
	fields: IndexMap<String, Field>,
	detectors: Detectors,
	_model: PhantomData<fn() -> M>,
}

impl<M: Model> Clone for ModelSerializer<M> {
	fn clone(&self) -> Self {
		Self {
			fields: self.fields.clone(),
			detectors: self.detectors.clone(),
			_model: PhantomData,
		}
	}
}

impl<M: Model> ModelSerializer<M> {
	/// A serializer over every field of `M`, using the default chains and
	/// the process-wide type registry.
	pub fn new() -> Result<Self, SerializerError> {
		Self::with_detectors(Detectors::default())
	}

	/// A serializer over every field of `M`, using the given chains and
	/// registry.
	pub fn with_detectors(detectors: Detectors) -> Result<Self, SerializerError> {
		let names: Vec<&str> = M::meta().field_names().collect();
		Self::empty_with(detectors).with_model_fields(&names)
	}

	/// A serializer without fields.
	pub fn empty() -> Self {
		Self::empty_with(Detectors::default())
	}

	fn empty_with(detectors: Detectors) -> Self {
		Self {
			fields: IndexMap::new(),
			detectors,
			_model: PhantomData,
		}
	}

	/// Adds model fields by wire name, binding their converters.
	///
	/// Relation fields are skipped. Any other detection failure is returned.
	pub fn with_model_fields(mut self, names: &[&str]) -> Result<Self, SerializerError> {
		let meta = M::meta();
		let detectors = &self.detectors;
		for &name in names {
			let representation = detectors
				.representation
				.detect(meta, name, &detectors.registry);
			let internal_value = detectors
				.internal_value
				.detect(meta, name, &detectors.registry);
			let (representation, internal_value) = match (representation, internal_value) {
				(Ok(representation), Ok(internal_value)) => (representation, internal_value),
				(Err(err), _) | (_, Err(err)) if err.is_relation() => {
					tracing::debug!(model = meta.type_name(), field = name, "skipping relation field");
					continue;
				}
				(Err(err), _) | (_, Err(err)) => return Err(err.into()),
			};
			let from_db = detect_from_db(meta, name)?;
			self.fields.insert(
				name.to_string(),
				Field::from_parts(name, representation, internal_value, from_db),
			);
		}
		let primary_key = meta.primary_key().map(|field| field.name());
		if let Some(slot) = primary_key.and_then(|name| self.fields.get_mut(name)) {
			*slot = slot.clone().read_only();
		}
		Ok(self)
	}

	/// Edits an existing field.
	pub fn with_field<F>(mut self, name: &str, edit: F) -> Result<Self, SerializerError>
	where
		F: FnOnce(Field) -> Field,
	{
		let Some(slot) = self.fields.get_mut(name) else {
			return Err(SerializerError::FieldNotFound {
				model: M::meta().type_name().to_string(),
				field: name.to_string(),
			});
		};
		*slot = edit(slot.clone());
		Ok(self)
	}

	/// Adds a field, replacing any field with the same name.
	pub fn with_new_field(mut self, field: Field) -> Self {
		self.fields.insert(field.name().to_string(), field);
		self
	}

	/// Adds a relation field whose conversions delegate to `nested`.
	///
	/// The field accepts and renders either one object or a list of objects.
	pub fn with_nested<S>(self, name: &str, nested: S) -> Self
	where
		S: Serializer + 'static,
	{
		let nested = Arc::new(nested);
		let render = Arc::clone(&nested);
		let parse = Arc::clone(&nested);
		let scan = nested;
		let field = Field::new(name)
			.with_representation_func(move |value, name, ctx| {
				let raw = value
					.get(name)
					.ok_or_else(|| FieldError::NotPresent(name.to_string()))?;
				render_nested(render.as_ref(), raw, ctx)
			})
			.with_internal_value_func(move |payload, name, ctx| {
				let raw = payload
					.get(name)
					.ok_or_else(|| FieldError::NotPresent(name.to_string()))?;
				parse_nested(parse.as_ref(), raw, ctx)
			})
			.with_from_db_func(move |stored, name, ctx| {
				let raw = stored
					.get(name)
					.ok_or_else(|| FieldError::NotPresent(name.to_string()))?;
				scan_nested(scan.as_ref(), raw, ctx)
			});
		self.with_new_field(field)
	}

	pub fn field(&self, name: &str) -> Option<&Field> {
		self.fields.get(name)
	}

	/// Field names in declaration order.
	pub fn field_names(&self) -> impl Iterator<Item = &str> {
		self.fields.keys().map(String::as_str)
	}

	fn superfluous_error(&self, payload: &Representation) -> Option<ValidationError> {
		let mut accepted: Vec<&str> = self.field_names().collect();
		accepted.sort_unstable();
		let accepted = accepted.join(", ");

		let mut errors = ValidationError::new();
		for key in payload.keys().filter(|key| !self.fields.contains_key(key.as_str())) {
			errors.add(
				key.as_str(),
				format!("Field `{key}` is not accepted by this endpoint, accepted fields: {accepted}"),
			);
		}
		(!errors.is_empty()).then_some(errors)
	}
}

impl<M: Model> Serializer for ModelSerializer<M> {
	fn to_internal_value(
		&self,
		payload: &Representation,
		ctx: &RequestContext,
	) -> Result<InternalValue, SerializerError> {
		if let Some(errors) = self.superfluous_error(payload) {
			return Err(errors.into());
		}

		let mut value = InternalValue::new();
		let mut errors = ValidationError::new();
		for field in self.fields.values().filter(|field| field.is_writable()) {
			match field.to_internal_value(payload, ctx) {
				Ok(converted) => {
					value.insert(field.name().to_string(), converted);
				}
				Err(FieldError::NotPresent(_)) => {}
				Err(err) => errors.add(field.name(), err.to_string()),
			}
		}
		if errors.is_empty() {
			Ok(value)
		} else {
			Err(errors.into())
		}
	}

	fn to_representation(
		&self,
		value: &InternalValue,
		ctx: &RequestContext,
	) -> Result<Representation, SerializerError> {
		let mut rendered = Representation::new();
		let mut errors = ValidationError::new();
		for field in self.fields.values().filter(|field| field.is_readable()) {
			match field.to_representation(value, ctx) {
				Ok(converted) => {
					rendered.insert(field.name().to_string(), converted);
				}
				Err(FieldError::NotPresent(_)) => {}
				Err(err) => errors.add(field.name(), err.to_string()),
			}
		}
		if errors.is_empty() {
			Ok(rendered)
		} else {
			Err(SerializerError::Conversion(errors))
		}
	}

	fn from_db(
		&self,
		stored: &InternalValue,
		ctx: &RequestContext,
	) -> Result<InternalValue, SerializerError> {
		let mut value = InternalValue::new();
		let mut errors = ValidationError::new();
		for key in stored.keys() {
			let Some(field) = self.fields.get(key) else {
				continue;
			};
			match field.from_db(stored, ctx) {
				Ok(converted) => {
					value.insert(key.clone(), converted);
				}
				Err(FieldError::NotPresent(_)) => {}
				Err(err) => errors.add(key.as_str(), err.to_string()),
			}
		}
		if errors.is_empty() {
			Ok(value)
		} else {
			Err(SerializerError::Conversion(errors))
		}
	}
}

fn nested_error(error: SerializerError) -> FieldError {
	FieldError::Convert(ConvertError::invalid(error.to_string()))
}

fn nested_mismatch(expected: &str, found: &str) -> FieldError {
	FieldError::Convert(ConvertError::type_mismatch(expected, found))
}

fn render_nested(
	nested: &dyn Serializer,
	raw: &Value,
	ctx: &RequestContext,
) -> Result<JsonValue, FieldError> {
	match raw {
		Value::Null => Ok(JsonValue::Null),
		Value::Object(item) => nested
			.to_representation(item, ctx)
			.map(JsonValue::Object)
			.map_err(nested_error),
		Value::List(items) => items
			.iter()
			.map(|item| match item {
				Value::Object(item) => nested
					.to_representation(item, ctx)
					.map(JsonValue::Object)
					.map_err(nested_error),
				other => Err(nested_mismatch("object", other.kind_name())),
			})
			.collect::<Result<Vec<_>, _>>()
			.map(JsonValue::Array),
		other => Err(nested_mismatch("object", other.kind_name())),
	}
}

fn parse_nested(
	nested: &dyn Serializer,
	raw: &JsonValue,
	ctx: &RequestContext,
) -> Result<Value, FieldError> {
	match raw {
		JsonValue::Null => Ok(Value::Null),
		JsonValue::Object(item) => nested
			.to_internal_value(item, ctx)
			.map(Value::Object)
			.map_err(nested_error),
		JsonValue::Array(items) => items
			.iter()
			.map(|item| match item {
				JsonValue::Object(item) => nested
					.to_internal_value(item, ctx)
					.map(Value::Object)
					.map_err(nested_error),
				other => Err(nested_mismatch("object", rivet_core::types::json_kind(other))),
			})
			.collect::<Result<Vec<_>, _>>()
			.map(Value::List),
		other => Err(nested_mismatch("object", rivet_core::types::json_kind(other))),
	}
}

fn scan_nested(
	nested: &dyn Serializer,
	raw: &Value,
	ctx: &RequestContext,
) -> Result<Value, FieldError> {
	match raw {
		Value::Object(item) => nested.from_db(item, ctx).map(Value::Object).map_err(nested_error),
		Value::List(items) => items
			.iter()
			.map(|item| match item {
				Value::Object(item) => {
					nested.from_db(item, ctx).map(Value::Object).map_err(nested_error)
				}
				other => Ok(other.clone()),
			})
			.collect::<Result<Vec<_>, _>>()
			.map(Value::List),
		other => Ok(other.clone()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::{TimeZone, Utc};
	use rivet_core::types::{TypeMapping, TypeRegistry};
	use rivet_core::{JsonBlob, NullValue};
	use rstest::{fixture, rstest};
	use serde_json::json;

	use crate::detectors::DetectionError;

	#[derive(Debug, Clone, PartialEq, Model)]
	struct Author {
		id: i64,
		name: String,
	}

	#[derive(Debug, Clone, PartialEq, Model)]
	struct Article {
		id: i64,
		title: String,
		rating: Option<i32>,
		initial: Option<u8>,
		published_at: chrono::DateTime<Utc>,
		keywords: Vec<String>,
		metadata: JsonBlob,
		views: u32,
		#[rivet(relation)]
		author: Option<Author>,
	}

	#[derive(Debug, Clone, PartialEq)]
	struct Cents(i64);

	impl rivet_core::FieldType for Cents {
		fn into_value(self) -> Value {
			Value::Int(self.0)
		}

		fn from_value(value: &Value) -> Result<Self, ConvertError> {
			value
				.as_i64()
				.map(Cents)
				.ok_or_else(|| ConvertError::type_mismatch("int", value.kind_name()))
		}
	}

	#[derive(Debug, Clone, PartialEq, Model)]
	struct Invoice {
		id: i64,
		total: Cents,
	}

	#[fixture]
	fn serializer() -> ModelSerializer<Article> {
		ModelSerializer::new().unwrap()
	}

	fn ctx() -> RequestContext {
		RequestContext::default()
	}

	fn payload(value: JsonValue) -> Representation {
		match value {
			JsonValue::Object(map) => map,
			_ => panic!("payload must be an object"),
		}
	}

	#[rstest]
	fn test_relation_fields_are_skipped(serializer: ModelSerializer<Article>) {
		assert!(serializer.field("author").is_none());
		assert_eq!(
			serializer.field_names().collect::<Vec<_>>(),
			[
				"id",
				"title",
				"rating",
				"initial",
				"published_at",
				"keywords",
				"metadata",
				"views"
			]
		);
		let id = serializer.field("id").unwrap();
		assert!(id.is_readable() && !id.is_writable());
	}

	#[rstest]
	fn test_round_trip_of_supported_types(serializer: ModelSerializer<Article>) {
		let wire = payload(json!({
			"title": "Rust",
			"rating": null,
			"initial": "R",
			"published_at": "2024-02-29T23:00:00-01:00",
			"keywords": ["systems", "safety"],
			"metadata": {"source": "feed", "tags": [1, 2]},
			"views": 12
		}));
		let internal = serializer.to_internal_value(&wire, &ctx()).unwrap();
		assert_eq!(internal["rating"], Value::Nullable(NullValue::Int32(None)));
		assert_eq!(internal["initial"], Value::Nullable(NullValue::Byte(Some(b'R'))));
		assert_eq!(
			internal["published_at"],
			Value::DateTime(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap())
		);

		let rendered = serializer.to_representation(&internal, &ctx()).unwrap();
		assert_eq!(
			JsonValue::Object(rendered),
			json!({
				"title": "Rust",
				"rating": null,
				"initial": "R",
				"published_at": "2024-03-01T00:00:00Z",
				"keywords": ["systems", "safety"],
				"metadata": {"source": "feed", "tags": [1, 2]},
				"views": 12
			})
		);
	}

	#[rstest]
	fn test_read_only_field_ignores_payload(serializer: ModelSerializer<Article>) {
		let internal = serializer
			.to_internal_value(&payload(json!({"id": 5, "title": "x"})), &ctx())
			.unwrap();
		assert!(!internal.contains_key("id"));
		assert_eq!(internal.len(), 1);
	}

	#[rstest]
	fn test_write_only_field_is_not_rendered(serializer: ModelSerializer<Article>) {
		let serializer = serializer
			.with_field("views", Field::write_only)
			.unwrap();
		let mut internal = InternalValue::new();
		internal.insert("title".into(), Value::from("x"));
		internal.insert("views".into(), Value::UInt(3));
		let rendered = serializer.to_representation(&internal, &ctx()).unwrap();
		assert_eq!(JsonValue::Object(rendered), json!({"title": "x"}));
	}

	#[rstest]
	fn test_superfluous_fields_are_rejected_without_field_errors(
		serializer: ModelSerializer<Article>,
	) {
		let err = serializer
			.to_internal_value(
				&payload(json!({"title": 5, "colour": "red", "size": 3})),
				&ctx(),
			)
			.unwrap_err();
		let SerializerError::Validation(errors) = err else {
			panic!("expected a validation error");
		};
		assert_eq!(
			errors.field_errors().keys().collect::<Vec<_>>(),
			["colour", "size"]
		);
		assert_eq!(
			errors.messages("colour").unwrap(),
			["Field `colour` is not accepted by this endpoint, accepted fields: id, initial, keywords, metadata, published_at, rating, title, views"]
		);
	}

	#[rstest]
	fn test_field_errors_are_aggregated(serializer: ModelSerializer<Article>) {
		let err = serializer
			.to_internal_value(
				&payload(json!({
					"title": 1,
					"published_at": "2024-02-29 10:00:00",
					"keywords": ["ok", 2],
					"rating": "high",
					"views": -1
				})),
				&ctx(),
			)
			.unwrap_err();
		let SerializerError::Validation(errors) = err else {
			panic!("expected a validation error");
		};
		assert_eq!(
			errors.field_errors().keys().collect::<Vec<_>>(),
			["keywords", "published_at", "rating", "title", "views"]
		);
		assert_eq!(
			errors.messages("keywords").unwrap(),
			["[1] is not a valid string"]
		);
		assert_eq!(
			errors.messages("title").unwrap(),
			["Error converting value for type `alloc::string::String`: Expected type `string`, got `number`"]
		);
		assert!(errors.messages("published_at").unwrap()[0].starts_with("parsing time"));
		assert_eq!(
			errors.messages("views").unwrap(),
			["Error converting value for type `u32`: Value -1 is negative"]
		);
	}

	#[rstest]
	fn test_from_db_scans_stored_values(serializer: ModelSerializer<Article>) {
		let mut stored = InternalValue::new();
		stored.insert("rating".into(), Value::Null);
		stored.insert("keywords".into(), Value::from("[\"a\"]"));
		stored.insert("published_at".into(), Value::from("2024-01-01T00:00:00+00:00"));
		stored.insert("unknown".into(), Value::Int(1));
		let value = serializer.from_db(&stored, &ctx()).unwrap();
		assert_eq!(value["rating"], Value::Nullable(NullValue::Int32(None)));
		assert_eq!(value["keywords"], Value::List(vec![Value::from("a")]));
		assert!(matches!(value["published_at"], Value::DateTime(_)));
		assert!(!value.contains_key("unknown"));
	}

	#[rstest]
	fn test_with_field_fails_for_missing_field(serializer: ModelSerializer<Article>) {
		let err = serializer.with_field("nope", |field| field).err().unwrap();
		assert_eq!(
			err,
			SerializerError::FieldNotFound {
				model: "Article".into(),
				field: "nope".into()
			}
		);
	}

	#[rstest]
	fn test_static_value_field(serializer: ModelSerializer<Article>) {
		let serializer =
			serializer.with_new_field(Field::new("kind").with_static_value(Value::from("post")));
		let internal = serializer
			.to_internal_value(&payload(json!({"kind": "ignored", "title": "x"})), &ctx())
			.unwrap();
		assert_eq!(internal["kind"], Value::from("post"));
	}

	#[rstest]
	fn test_nested_serializer_handles_objects(serializer: ModelSerializer<Article>) {
		let authors = ModelSerializer::<Author>::new().unwrap();
		let serializer = serializer.with_nested("author", authors);

		let internal = serializer
			.to_internal_value(
				&payload(json!({"title": "x", "author": {"name": "Ann"}})),
				&ctx(),
			)
			.unwrap();
		let Value::Object(author) = &internal["author"] else {
			panic!("expected a nested object");
		};
		assert_eq!(author["name"], Value::from("Ann"));

		let mut stored = internal.clone();
		if let Some(Value::Object(author)) = stored.get_mut("author") {
			author.insert("id".into(), Value::Int(3));
		}
		let rendered = serializer.to_representation(&stored, &ctx()).unwrap();
		assert_eq!(rendered["author"], json!({"id": 3, "name": "Ann"}));

		let err = serializer
			.to_internal_value(&payload(json!({"author": [{"age": 3}]})), &ctx())
			.unwrap_err();
		let SerializerError::Validation(errors) = err else {
			panic!("expected a validation error");
		};
		assert!(errors.messages("author").unwrap()[0].contains("Field `age` is not accepted"));
	}

	#[rstest]
	fn test_unrenderable_stored_value_is_a_server_error(serializer: ModelSerializer<Article>) {
		let stored = InternalValue::from([("title".to_string(), Value::Int(5))]);
		let err = serializer.to_representation(&stored, &ctx()).unwrap_err();
		let SerializerError::Conversion(errors) = &err else {
			panic!("expected a conversion error, got {err:?}");
		};
		assert!(errors.messages("title").is_some());

		let err = rivet_core::Error::from(err);
		assert_eq!(err.status_code(), http::StatusCode::INTERNAL_SERVER_ERROR);
		assert_eq!(err.to_body(), json!({"message": "Internal server error"}));
	}

	#[rstest]
	fn test_undetectable_field_fails_construction() {
		let err = ModelSerializer::<Invoice>::new().err().unwrap();
		assert_eq!(
			err,
			SerializerError::Detection(DetectionError::NoRepresentation {
				model: "Invoice".into(),
				field: "total".into()
			})
		);
		assert_eq!(
			err.to_string(),
			"No representation function could be found for field `Invoice`.`total`"
		);
	}

	#[rstest]
	fn test_custom_registry_enables_type() {
		let mut registry = TypeRegistry::with_defaults();
		registry.register::<Cents>(TypeMapping::new(
			|value| Ok(json!(format!("{:.2}", value.as_i64().unwrap_or_default() as f64 / 100.0))),
			|raw| {
				raw.as_str()
					.and_then(|text| text.parse::<f64>().ok())
					.map(|amount| Value::Int((amount * 100.0).round() as i64))
					.ok_or_else(|| ConvertError::invalid("expected a decimal string"))
			},
		));
		let serializer =
			ModelSerializer::<Invoice>::with_detectors(Detectors::default().with_registry(registry))
				.unwrap();
		let internal = serializer
			.to_internal_value(&payload(json!({"total": "12.50"})), &ctx())
			.unwrap();
		assert_eq!(internal["total"], Value::Int(1250));
		let rendered = serializer.to_representation(&internal, &ctx()).unwrap();
		assert_eq!(rendered["total"], json!("12.50"));
	}
}
