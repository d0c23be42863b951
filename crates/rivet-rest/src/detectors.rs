//! Conversion detector chains.
//!
//! A chain is an ordered list of strategies. Each strategy inspects the
//! declared capabilities of a field and either binds a converter or passes.
//! The first strategy that binds wins, so the order of a chain is part of its
//! contract.
//!
//! Detected converters are wrapped so that a key absent from the input yields
//! [`FieldError::NotPresent`] instead of a conversion error. Relation fields are
//! refused with [`DetectionError::IsRelation`]; serializers omit them.

mod internal;
mod representation;

use std::sync::Arc;

use rivet_core::types::{ParseFn, WireFn, registry};
use rivet_core::{
	FieldSettings, InternalValue, ModelMeta, RequestContext, Representation, TypeRegistry, Value,
	probe,
};
use serde_json::Value as JsonValue;
use thiserror::Error;

pub use internal::{
	DateTimeParser, NullableParser, RegistryParser, SelfParsable, TextUnmarshaler,
};
pub use representation::{
	DateTimeRepresentation, JsonBlobRepresentation, NullableRepresentation, RegistryRepresentation,
	SelfRepresentable, TextMarshaler,
};

use crate::fields::{FieldError, FromDbFunc, InternalValueFunc, RepresentationFunc};

/// Errors raised while binding converters to a field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DetectionError {
	/// The field is a relation; serializers skip it.
	#[error("Field `{model}`.`{field}` is a relation")]
	IsRelation { model: String, field: String },

	#[error("Model `{model}` has no field `{field}`")]
	UnknownField { model: String, field: String },

	#[error("No representation function could be found for field `{model}`.`{field}`")]
	NoRepresentation { model: String, field: String },

	#[error("No internal value function could be found for field `{model}`.`{field}`")]
	NoInternalValue { model: String, field: String },
}

impl DetectionError {
	pub fn is_relation(&self) -> bool {
		matches!(self, DetectionError::IsRelation { .. })
	}
}

/// A strategy binding the internal-to-wire conversion of a field.
pub trait RepresentationStrategy: Send + Sync {
	/// Name used in logs.
	fn name(&self) -> &'static str;

	fn detect(&self, settings: &FieldSettings<'_>, registry: &TypeRegistry) -> Option<WireFn>;
}

/// A strategy binding the wire-to-internal conversion of a field.
pub trait InternalValueStrategy: Send + Sync {
	/// Name used in logs.
	fn name(&self) -> &'static str;

	fn detect(&self, settings: &FieldSettings<'_>, registry: &TypeRegistry) -> Option<ParseFn>;
}

/// Resolves the settings of a field, refusing unknown and relation fields.
fn settings_for<'a>(
	model: &'a ModelMeta,
	field: &str,
) -> Result<FieldSettings<'a>, DetectionError> {
	let settings = probe(model, field).ok_or_else(|| DetectionError::UnknownField {
		model: model.type_name().to_string(),
		field: field.to_string(),
	})?;
	if settings.is_relation() {
		return Err(DetectionError::IsRelation {
			model: model.type_name().to_string(),
			field: field.to_string(),
		});
	}
	Ok(settings)
}

/// Ordered list of representation strategies.
///
/// # Examples
///
/// ```
/// use rivet_rest::RepresentationChain;
///
/// let chain = RepresentationChain::default();
/// assert_eq!(
///     chain.strategy_names(),
///     ["self_representable", "date_time", "json_blob", "type_registry", "text_marshaler", "nullable"]
/// );
/// ```
#[derive(Clone)]
pub struct RepresentationChain {
	strategies: Vec<Arc<dyn RepresentationStrategy>>,
}

impl Default for RepresentationChain {
	fn default() -> Self {
		Self::empty()
			.with_strategy(SelfRepresentable)
			.with_strategy(DateTimeRepresentation)
			.with_strategy(JsonBlobRepresentation)
			.with_strategy(RegistryRepresentation)
			.with_strategy(TextMarshaler)
			.with_strategy(NullableRepresentation)
	}
}

impl RepresentationChain {
	/// A chain without strategies; every detection fails.
	pub fn empty() -> Self {
		Self {
			strategies: Vec::new(),
		}
	}

	/// Appends a strategy at the end of the chain.
	pub fn with_strategy(mut self, strategy: impl RepresentationStrategy + 'static) -> Self {
		self.strategies.push(Arc::new(strategy));
		self
	}

	/// Inserts a strategy before the one currently at `index`.
	pub fn with_strategy_at(
		mut self,
		index: usize,
		strategy: impl RepresentationStrategy + 'static,
	) -> Self {
		let index = index.min(self.strategies.len());
		self.strategies.insert(index, Arc::new(strategy));
		self
	}

	pub fn strategy_names(&self) -> Vec<&'static str> {
		self.strategies.iter().map(|strategy| strategy.name()).collect()
	}

	/// Binds the representation function of `field`.
	pub fn detect(
		&self,
		model: &ModelMeta,
		field: &str,
		registry: &TypeRegistry,
	) -> Result<RepresentationFunc, DetectionError> {
		let settings = settings_for(model, field)?;
		for strategy in &self.strategies {
			if let Some(convert) = strategy.detect(&settings, registry) {
				tracing::debug!(
					model = model.type_name(),
					field,
					strategy = strategy.name(),
					"bound representation function"
				);
				return Ok(guard_representation(convert));
			}
		}
		Err(DetectionError::NoRepresentation {
			model: model.type_name().to_string(),
			field: field.to_string(),
		})
	}
}

/// Ordered list of internal value strategies.
///
/// # Examples
///
/// ```
/// use rivet_rest::InternalValueChain;
///
/// let chain = InternalValueChain::default();
/// assert_eq!(
///     chain.strategy_names(),
///     ["self_parsable", "date_time", "type_registry", "text_unmarshaler", "nullable"]
/// );
/// ```
#[derive(Clone)]
pub struct InternalValueChain {
	strategies: Vec<Arc<dyn InternalValueStrategy>>,
}

impl Default for InternalValueChain {
	fn default() -> Self {
		Self::empty()
			.with_strategy(SelfParsable)
			.with_strategy(DateTimeParser)
			.with_strategy(RegistryParser)
			.with_strategy(TextUnmarshaler)
			.with_strategy(NullableParser)
	}
}

impl InternalValueChain {
	/// A chain without strategies; every detection fails.
	pub fn empty() -> Self {
		Self {
			strategies: Vec::new(),
		}
	}

	/// Appends a strategy at the end of the chain.
	pub fn with_strategy(mut self, strategy: impl InternalValueStrategy + 'static) -> Self {
		self.strategies.push(Arc::new(strategy));
		self
	}

	/// Inserts a strategy before the one currently at `index`.
	pub fn with_strategy_at(
		mut self,
		index: usize,
		strategy: impl InternalValueStrategy + 'static,
	) -> Self {
		let index = index.min(self.strategies.len());
		self.strategies.insert(index, Arc::new(strategy));
		self
	}

	pub fn strategy_names(&self) -> Vec<&'static str> {
		self.strategies.iter().map(|strategy| strategy.name()).collect()
	}

	/// Binds the internal value function of `field`.
	pub fn detect(
		&self,
		model: &ModelMeta,
		field: &str,
		registry: &TypeRegistry,
	) -> Result<InternalValueFunc, DetectionError> {
		let settings = settings_for(model, field)?;
		for strategy in &self.strategies {
			if let Some(convert) = strategy.detect(&settings, registry) {
				tracing::debug!(
					model = model.type_name(),
					field,
					strategy = strategy.name(),
					"bound internal value function"
				);
				return Ok(guard_internal_value(convert));
			}
		}
		Err(DetectionError::NoInternalValue {
			model: model.type_name().to_string(),
			field: field.to_string(),
		})
	}
}

/// Binds the from-storage function of `field`: the storage scanner of its
/// type, else pass-through.
pub fn detect_from_db(model: &ModelMeta, field: &str) -> Result<FromDbFunc, DetectionError> {
	let settings = settings_for(model, field)?;
	Ok(match settings.capabilities().scanner_fn() {
		Some(scan) => {
			let scan = scan.clone();
			Arc::new(move |stored: &InternalValue, name: &str, _ctx: &RequestContext| {
				let raw = stored
					.get(name)
					.ok_or_else(|| FieldError::NotPresent(name.to_string()))?;
				scan(raw).map_err(FieldError::from)
			})
		}
		None => passthrough_from_db(),
	})
}

/// Everything needed to bind the conversions of model fields.
#[derive(Clone)]
pub struct Detectors {
	pub representation: RepresentationChain,
	pub internal_value: InternalValueChain,
	pub registry: TypeRegistry,
}

impl Default for Detectors {
	/// Default chains over a snapshot of the process-wide registry.
	fn default() -> Self {
		Self {
			representation: RepresentationChain::default(),
			internal_value: InternalValueChain::default(),
			registry: registry::global().clone(),
		}
	}
}

impl Detectors {
	pub fn with_registry(mut self, registry: TypeRegistry) -> Self {
		self.registry = registry;
		self
	}

	pub fn with_representation_chain(mut self, chain: RepresentationChain) -> Self {
		self.representation = chain;
		self
	}

	pub fn with_internal_value_chain(mut self, chain: InternalValueChain) -> Self {
		self.internal_value = chain;
		self
	}
}

fn guard_representation(convert: WireFn) -> RepresentationFunc {
	Arc::new(
		move |value: &InternalValue, name: &str, _ctx: &RequestContext| {
			let raw = value
				.get(name)
				.ok_or_else(|| FieldError::NotPresent(name.to_string()))?;
			convert(raw).map_err(FieldError::from)
		},
	)
}

fn guard_internal_value(convert: ParseFn) -> InternalValueFunc {
	Arc::new(
		move |payload: &Representation, name: &str, _ctx: &RequestContext| {
			let raw = payload
				.get(name)
				.ok_or_else(|| FieldError::NotPresent(name.to_string()))?;
			convert(raw).map_err(FieldError::from)
		},
	)
}

/// Plain JSON rendering of the stored value.
pub(crate) fn passthrough_representation() -> RepresentationFunc {
	guard_representation(Arc::new(|value: &Value| Ok(value.to_json())))
}

/// Plain conversion of the wire value.
pub(crate) fn passthrough_internal_value() -> InternalValueFunc {
	guard_internal_value(Arc::new(|raw: &JsonValue| Ok(Value::from_json(raw))))
}

pub(crate) fn passthrough_from_db() -> FromDbFunc {
	Arc::new(|stored: &InternalValue, name: &str, _ctx: &RequestContext| {
		stored
			.get(name)
			.cloned()
			.ok_or_else(|| FieldError::NotPresent(name.to_string()))
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use rivet_core::{ConvertError, FieldType, JsonBlob, ModelMeta, NullValue};
	use rstest::{fixture, rstest};
	use serde_json::json;

	struct Sample;

	/// A field type declaring no capability at all.
	struct Opaque;

	impl FieldType for Opaque {
		fn into_value(self) -> Value {
			Value::Null
		}

		fn from_value(_value: &Value) -> Result<Self, ConvertError> {
			Ok(Opaque)
		}
	}

	#[fixture]
	fn meta() -> ModelMeta {
		ModelMeta::builder::<Sample>("samples")
			.primary_key::<i64>("id", "id")
			.field::<String>("name", "name")
			.field::<Option<i16>>("rank", "rank")
			.field::<JsonBlob>("extra", "extra")
			.field::<Opaque>("raw", "raw")
			.relation::<Option<String>>("owner", "owner")
			.build()
	}

	fn ctx() -> RequestContext {
		RequestContext::default()
	}

	#[rstest]
	fn test_default_chain_orders() {
		assert_eq!(
			RepresentationChain::default().strategy_names(),
			[
				"self_representable",
				"date_time",
				"json_blob",
				"type_registry",
				"text_marshaler",
				"nullable"
			]
		);
		assert_eq!(
			InternalValueChain::default().strategy_names(),
			[
				"self_parsable",
				"date_time",
				"type_registry",
				"text_unmarshaler",
				"nullable"
			]
		);
	}

	#[rstest]
	fn test_missing_key_is_not_present(meta: ModelMeta) {
		let registry = TypeRegistry::with_defaults();
		let render = RepresentationChain::default()
			.detect(&meta, "name", &registry)
			.unwrap();
		assert_eq!(
			render(&InternalValue::new(), "name", &ctx()),
			Err(FieldError::NotPresent("name".into()))
		);
	}

	#[rstest]
	fn test_relation_is_refused(meta: ModelMeta) {
		let registry = TypeRegistry::with_defaults();
		let err = InternalValueChain::default()
			.detect(&meta, "owner", &registry)
			.err()
			.unwrap();
		assert!(err.is_relation());
	}

	#[rstest]
	fn test_undetectable_field_names_model_and_field(meta: ModelMeta) {
		let registry = TypeRegistry::with_defaults();
		let err = RepresentationChain::default()
			.detect(&meta, "raw", &registry)
			.err()
			.unwrap();
		assert_eq!(
			err.to_string(),
			"No representation function could be found for field `Sample`.`raw`"
		);
	}

	#[rstest]
	fn test_unknown_field(meta: ModelMeta) {
		let registry = TypeRegistry::with_defaults();
		let err = RepresentationChain::default()
			.detect(&meta, "nope", &registry)
			.err()
			.unwrap();
		assert!(matches!(err, DetectionError::UnknownField { .. }));
	}

	#[rstest]
	fn test_empty_registry_falls_through_to_nullable(meta: ModelMeta) {
		let registry = TypeRegistry::empty();
		let parse = InternalValueChain::default()
			.detect(&meta, "rank", &registry)
			.unwrap();
		let payload = json!({"rank": 3});
		assert_eq!(
			parse(payload.as_object().unwrap(), "rank", &ctx()).unwrap(),
			Value::Nullable(NullValue::Int16(Some(3)))
		);
		assert!(
			RepresentationChain::default()
				.detect(&meta, "name", &registry)
				.is_err()
		);
	}

	#[rstest]
	fn test_json_blob_detected_before_registry(meta: ModelMeta) {
		let registry = TypeRegistry::with_defaults();
		let render = RepresentationChain::default()
			.detect(&meta, "extra", &registry)
			.unwrap();
		let mut stored = InternalValue::new();
		stored.insert("extra".into(), Value::from("{\"a\":[1,2]}"));
		assert_eq!(render(&stored, "extra", &ctx()).unwrap(), json!({"a": [1, 2]}));
	}

	struct Shouting;

	impl RepresentationStrategy for Shouting {
		fn name(&self) -> &'static str {
			"shouting"
		}

		fn detect(&self, settings: &FieldSettings<'_>, _registry: &TypeRegistry) -> Option<WireFn> {
			(settings.name() == "name").then(|| -> WireFn {
				Arc::new(|value: &Value| match value {
					Value::String(s) => Ok(JsonValue::String(s.to_uppercase())),
					other => Err(ConvertError::type_mismatch("string", other.kind_name())),
				})
			})
		}
	}

	#[rstest]
	fn test_custom_strategy_takes_precedence(meta: ModelMeta) {
		let chain = RepresentationChain::default().with_strategy_at(0, Shouting);
		assert_eq!(chain.strategy_names()[0], "shouting");
		let render = chain
			.detect(&meta, "name", &TypeRegistry::with_defaults())
			.unwrap();
		let mut stored = InternalValue::new();
		stored.insert("name".into(), Value::from("lamp"));
		assert_eq!(render(&stored, "name", &ctx()).unwrap(), json!("LAMP"));
	}

	#[rstest]
	fn test_from_db_uses_scanner(meta: ModelMeta) {
		let scan = detect_from_db(&meta, "rank").unwrap();
		let mut stored = InternalValue::new();
		stored.insert("rank".into(), Value::Null);
		assert_eq!(
			scan(&stored, "rank", &ctx()).unwrap(),
			Value::Nullable(NullValue::Int16(None))
		);
		let passthrough = detect_from_db(&meta, "name").unwrap();
		stored.insert("name".into(), Value::from("x"));
		assert_eq!(passthrough(&stored, "name", &ctx()).unwrap(), Value::from("x"));
	}
}
