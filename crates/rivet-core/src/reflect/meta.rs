use std::collections::HashMap;

use crate::types::{Capabilities, ConvertError, FieldType, InternalValue, TypeKey};

/// A model type with reflected field metadata.
///
/// Usually derived with `#[derive(Model)]`; the derive caches the metadata so
/// it is computed once per process.
pub trait Model: Sized + Send + Sync + 'static {
	fn meta() -> &'static ModelMeta;

	/// Shallow conversion into an internal value keyed by wire names.
	fn into_internal_value(self) -> InternalValue;

	/// Builds the model from an internal value.
	fn from_internal_value(value: &InternalValue) -> Result<Self, ConvertError>;
}

/// Reads one field of an internal value as `T`.
pub fn field_from<T: FieldType>(value: &InternalValue, name: &str) -> Result<T, ConvertError> {
	match value.get(name) {
		Some(field) => T::from_value(field).map_err(|err| match err {
			ConvertError::MissingField(_) => err,
			other => ConvertError::invalid(format!("field `{name}`: {other}")),
		}),
		None => Err(ConvertError::MissingField(name.to_string())),
	}
}

/// Metadata of one declared field.
#[derive(Debug, Clone)]
pub struct FieldMeta {
	name: String,
	attribute: &'static str,
	type_key: TypeKey,
	capabilities: Capabilities,
	relation: bool,
	primary_key: bool,
	embedded: bool,
}

impl FieldMeta {
	/// Declares a field of type `T` stored in struct attribute `attribute`
	/// under wire name `name`.
	pub fn new<T: FieldType>(attribute: &'static str, name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			attribute,
			type_key: TypeKey::of::<T>(),
			capabilities: T::capabilities(),
			relation: false,
			primary_key: false,
			embedded: false,
		}
	}

	pub fn relation(mut self) -> Self {
		self.relation = true;
		self
	}

	pub fn primary_key(mut self) -> Self {
		self.primary_key = true;
		self
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn attribute(&self) -> &'static str {
		self.attribute
	}

	pub fn type_key(&self) -> TypeKey {
		self.type_key
	}

	pub fn capabilities(&self) -> &Capabilities {
		&self.capabilities
	}

	pub fn is_relation(&self) -> bool {
		self.relation
	}

	pub fn is_primary_key(&self) -> bool {
		self.primary_key
	}

	pub fn is_embedded(&self) -> bool {
		self.embedded
	}
}

/// Reflected metadata of a model type.
///
/// # Examples
///
/// ```
/// use rivet_core::ModelMeta;
///
/// struct Note;
///
/// let meta = ModelMeta::builder::<Note>("notes")
///     .primary_key::<i64>("id", "id")
///     .field::<String>("body", "body")
///     .build();
/// assert_eq!(meta.field_names().collect::<Vec<_>>(), ["id", "body"]);
/// assert_eq!(meta.primary_key().map(|f| f.name()), Some("id"));
/// ```
#[derive(Debug, Clone)]
pub struct ModelMeta {
	name: String,
	type_name: &'static str,
	fields: Vec<FieldMeta>,
	index: HashMap<String, usize>,
}

impl ModelMeta {
	pub fn builder<M: 'static>(name: impl Into<String>) -> ModelMetaBuilder {
		ModelMetaBuilder {
			name: name.into(),
			type_name: std::any::type_name::<M>(),
			fields: Vec::new(),
		}
	}

	/// Model (and table) name.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Short Rust type name, used in messages.
	pub fn type_name(&self) -> &'static str {
		self.type_name.rsplit("::").next().unwrap_or(self.type_name)
	}

	pub fn fields(&self) -> &[FieldMeta] {
		&self.fields
	}

	pub fn field(&self, name: &str) -> Option<&FieldMeta> {
		self.index.get(name).map(|&position| &self.fields[position])
	}

	/// Wire names in declaration order.
	pub fn field_names(&self) -> impl Iterator<Item = &str> {
		self.fields.iter().map(FieldMeta::name)
	}

	/// The field marked as primary key, else the field named `id`.
	pub fn primary_key(&self) -> Option<&FieldMeta> {
		self.fields
			.iter()
			.find(|field| field.primary_key)
			.or_else(|| self.field("id"))
	}
}

/// Builder of [`ModelMeta`].
#[derive(Debug)]
pub struct ModelMetaBuilder {
	name: String,
	type_name: &'static str,
	fields: Vec<FieldMeta>,
}

impl ModelMetaBuilder {
	pub fn field<T: FieldType>(self, attribute: &'static str, name: impl Into<String>) -> Self {
		self.push(FieldMeta::new::<T>(attribute, name))
	}

	pub fn relation<T: FieldType>(self, attribute: &'static str, name: impl Into<String>) -> Self {
		self.push(FieldMeta::new::<T>(attribute, name).relation())
	}

	pub fn primary_key<T: FieldType>(self, attribute: &'static str, name: impl Into<String>) -> Self {
		self.push(FieldMeta::new::<T>(attribute, name).primary_key())
	}

	/// Flattens the fields of an embedded model into this one.
	///
	/// Fields declared directly on the outer model shadow embedded fields with
	/// the same wire name, regardless of declaration order.
	pub fn embed(mut self, embedded: &ModelMeta) -> Self {
		for field in &embedded.fields {
			let mut field = field.clone();
			field.embedded = true;
			self = self.push(field);
		}
		self
	}

	pub fn push(mut self, field: FieldMeta) -> Self {
		match self.fields.iter().position(|existing| existing.name == field.name) {
			Some(position) if field.embedded && !self.fields[position].embedded => {}
			Some(position) => self.fields[position] = field,
			None => self.fields.push(field),
		}
		self
	}

	pub fn build(self) -> ModelMeta {
		let index = self
			.fields
			.iter()
			.enumerate()
			.map(|(position, field)| (field.name.clone(), position))
			.collect();
		ModelMeta {
			name: self.name,
			type_name: self.type_name,
			fields: self.fields,
			index,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	struct Base;
	struct Outer;

	fn base_meta() -> ModelMeta {
		ModelMeta::builder::<Base>("base")
			.field::<i64>("id", "id")
			.field::<String>("created", "created_at")
			.build()
	}

	#[rstest]
	fn test_outer_fields_shadow_embedded_fields() {
		let meta = ModelMeta::builder::<Outer>("outer")
			.field::<String>("id", "id")
			.embed(&base_meta())
			.field::<bool>("flag", "flag")
			.build();

		assert_eq!(
			meta.field_names().collect::<Vec<_>>(),
			["id", "created_at", "flag"]
		);
		let id = meta.field("id").unwrap();
		assert_eq!(id.type_key(), TypeKey::of::<String>());
		assert!(!id.is_embedded());
		assert!(meta.field("created_at").unwrap().is_embedded());
	}

	#[rstest]
	fn test_primary_key_falls_back_to_id() {
		let meta = base_meta();
		assert_eq!(meta.primary_key().unwrap().name(), "id");
		assert_eq!(meta.type_name(), "Base");

		let explicit = ModelMeta::builder::<Outer>("outer")
			.field::<i64>("id", "id")
			.primary_key::<String>("code", "code")
			.build();
		assert_eq!(explicit.primary_key().unwrap().name(), "code");
	}

	#[rstest]
	fn test_field_from_reports_missing_and_invalid() {
		let mut value = InternalValue::new();
		value.insert("count".into(), crate::Value::from("x"));
		assert_eq!(
			field_from::<i64>(&value, "other"),
			Err(ConvertError::MissingField("other".into()))
		);
		assert!(field_from::<i64>(&value, "count").is_err());
	}
}
