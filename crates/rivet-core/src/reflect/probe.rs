use crate::types::{Capabilities, NullableKind, TypeKey};

use super::{FieldMeta, ModelMeta};

/// Capability settings of one field, as seen by the detector chains.
#[derive(Debug, Clone, Copy)]
pub struct FieldSettings<'a> {
	model: &'a ModelMeta,
	field: &'a FieldMeta,
}

impl<'a> FieldSettings<'a> {
	pub fn model(&self) -> &'a ModelMeta {
		self.model
	}

	pub fn field(&self) -> &'a FieldMeta {
		self.field
	}

	pub fn name(&self) -> &'a str {
		self.field.name()
	}

	pub fn type_key(&self) -> TypeKey {
		self.field.type_key()
	}

	pub fn capabilities(&self) -> &'a Capabilities {
		self.field.capabilities()
	}

	pub fn is_representable(&self) -> bool {
		self.capabilities().is_representable()
	}

	pub fn is_parsable(&self) -> bool {
		self.capabilities().is_parsable()
	}

	pub fn is_text_marshaler(&self) -> bool {
		self.capabilities().is_text_marshaler()
	}

	pub fn is_text_unmarshaler(&self) -> bool {
		self.capabilities().is_text_unmarshaler()
	}

	pub fn nullable_kind(&self) -> Option<NullableKind> {
		self.capabilities().nullable_kind()
	}

	pub fn is_date_time(&self) -> bool {
		self.capabilities().is_date_time()
	}

	pub fn is_json_blob(&self) -> bool {
		self.capabilities().is_json_blob()
	}

	pub fn is_relation(&self) -> bool {
		self.field.is_relation()
	}
}

/// Looks up the capability settings of the field with wire name `field`.
///
/// Returns `None` when the model declares no such field.
///
/// # Examples
///
/// ```
/// use rivet_core::{ModelMeta, probe};
///
/// struct Event;
///
/// let meta = ModelMeta::builder::<Event>("events")
///     .field::<chrono::DateTime<chrono::Utc>>("at", "at")
///     .field::<Option<i32>>("priority", "priority")
///     .build();
/// assert!(probe(&meta, "at").unwrap().is_date_time());
/// assert!(probe(&meta, "priority").unwrap().nullable_kind().is_some());
/// assert!(probe(&meta, "missing").is_none());
/// ```
pub fn probe<'a>(model: &'a ModelMeta, field: &str) -> Option<FieldSettings<'a>> {
	model.field(field).map(|field| FieldSettings { model, field })
}
