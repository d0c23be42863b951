use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{Model, ModelMeta, field_from};
use crate::types::{ConvertError, FieldType, InternalValue};

/// Common columns for models identified by a UUID.
///
/// Embed it with `#[rivet(embed)]` to flatten `id`, `created_at` and
/// `updated_at` into the outer model.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseModel {
	pub id: Uuid,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl BaseModel {
	pub fn new() -> Self {
		let now = Utc::now();
		Self {
			id: Uuid::new_v4(),
			created_at: now,
			updated_at: now,
		}
	}
}

impl Default for BaseModel {
	fn default() -> Self {
		Self::new()
	}
}

impl Model for BaseModel {
	fn meta() -> &'static ModelMeta {
		static META: std::sync::OnceLock<ModelMeta> = std::sync::OnceLock::new();
		META.get_or_init(|| {
			ModelMeta::builder::<Self>("base_model")
				.primary_key::<Uuid>("id", "id")
				.field::<DateTime<Utc>>("created_at", "created_at")
				.field::<DateTime<Utc>>("updated_at", "updated_at")
				.build()
		})
	}

	fn into_internal_value(self) -> InternalValue {
		let mut value = InternalValue::new();
		value.insert("id".to_string(), self.id.into_value());
		value.insert("created_at".to_string(), self.created_at.into_value());
		value.insert("updated_at".to_string(), self.updated_at.into_value());
		value
	}

	fn from_internal_value(value: &InternalValue) -> Result<Self, ConvertError> {
		Ok(Self {
			id: field_from(value, "id")?,
			created_at: field_from(value, "created_at")?,
			updated_at: field_from(value, "updated_at")?,
		})
	}
}
