//! Serializers
//!
//! A [`Serializer`] converts whole model instances between their wire form
//! ([`Representation`]), their internal form ([`InternalValue`]) and the rows
//! a storage backend returns.

mod missing;
mod model;
mod validating;

use rivet_core::{InternalValue, RequestContext, Representation, ValidationError};
use thiserror::Error;

use crate::detectors::DetectionError;

pub use missing::MissingSerializer;
pub use model::ModelSerializer;
pub use validating::{FnValidator, RequiredFields, ValidatingSerializer, Validator};

/// Errors raised by serializers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SerializerError {
	#[error("Validation failed: {0}")]
	Validation(#[from] ValidationError),

	#[error(transparent)]
	Detection(#[from] DetectionError),

	#[error("Serializer of `{model}` has no field `{field}`")]
	FieldNotFound { model: String, field: String },

	/// Stored data could not be converted for output. Unlike
	/// [`SerializerError::Validation`] this is never the client's fault.
	#[error("Conversion of stored data failed: {0}")]
	Conversion(ValidationError),

	/// The model has no serializer for the requested operation.
	#[error("{0}")]
	Missing(String),
}

impl From<SerializerError> for rivet_core::Error {
	fn from(error: SerializerError) -> Self {
		match error {
			SerializerError::Validation(errors) => rivet_core::Error::Validation(errors),
			SerializerError::Detection(_) | SerializerError::FieldNotFound { .. } => {
				rivet_core::Error::ImproperlyConfigured(error.to_string())
			}
			SerializerError::Conversion(_) => rivet_core::Error::Internal(error.to_string()),
			SerializerError::Missing(message) => rivet_core::Error::Internal(message),
		}
	}
}

/// Converts model instances between wire, internal and storage forms.
pub trait Serializer: Send + Sync {
	fn to_internal_value(
		&self,
		payload: &Representation,
		ctx: &RequestContext,
	) -> Result<InternalValue, SerializerError>;

	fn to_representation(
		&self,
		value: &InternalValue,
		ctx: &RequestContext,
	) -> Result<Representation, SerializerError>;

	/// Converts a row read from storage into an internal value.
	fn from_db(
		&self,
		stored: &InternalValue,
		ctx: &RequestContext,
	) -> Result<InternalValue, SerializerError>;

	fn validate(&self, _value: &InternalValue, _ctx: &RequestContext) -> Result<(), SerializerError> {
		Ok(())
	}
}
