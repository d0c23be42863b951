//! Placeholder serializer for models without one.

use std::marker::PhantomData;

use rivet_core::{InternalValue, Model, RequestContext, Representation};

use super::{Serializer, SerializerError};

/// A serializer whose every operation fails.
///
/// Viewsets use it for actions that have no serializer configured, so a
/// request reaching such an action fails with a clear message instead of
/// silently accepting data.
pub struct MissingSerializer<M: Model> {
	_model: PhantomData<fn() -> M>,
}

impl<M: Model> MissingSerializer<M> {
	pub fn new() -> Self {
		Self {
			_model: PhantomData,
		}
	}

	fn error() -> SerializerError {
		SerializerError::Missing(format!(
			"{} does not have a serializer",
			M::meta().type_name()
		))
	}
}

impl<M: Model> Default for MissingSerializer<M> {
	fn default() -> Self {
		Self::new()
	}
}

impl<M: Model> Serializer for MissingSerializer<M> {
	fn to_internal_value(
		&self,
		_payload: &Representation,
		_ctx: &RequestContext,
	) -> Result<InternalValue, SerializerError> {
		Err(Self::error())
	}

	fn to_representation(
		&self,
		_value: &InternalValue,
		_ctx: &RequestContext,
	) -> Result<Representation, SerializerError> {
		Err(Self::error())
	}

	fn from_db(
		&self,
		_stored: &InternalValue,
		_ctx: &RequestContext,
	) -> Result<InternalValue, SerializerError> {
		Err(Self::error())
	}

	fn validate(&self, _value: &InternalValue, _ctx: &RequestContext) -> Result<(), SerializerError> {
		Err(Self::error())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rivet_core::Model;
	use rstest::rstest;

	#[derive(Model)]
	struct Ledger {
		id: i64,
	}

	#[rstest]
	fn test_every_operation_fails() {
		let serializer = MissingSerializer::<Ledger>::new();
		let ctx = RequestContext::default();
		let err = serializer
			.to_internal_value(&Representation::new(), &ctx)
			.unwrap_err();
		assert_eq!(err.to_string(), "Ledger does not have a serializer");
		assert!(serializer.to_representation(&InternalValue::new(), &ctx).is_err());
		assert!(serializer.from_db(&InternalValue::new(), &ctx).is_err());
		assert!(serializer.validate(&InternalValue::new(), &ctx).is_err());

		let error: rivet_core::Error = err.into();
		assert_eq!(error.status_code(), http::StatusCode::INTERNAL_SERVER_ERROR);
	}
}
