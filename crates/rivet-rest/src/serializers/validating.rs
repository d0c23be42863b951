//! Validating serializer
//!
//! Runs validators over the internal value produced by another serializer.

use std::sync::Arc;

use rivet_core::{InternalValue, RequestContext, Representation, ValidationError, Value};

use super::{Serializer, SerializerError};

/// A check over a whole internal value.
pub trait Validator: Send + Sync {
	fn validate(&self, value: &InternalValue, ctx: &RequestContext) -> Result<(), ValidationError>;
}

/// Adapts a closure into a [`Validator`].
///
/// # Examples
///
/// ```
/// use rivet_core::{InternalValue, RequestContext, ValidationError, Value};
/// use rivet_rest::{FnValidator, Validator};
///
/// let positive = FnValidator::new(|value: &InternalValue, _ctx: &RequestContext| {
///     match value.get("quantity").and_then(Value::as_i64) {
///         Some(quantity) if quantity <= 0 => {
///             Err(ValidationError::single("quantity", "Must be positive"))
///         }
///         _ => Ok(()),
///     }
/// });
///
/// let mut value = InternalValue::new();
/// value.insert("quantity".into(), Value::Int(0));
/// assert!(positive.validate(&value, &RequestContext::default()).is_err());
/// ```
pub struct FnValidator<F>(F);

impl<F> FnValidator<F>
where
	F: Fn(&InternalValue, &RequestContext) -> Result<(), ValidationError> + Send + Sync,
{
	pub fn new(func: F) -> Self {
		Self(func)
	}
}

impl<F> Validator for FnValidator<F>
where
	F: Fn(&InternalValue, &RequestContext) -> Result<(), ValidationError> + Send + Sync,
{
	fn validate(&self, value: &InternalValue, ctx: &RequestContext) -> Result<(), ValidationError> {
		(self.0)(value, ctx)
	}
}

/// Requires the listed fields to be present and not null.
///
/// Only applies to requests that create records, since partial updates
/// legally omit fields.
#[derive(Debug, Clone)]
pub struct RequiredFields {
	fields: Vec<String>,
}

impl RequiredFields {
	pub fn new<I, S>(fields: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			fields: fields.into_iter().map(Into::into).collect(),
		}
	}
}

impl Validator for RequiredFields {
	fn validate(&self, value: &InternalValue, ctx: &RequestContext) -> Result<(), ValidationError> {
		if *ctx.method() != http::Method::POST {
			return Ok(());
		}
		let mut errors = ValidationError::new();
		for field in &self.fields {
			let missing = match value.get(field) {
				None | Some(Value::Null) => true,
				Some(Value::Nullable(inner)) => !inner.is_valid(),
				Some(_) => false,
			};
			if missing {
				errors.add(field.as_str(), "This field is required.");
			}
		}
		if errors.is_empty() { Ok(()) } else { Err(errors) }
	}
}

/// Wraps a serializer and validates its internal values.
///
/// Validators run in registration order after a successful
/// `to_internal_value`; the first failing validator decides the error.
pub struct ValidatingSerializer<S> {
	inner: S,
	validators: Vec<Arc<dyn Validator>>,
}

impl<S: Serializer> ValidatingSerializer<S> {
	pub fn new(inner: S) -> Self {
		Self {
			inner,
			validators: Vec::new(),
		}
	}

	pub fn with_validator(mut self, validator: impl Validator + 'static) -> Self {
		self.validators.push(Arc::new(validator));
		self
	}

	pub fn inner(&self) -> &S {
		&self.inner
	}
}

impl<S: Serializer> Serializer for ValidatingSerializer<S> {
	fn to_internal_value(
		&self,
		payload: &Representation,
		ctx: &RequestContext,
	) -> Result<InternalValue, SerializerError> {
		let value = self.inner.to_internal_value(payload, ctx)?;
		self.validate(&value, ctx)?;
		Ok(value)
	}

	fn to_representation(
		&self,
		value: &InternalValue,
		ctx: &RequestContext,
	) -> Result<Representation, SerializerError> {
		self.inner.to_representation(value, ctx)
	}

	fn from_db(
		&self,
		stored: &InternalValue,
		ctx: &RequestContext,
	) -> Result<InternalValue, SerializerError> {
		self.inner.from_db(stored, ctx)
	}

	fn validate(&self, value: &InternalValue, ctx: &RequestContext) -> Result<(), SerializerError> {
		self.inner.validate(value, ctx)?;
		for validator in &self.validators {
			validator.validate(value, ctx)?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rivet_core::Model;
	use rstest::rstest;
	use serde_json::json;
	use std::sync::atomic::{AtomicUsize, Ordering};

	use crate::serializers::ModelSerializer;

	#[derive(Model)]
	struct Booking {
		id: i64,
		guests: i64,
		name: String,
	}

	fn post() -> RequestContext {
		RequestContext::new(http::Method::POST, "/bookings")
	}

	fn reject(field: &'static str) -> impl Validator {
		FnValidator::new(move |_value: &InternalValue, _ctx: &RequestContext| {
			Err(ValidationError::single(field, "rejected"))
		})
	}

	#[rstest]
	fn test_first_validator_error_wins() {
		let calls = Arc::new(AtomicUsize::new(0));
		let counter = Arc::clone(&calls);
		let serializer = ValidatingSerializer::new(ModelSerializer::<Booking>::new().unwrap())
			.with_validator(reject("first"))
			.with_validator(FnValidator::new(move |_value: &InternalValue, _ctx: &RequestContext| {
				counter.fetch_add(1, Ordering::SeqCst);
				Ok(())
			}))
			.with_validator(reject("second"));

		let payload = json!({"guests": 2, "name": "Ann"});
		let err = serializer
			.to_internal_value(payload.as_object().unwrap(), &post())
			.unwrap_err();
		assert_eq!(
			err,
			SerializerError::Validation(ValidationError::single("first", "rejected"))
		);
		assert_eq!(calls.load(Ordering::SeqCst), 0);
	}

	#[rstest]
	fn test_validators_do_not_run_on_conversion_errors() {
		let serializer = ValidatingSerializer::new(ModelSerializer::<Booking>::new().unwrap())
			.with_validator(reject("never"));
		let payload = json!({"guests": "two"});
		let SerializerError::Validation(errors) = serializer
			.to_internal_value(payload.as_object().unwrap(), &post())
			.unwrap_err()
		else {
			panic!("expected a validation error");
		};
		assert!(errors.messages("guests").is_some());
		assert!(errors.messages("never").is_none());
	}

	#[rstest]
	#[case(http::Method::POST, json!({"guests": 2}), Some("name"))]
	#[case(http::Method::POST, json!({"guests": 2, "name": "Ann"}), None)]
	#[case(http::Method::PATCH, json!({"guests": 2}), None)]
	fn test_required_fields(
		#[case] method: http::Method,
		#[case] payload: serde_json::Value,
		#[case] missing: Option<&str>,
	) {
		let serializer = ValidatingSerializer::new(ModelSerializer::<Booking>::new().unwrap())
			.with_validator(RequiredFields::new(["guests", "name"]));
		let ctx = RequestContext::new(method, "/bookings");
		let result = serializer.to_internal_value(payload.as_object().unwrap(), &ctx);
		match missing {
			Some(field) => {
				let Err(SerializerError::Validation(errors)) = result else {
					panic!("expected a validation error");
				};
				assert_eq!(
					errors.messages(field).unwrap(),
					["This field is required."]
				);
			}
			None => assert!(result.is_ok()),
		}
	}
}
