//! Serializer fields.
//!
//! A [`Field`] bundles the three conversions of one wire name (to
//! representation, to internal value, from storage) with its read/write
//! flags. Model serializers build fields from the detector chains; hand-built
//! fields default to plain pass-through conversions.

use std::fmt;
use std::sync::Arc;

use rivet_core::{ConvertError, InternalValue, RequestContext, Representation, Value};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::detectors::{
	passthrough_from_db, passthrough_internal_value, passthrough_representation,
};

/// Converts the named entry of an internal value into its wire form.
pub type RepresentationFunc = Arc<
	dyn Fn(&InternalValue, &str, &RequestContext) -> Result<JsonValue, FieldError> + Send + Sync,
>;

/// Converts the named entry of a payload into an internal value.
pub type InternalValueFunc = Arc<
	dyn Fn(&Representation, &str, &RequestContext) -> Result<Value, FieldError> + Send + Sync,
>;

/// Converts the named entry of a storage row into an internal value.
pub type FromDbFunc =
	Arc<dyn Fn(&InternalValue, &str, &RequestContext) -> Result<Value, FieldError> + Send + Sync>;

/// Failure of one field conversion.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldError {
	/// The input has no entry for the field. Serializers skip the field.
	#[error("Field `{0}` is not present")]
	NotPresent(String),

	#[error(transparent)]
	Convert(#[from] ConvertError),
}

impl FieldError {
	pub fn is_not_present(&self) -> bool {
		matches!(self, FieldError::NotPresent(_))
	}
}

/// One field of a serializer.
///
/// # Examples
///
/// ```
/// use rivet_core::{InternalValue, RequestContext, Value};
/// use rivet_rest::Field;
/// use serde_json::json;
///
/// let ctx = RequestContext::default();
/// let field = Field::new("kind").with_static_value(Value::from("article"));
///
/// let payload = json!({"kind": "ignored"});
/// assert_eq!(
///     field.to_internal_value(payload.as_object().unwrap(), &ctx).unwrap(),
///     Value::from("article")
/// );
///
/// let secret = Field::new("password").write_only();
/// assert!(!secret.is_readable());
/// ```
#[derive(Clone)]
pub struct Field {
	name: String,
	representation: RepresentationFunc,
	internal_value: InternalValueFunc,
	from_db: FromDbFunc,
	readable: bool,
	writable: bool,
}

impl Field {
	/// A read-write field with pass-through conversions.
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			representation: passthrough_representation(),
			internal_value: passthrough_internal_value(),
			from_db: passthrough_from_db(),
			readable: true,
			writable: true,
		}
	}

	/// A read-write field from already bound conversions.
	pub fn from_parts(
		name: impl Into<String>,
		representation: RepresentationFunc,
		internal_value: InternalValueFunc,
		from_db: FromDbFunc,
	) -> Self {
		Self {
			name: name.into(),
			representation,
			internal_value,
			from_db,
			readable: true,
			writable: true,
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn to_representation(
		&self,
		value: &InternalValue,
		ctx: &RequestContext,
	) -> Result<JsonValue, FieldError> {
		(self.representation)(value, &self.name, ctx)
	}

	pub fn to_internal_value(
		&self,
		payload: &Representation,
		ctx: &RequestContext,
	) -> Result<Value, FieldError> {
		(self.internal_value)(payload, &self.name, ctx)
	}

	pub fn from_db(&self, stored: &InternalValue, ctx: &RequestContext) -> Result<Value, FieldError> {
		(self.from_db)(stored, &self.name, ctx)
	}

	/// Rendered, never written.
	pub fn read_only(mut self) -> Self {
		self.readable = true;
		self.writable = false;
		self
	}

	/// Written, never rendered.
	pub fn write_only(mut self) -> Self {
		self.readable = false;
		self.writable = true;
		self
	}

	pub fn read_write(mut self) -> Self {
		self.readable = true;
		self.writable = true;
		self
	}

	pub fn is_readable(&self) -> bool {
		self.readable
	}

	pub fn is_writable(&self) -> bool {
		self.writable
	}

	pub fn with_representation_func<F>(mut self, func: F) -> Self
	where
		F: Fn(&InternalValue, &str, &RequestContext) -> Result<JsonValue, FieldError>
			+ Send
			+ Sync
			+ 'static,
	{
		self.representation = Arc::new(func);
		self
	}

	pub fn with_internal_value_func<F>(mut self, func: F) -> Self
	where
		F: Fn(&Representation, &str, &RequestContext) -> Result<Value, FieldError>
			+ Send
			+ Sync
			+ 'static,
	{
		self.internal_value = Arc::new(func);
		self
	}

	pub fn with_from_db_func<F>(mut self, func: F) -> Self
	where
		F: Fn(&InternalValue, &str, &RequestContext) -> Result<Value, FieldError>
			+ Send
			+ Sync
			+ 'static,
	{
		self.from_db = Arc::new(func);
		self
	}

	/// Ignores the payload and always yields `value`.
	pub fn with_static_value(self, value: Value) -> Self {
		self.with_internal_value_func(move |_payload, _name, _ctx| Ok(value.clone()))
	}
}

impl fmt::Debug for Field {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Field")
			.field("name", &self.name)
			.field("readable", &self.readable)
			.field("writable", &self.writable)
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use serde_json::json;

	fn ctx() -> RequestContext {
		RequestContext::default()
	}

	#[rstest]
	fn test_passthrough_both_directions() {
		let field = Field::new("tags");
		let payload = json!({"tags": ["a", 1]});
		let value = field
			.to_internal_value(payload.as_object().unwrap(), &ctx())
			.unwrap();
		assert_eq!(value, Value::List(vec![Value::from("a"), Value::Int(1)]));

		let mut internal = InternalValue::new();
		internal.insert("tags".into(), value);
		assert_eq!(
			field.to_representation(&internal, &ctx()).unwrap(),
			json!(["a", 1])
		);
	}

	#[rstest]
	fn test_absent_key_is_not_present() {
		let field = Field::new("title");
		let err = field
			.to_internal_value(&Representation::new(), &ctx())
			.unwrap_err();
		assert!(err.is_not_present());
		assert!(field.from_db(&InternalValue::new(), &ctx()).unwrap_err().is_not_present());
	}

	#[rstest]
	#[case(Field::new("a").read_only(), true, false)]
	#[case(Field::new("a").write_only(), false, true)]
	#[case(Field::new("a").read_only().read_write(), true, true)]
	#[case(Field::new("a").write_only().read_only(), true, false)]
	fn test_access_mutators_are_exclusive(
		#[case] field: Field,
		#[case] readable: bool,
		#[case] writable: bool,
	) {
		assert_eq!(field.is_readable(), readable);
		assert_eq!(field.is_writable(), writable);
	}

	#[rstest]
	fn test_custom_representation_func_receives_name() {
		let field = Field::new("slug").with_representation_func(|value, name, _ctx| {
			Ok(json!(format!(
				"{name}:{}",
				value.get(name).and_then(Value::as_str).unwrap_or_default()
			)))
		});
		let mut internal = InternalValue::new();
		internal.insert("slug".into(), Value::from("x"));
		assert_eq!(field.to_representation(&internal, &ctx()).unwrap(), json!("slug:x"));
	}
}
