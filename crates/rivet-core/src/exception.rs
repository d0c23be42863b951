//! Error kinds that cross the boundary to the view layer.

use std::collections::BTreeMap;
use std::fmt;

use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use thiserror::Error;

/// Field-keyed validation messages.
///
/// # Examples
///
/// ```
/// use rivet_core::ValidationError;
///
/// let mut error = ValidationError::new();
/// error.add("name", "This field may not be blank");
/// assert_eq!(
///     error.to_body(),
///     serde_json::json!({"errors": {"name": ["This field may not be blank"]}})
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
	field_errors: BTreeMap<String, Vec<String>>,
}

impl ValidationError {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
		let mut error = Self::new();
		error.add(field, message);
		error
	}

	/// Appends a message to the list of `field`.
	pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
		self.field_errors
			.entry(field.into())
			.or_default()
			.push(message.into());
	}

	pub fn merge(&mut self, other: ValidationError) {
		for (field, messages) in other.field_errors {
			self.field_errors.entry(field).or_default().extend(messages);
		}
	}

	pub fn is_empty(&self) -> bool {
		self.field_errors.is_empty()
	}

	pub fn field_errors(&self) -> &BTreeMap<String, Vec<String>> {
		&self.field_errors
	}

	pub fn messages(&self, field: &str) -> Option<&[String]> {
		self.field_errors.get(field).map(Vec::as_slice)
	}

	/// Wire body: `{"errors": {<field>: [<message>, ...]}}`.
	pub fn to_body(&self) -> JsonValue {
		json!({ "errors": self.field_errors })
	}
}

impl fmt::Display for ValidationError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut first = true;
		for (field, messages) in &self.field_errors {
			if !first {
				f.write_str("; ")?;
			}
			first = false;
			write!(f, "{}: {}", field, messages.join(", "))?;
		}
		Ok(())
	}
}

impl std::error::Error for ValidationError {}

/// Top-level error kinds surfaced to the view layer.
#[derive(Debug, Error)]
pub enum Error {
	#[error("Validation failed: {0}")]
	Validation(ValidationError),

	#[error("Not found: {0}")]
	NotFound(String),

	#[error("Bad request: {0}")]
	BadRequest(String),

	#[error("Improperly configured: {0}")]
	ImproperlyConfigured(String),

	#[error("Internal error: {0}")]
	Internal(String),
}

impl Error {
	pub fn status_code(&self) -> StatusCode {
		match self {
			Error::Validation(_) | Error::BadRequest(_) => StatusCode::BAD_REQUEST,
			Error::NotFound(_) => StatusCode::NOT_FOUND,
			Error::ImproperlyConfigured(_) | Error::Internal(_) => {
				StatusCode::INTERNAL_SERVER_ERROR
			}
		}
	}

	/// Response body; internal failures get a generic message.
	pub fn to_body(&self) -> JsonValue {
		match self {
			Error::Validation(errors) => errors.to_body(),
			Error::NotFound(message) | Error::BadRequest(message) => json!({ "message": message }),
			Error::ImproperlyConfigured(_) | Error::Internal(_) => {
				json!({ "message": "Internal server error" })
			}
		}
	}
}

impl From<ValidationError> for Error {
	fn from(error: ValidationError) -> Self {
		Error::Validation(error)
	}
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	#[case(Error::Validation(ValidationError::single("a", "b")), StatusCode::BAD_REQUEST)]
	#[case(Error::NotFound("x".into()), StatusCode::NOT_FOUND)]
	#[case(Error::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR)]
	fn test_status_codes(#[case] error: Error, #[case] status: StatusCode) {
		assert_eq!(error.status_code(), status);
	}

	#[rstest]
	fn test_internal_body_hides_details() {
		let body = Error::Internal("db password wrong".into()).to_body();
		assert_eq!(body, json!({"message": "Internal server error"}));
	}

	#[rstest]
	fn test_merge_keeps_message_order() {
		let mut error = ValidationError::single("name", "first");
		error.merge(ValidationError::single("name", "second"));
		assert_eq!(error.messages("name").unwrap(), ["first", "second"]);
		assert_eq!(error.to_string(), "name: first, second");
	}
}
