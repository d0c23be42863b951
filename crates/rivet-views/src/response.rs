//! View responses.

use http::StatusCode;
use serde_json::{Value as JsonValue, json};
use tracing::error;

/// Status and JSON body produced by a viewset action.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewResponse {
	pub status: StatusCode,
	pub body: JsonValue,
}

impl ViewResponse {
	pub fn new(status: StatusCode, body: JsonValue) -> Self {
		Self { status, body }
	}

	pub fn ok(body: JsonValue) -> Self {
		Self::new(StatusCode::OK, body)
	}

	pub fn created(body: JsonValue) -> Self {
		Self::new(StatusCode::CREATED, body)
	}

	/// 204 with a null body.
	pub fn no_content() -> Self {
		Self::new(StatusCode::NO_CONTENT, JsonValue::Null)
	}

	pub fn method_not_allowed() -> Self {
		Self::new(
			StatusCode::METHOD_NOT_ALLOWED,
			json!({ "message": "Method not allowed" }),
		)
	}

	pub fn is_success(&self) -> bool {
		self.status.is_success()
	}
}

impl From<rivet_core::Error> for ViewResponse {
	/// Validation errors become 400 with the field error body, not-found 404.
	/// Anything else is logged and answered with a generic 500.
	fn from(err: rivet_core::Error) -> Self {
		let status = err.status_code();
		if status.is_server_error() {
			error!(error = %err, "request failed");
		}
		Self::new(status, err.to_body())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rivet_core::ValidationError;
	use rstest::rstest;

	#[rstest]
	fn test_validation_error_response() {
		let response = ViewResponse::from(rivet_core::Error::Validation(ValidationError::single(
			"name",
			"required",
		)));
		assert_eq!(response.status, StatusCode::BAD_REQUEST);
		assert_eq!(response.body, json!({"errors": {"name": ["required"]}}));
	}

	#[rstest]
	fn test_internal_error_is_generic() {
		let response = ViewResponse::from(rivet_core::Error::Internal("pool exhausted".into()));
		assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
		assert_eq!(response.body, json!({"message": "Internal server error"}));
	}
}
