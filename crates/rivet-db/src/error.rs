//! Query errors.

use rivet_core::{ConvertError, ValidationError};
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by CRUD operations, query drivers and transaction hooks.
#[derive(Debug, Error)]
pub enum QueryError {
	/// The addressed record does not exist.
	#[error("Record not found")]
	NotFound,

	/// A backend call failed.
	#[error("{context}: {source}")]
	Backend {
		context: String,
		#[source]
		source: BoxError,
	},

	#[error(transparent)]
	Convert(#[from] ConvertError),

	/// Hooks may reject the operation with field errors.
	#[error("Validation failed: {0}")]
	Validation(#[from] ValidationError),

	#[error("Transaction error: {0}")]
	Transaction(String),

	#[error("Operation `{0}` is not supported by this driver")]
	Unsupported(&'static str),

	#[error(transparent)]
	Other(#[from] anyhow::Error),
}

impl QueryError {
	/// Wraps a backend failure with the operation it interrupted.
	pub fn backend(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
		QueryError::Backend {
			context: context.into(),
			source: source.into(),
		}
	}

	pub fn is_not_found(&self) -> bool {
		matches!(self, QueryError::NotFound)
	}
}

pub type QueryResult<T> = std::result::Result<T, QueryError>;

impl From<QueryError> for rivet_core::Error {
	fn from(error: QueryError) -> Self {
		match error {
			QueryError::NotFound => rivet_core::Error::NotFound(error.to_string()),
			QueryError::Validation(errors) => rivet_core::Error::Validation(errors),
			other => rivet_core::Error::Internal(other.to_string()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use http::StatusCode;
	use rstest::rstest;

	#[rstest]
	#[case(QueryError::NotFound, StatusCode::NOT_FOUND)]
	#[case(QueryError::Validation(ValidationError::single("name", "taken")), StatusCode::BAD_REQUEST)]
	#[case(QueryError::backend("insert into `books`", "disk full"), StatusCode::INTERNAL_SERVER_ERROR)]
	#[case(QueryError::Unsupported("list"), StatusCode::INTERNAL_SERVER_ERROR)]
	fn test_status_of_query_errors(#[case] error: QueryError, #[case] status: StatusCode) {
		assert_eq!(rivet_core::Error::from(error).status_code(), status);
	}

	#[rstest]
	fn test_backend_error_keeps_context() {
		let error = QueryError::backend("select from `books`", "no such table: books");
		assert_eq!(error.to_string(), "select from `books`: no such table: books");
	}
}
