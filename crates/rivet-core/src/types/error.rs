use thiserror::Error;

/// Failure of a single value conversion.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConvertError {
	#[error("Expected type `{expected}`, got `{found}`")]
	TypeMismatch { expected: String, found: String },

	#[error("Value {0} is not an integer")]
	NotAnInteger(String),

	#[error("Value {value} is out of range for `{target}`")]
	OutOfRange { value: String, target: &'static str },

	#[error("Value {0} is negative")]
	Negative(String),

	#[error("Error converting value for type `{type_name}`: {source}")]
	Mapper {
		type_name: String,
		#[source]
		source: Box<ConvertError>,
	},

	#[error("missing field `{0}`")]
	MissingField(String),

	#[error("{0}")]
	Invalid(String),
}

impl ConvertError {
	pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
		ConvertError::TypeMismatch {
			expected: expected.into(),
			found: found.into(),
		}
	}

	pub fn invalid(message: impl Into<String>) -> Self {
		ConvertError::Invalid(message.into())
	}

	/// Wraps the error with the name of the type whose mapper produced it.
	pub fn in_mapper(self, type_name: impl Into<String>) -> Self {
		ConvertError::Mapper {
			type_name: type_name.into(),
			source: Box::new(self),
		}
	}
}
