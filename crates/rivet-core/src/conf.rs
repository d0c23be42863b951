//! Settings
//!
//! This module provides [`RivetSettings`], loaded from a TOML document. Every
//! section is optional and falls back to its defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading settings.
#[derive(Debug, Error)]
pub enum SettingsError {
	#[error("Failed to read settings file: {0}")]
	Io(#[from] std::io::Error),

	#[error("Failed to parse settings: {0}")]
	Parse(#[from] toml::de::Error),
}

/// Root settings
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RivetSettings {
	/// Defaults for list pagination
	pub pagination: PaginationSettings,

	/// Connection settings of the SQL backend
	pub database: DatabaseSettings,
}

impl RivetSettings {
	/// Parse settings from a TOML string
	///
	/// # Examples
	///
	/// ```
	/// use rivet_core::conf::RivetSettings;
	///
	/// let settings = RivetSettings::from_toml_str(
	///     r#"
	///     [pagination]
	///     default_limit = 20
	///     envelope = true
	///     "#,
	/// )
	/// .unwrap();
	///
	/// assert_eq!(settings.pagination.default_limit, Some(20));
	/// assert!(settings.pagination.envelope);
	/// assert_eq!(settings.database.max_connections, 5);
	/// ```
	pub fn from_toml_str(source: &str) -> Result<Self, SettingsError> {
		Ok(toml::from_str(source)?)
	}

	/// Read settings from a TOML file
	pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
		let source = std::fs::read_to_string(path)?;
		Self::from_toml_str(&source)
	}
}

/// Pagination settings
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationSettings {
	/// Limit used when the request does not provide one
	pub default_limit: Option<u64>,

	/// Upper bound applied to requested limits
	pub max_limit: Option<u64>,

	/// Wrap pages in `{"count": .., "results": [..]}`
	pub envelope: bool,
}

/// Database settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
	/// Connection URL, e.g. `sqlite::memory:` or `sqlite://app.db`
	pub url: String,

	/// Size of the connection pool
	pub max_connections: u32,
}

impl Default for DatabaseSettings {
	fn default() -> Self {
		Self {
			url: "sqlite::memory:".to_string(),
			max_connections: 5,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_empty_document_uses_defaults() {
		let settings = RivetSettings::from_toml_str("").unwrap();
		assert_eq!(settings, RivetSettings::default());
		assert_eq!(settings.database.url, "sqlite::memory:");
	}

	#[rstest]
	fn test_database_section() {
		let settings = RivetSettings::from_toml_str(
			r#"
			[database]
			url = "sqlite://app.db"
			max_connections = 1
			"#,
		)
		.unwrap();
		assert_eq!(settings.database.url, "sqlite://app.db");
		assert_eq!(settings.database.max_connections, 1);
		assert_eq!(settings.pagination.max_limit, None);
	}

	#[rstest]
	fn test_invalid_document_is_an_error() {
		let err = RivetSettings::from_toml_str("[pagination]\nenvelope = 3").unwrap_err();
		assert!(matches!(err, SettingsError::Parse(_)));
	}
}
