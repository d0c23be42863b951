//! Request-scoped data handed to serializers and query modifiers.

use std::collections::HashMap;

use http::{Extensions, Method};

/// What the serializers and query modifiers need to know about the request
/// being served.
///
/// # Examples
///
/// ```
/// use rivet_core::RequestContext;
///
/// let ctx = RequestContext::new(http::Method::GET, "/products")
///     .with_query_string("limit=10&name=lamp")
///     .with_param("id", "4");
/// assert_eq!(ctx.query_param("limit"), Some("10"));
/// assert_eq!(ctx.param("id"), Some("4"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
	method: Method,
	path: String,
	query: HashMap<String, String>,
	params: HashMap<String, String>,
	extensions: Extensions,
}

impl RequestContext {
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self {
			method,
			path: path.into(),
			..Self::default()
		}
	}

	/// Adds the parameters of a URL query string. Malformed input is ignored.
	pub fn with_query_string(mut self, query: &str) -> Self {
		match serde_urlencoded::from_str::<Vec<(String, String)>>(query) {
			Ok(pairs) => self.query.extend(pairs),
			Err(err) => tracing::debug!(error = %err, "ignoring malformed query string"),
		}
		self
	}

	pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.query.insert(key.into(), value.into());
		self
	}

	/// Adds a path parameter.
	pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.params.insert(key.into(), value.into());
		self
	}

	pub fn method(&self) -> &Method {
		&self.method
	}

	pub fn path(&self) -> &str {
		&self.path
	}

	pub fn query_param(&self, key: &str) -> Option<&str> {
		self.query.get(key).map(String::as_str)
	}

	pub fn query(&self) -> &HashMap<String, String> {
		&self.query
	}

	pub fn param(&self, key: &str) -> Option<&str> {
		self.params.get(key).map(String::as_str)
	}

	/// Typed values attached by middleware, e.g. the authenticated user.
	pub fn extensions(&self) -> &Extensions {
		&self.extensions
	}

	pub fn extensions_mut(&mut self) -> &mut Extensions {
		&mut self.extensions
	}
}
