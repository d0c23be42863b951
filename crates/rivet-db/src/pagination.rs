//! Pagination.
//!
//! A [`Pagination`] is a query modifier that restricts the page window of a
//! list request and then shapes the serialized items into the response body.

use rivet_core::RequestContext;
use rivet_core::conf::PaginationSettings;
use serde_json::{Value as JsonValue, json};
use tracing::debug;

use crate::mods::QueryMod;
use crate::query::QuerySpec;

/// Restricts a list query and formats its result.
pub trait Pagination: QueryMod {
	/// Builds the response body from the serialized items of one page.
	fn format(&self, spec: &QuerySpec, items: Vec<JsonValue>) -> JsonValue;
}

/// Returns every record as a plain JSON array.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPagination;

impl QueryMod for NoPagination {
	fn apply(&self, _request: &RequestContext, _spec: &mut QuerySpec) {}
}

impl Pagination for NoPagination {
	fn format(&self, _spec: &QuerySpec, items: Vec<JsonValue>) -> JsonValue {
		JsonValue::Array(items)
	}
}

/// Reads `limit` and `offset` query parameters.
///
/// Values that are not non-negative integers are ignored. Without a `limit`
/// the default limit applies; requested limits are capped by the maximum.
/// With the envelope enabled the body is `{"count": <total>, "results": [..]}`
/// where `count` is the number of matching records before paging.
///
/// # Examples
///
/// ```
/// use rivet_core::RequestContext;
/// use rivet_db::{LimitOffsetPagination, Pagination, QueryMod, QuerySpec};
/// use serde_json::json;
///
/// let pagination = LimitOffsetPagination::new().with_max_limit(50).with_envelope(true);
/// let request = RequestContext::default().with_query_string("limit=500&offset=20");
///
/// let mut spec = QuerySpec::new();
/// pagination.apply(&request, &mut spec);
/// assert_eq!(spec.limit(), Some(50));
/// assert_eq!(spec.offset(), Some(20));
///
/// spec.set_total(73);
/// assert_eq!(
///     pagination.format(&spec, vec![json!({"id": 21})]),
///     json!({"count": 73, "results": [{"id": 21}]})
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct LimitOffsetPagination {
	default_limit: Option<u64>,
	max_limit: Option<u64>,
	envelope: bool,
}

impl LimitOffsetPagination {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn from_settings(settings: &PaginationSettings) -> Self {
		Self {
			default_limit: settings.default_limit,
			max_limit: settings.max_limit,
			envelope: settings.envelope,
		}
	}

	pub fn with_default_limit(mut self, limit: u64) -> Self {
		self.default_limit = Some(limit);
		self
	}

	pub fn with_max_limit(mut self, limit: u64) -> Self {
		self.max_limit = Some(limit);
		self
	}

	pub fn with_envelope(mut self, envelope: bool) -> Self {
		self.envelope = envelope;
		self
	}
}

fn read_param(request: &RequestContext, name: &str) -> Option<u64> {
	let raw = request.query_param(name)?;
	match raw.parse::<u64>() {
		Ok(value) => Some(value),
		Err(err) => {
			debug!(param = name, value = raw, error = %err, "ignoring invalid pagination parameter");
			None
		}
	}
}

impl QueryMod for LimitOffsetPagination {
	fn apply(&self, request: &RequestContext, spec: &mut QuerySpec) {
		let limit = read_param(request, "limit")
			.or(self.default_limit)
			.map(|limit| self.max_limit.map_or(limit, |max| limit.min(max)));
		let offset = read_param(request, "offset");
		spec.set_limit(limit).set_offset(offset);
		if self.envelope {
			spec.request_total();
		}
	}
}

impl Pagination for LimitOffsetPagination {
	fn format(&self, spec: &QuerySpec, items: Vec<JsonValue>) -> JsonValue {
		if !self.envelope {
			return JsonValue::Array(items);
		}
		let count = spec.total().unwrap_or(items.len() as u64);
		json!({ "count": count, "results": items })
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	fn applied(pagination: &LimitOffsetPagination, query: &str) -> QuerySpec {
		let mut spec = QuerySpec::new();
		pagination.apply(&RequestContext::default().with_query_string(query), &mut spec);
		spec
	}

	#[rstest]
	#[case("limit=10&offset=5", Some(10), Some(5))]
	#[case("limit=ten&offset=5", None, Some(5))]
	#[case("limit=-1", None, None)]
	#[case("offset=1.5", None, None)]
	#[case("", None, None)]
	fn test_reads_limit_and_offset(
		#[case] query: &str,
		#[case] limit: Option<u64>,
		#[case] offset: Option<u64>,
	) {
		let spec = applied(&LimitOffsetPagination::new(), query);
		assert_eq!(spec.limit(), limit);
		assert_eq!(spec.offset(), offset);
		assert!(!spec.wants_total());
	}

	#[rstest]
	#[case("", Some(20))]
	#[case("limit=5", Some(5))]
	#[case("limit=1000", Some(100))]
	fn test_default_and_max_limit(#[case] query: &str, #[case] limit: Option<u64>) {
		let pagination = LimitOffsetPagination::new()
			.with_default_limit(20)
			.with_max_limit(100);
		assert_eq!(applied(&pagination, query).limit(), limit);
	}

	#[rstest]
	fn test_from_settings() {
		let settings = PaginationSettings {
			default_limit: Some(25),
			max_limit: None,
			envelope: true,
		};
		let pagination = LimitOffsetPagination::from_settings(&settings);
		let spec = applied(&pagination, "");
		assert_eq!(spec.limit(), Some(25));
		assert!(spec.wants_total());
	}

	#[rstest]
	fn test_plain_format_is_an_array() {
		let items = vec![json!({"id": 1}), json!({"id": 2})];
		assert_eq!(
			LimitOffsetPagination::new().format(&QuerySpec::new(), items.clone()),
			JsonValue::Array(items.clone())
		);
		assert_eq!(NoPagination.format(&QuerySpec::new(), items.clone()), JsonValue::Array(items));
	}
}
