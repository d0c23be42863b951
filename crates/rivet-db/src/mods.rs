//! Query modifiers.
//!
//! A [`QueryMod`] records filters or ordering in the [`QuerySpec`] of a request
//! before a CRUD operation runs. Modifiers hold no per-request state.

use std::sync::Arc;

use rivet_core::{RequestContext, Value};
use tracing::debug;

use crate::query::{Condition, OrderTerm, QuerySpec};

/// Mutates the query specification of one request.
pub trait QueryMod: Send + Sync {
	fn apply(&self, request: &RequestContext, spec: &mut QuerySpec);
}

/// Leaves the specification untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopQueryMod;

impl QueryMod for NoopQueryMod {
	fn apply(&self, _request: &RequestContext, _spec: &mut QuerySpec) {}
}

/// Adapts a closure into a [`QueryMod`].
///
/// # Examples
///
/// ```
/// use rivet_core::RequestContext;
/// use rivet_db::{Condition, FnQueryMod, QueryMod, QuerySpec};
///
/// let published_only = FnQueryMod::new(|_request: &RequestContext, spec: &mut QuerySpec| {
///     spec.filter(Condition::exact("published", true));
/// });
///
/// let mut spec = QuerySpec::new();
/// published_only.apply(&RequestContext::default(), &mut spec);
/// assert_eq!(spec.conditions().len(), 1);
/// ```
pub struct FnQueryMod<F>(F);

impl<F> FnQueryMod<F>
where
	F: Fn(&RequestContext, &mut QuerySpec) + Send + Sync,
{
	pub fn new(func: F) -> Self {
		Self(func)
	}
}

impl<F> QueryMod for FnQueryMod<F>
where
	F: Fn(&RequestContext, &mut QuerySpec) + Send + Sync,
{
	fn apply(&self, request: &RequestContext, spec: &mut QuerySpec) {
		(self.0)(request, spec)
	}
}

/// Applies its children in registration order.
#[derive(Clone, Default)]
pub struct CompositeQueryMod {
	mods: Vec<Arc<dyn QueryMod>>,
}

impl CompositeQueryMod {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with(mut self, modifier: impl QueryMod + 'static) -> Self {
		self.mods.push(Arc::new(modifier));
		self
	}

	pub fn push(&mut self, modifier: Arc<dyn QueryMod>) {
		self.mods.push(modifier);
	}

	pub fn len(&self) -> usize {
		self.mods.len()
	}

	pub fn is_empty(&self) -> bool {
		self.mods.is_empty()
	}
}

impl QueryMod for CompositeQueryMod {
	fn apply(&self, request: &RequestContext, spec: &mut QuerySpec) {
		for modifier in &self.mods {
			modifier.apply(request, spec);
		}
	}
}

/// Exact-match conditions from query parameters.
///
/// Only the listed fields are considered; other parameters (`limit`,
/// `ordering`, ...) are left to their own modifiers.
///
/// # Examples
///
/// ```
/// use rivet_core::RequestContext;
/// use rivet_db::{QueryMod, QueryParamFilter, QuerySpec};
///
/// let filter = QueryParamFilter::new(["status"]);
/// let request = RequestContext::default()
///     .with_query("status", "open")
///     .with_query("owner", "ann");
///
/// let mut spec = QuerySpec::new();
/// filter.apply(&request, &mut spec);
/// assert_eq!(spec.conditions().len(), 1);
/// assert_eq!(spec.conditions()[0].field, "status");
/// ```
#[derive(Debug, Clone)]
pub struct QueryParamFilter {
	fields: Vec<String>,
}

impl QueryParamFilter {
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

impl QueryMod for QueryParamFilter {
	fn apply(&self, request: &RequestContext, spec: &mut QuerySpec) {
		for field in &self.fields {
			if let Some(raw) = request.query_param(field) {
				spec.filter(Condition::exact(field.as_str(), Value::from(raw)));
			}
		}
	}
}

/// A fixed ordering, e.g. `OrderBy::new(["-created_at", "id"])`.
#[derive(Debug, Clone)]
pub struct OrderBy {
	terms: Vec<OrderTerm>,
}

impl OrderBy {
	pub fn new<I, S>(terms: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		Self {
			terms: terms
				.into_iter()
				.map(|term| OrderTerm::parse(term.as_ref()))
				.collect(),
		}
	}
}

impl QueryMod for OrderBy {
	fn apply(&self, _request: &RequestContext, spec: &mut QuerySpec) {
		for term in &self.terms {
			spec.order_by(term.clone());
		}
	}
}

/// Ordering chosen by the client through a query parameter
/// (`?ordering=-price,name`), restricted to the allowed fields.
///
/// Unknown fields are dropped. When the parameter is absent or yields no
/// usable term, the default ordering applies.
#[derive(Debug, Clone)]
pub struct OrderingFilter {
	param: String,
	allowed: Vec<String>,
	default: Vec<OrderTerm>,
}

impl OrderingFilter {
	pub fn new<I, S>(allowed: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			param: "ordering".to_string(),
			allowed: allowed.into_iter().map(Into::into).collect(),
			default: Vec::new(),
		}
	}

	pub fn with_param(mut self, param: impl Into<String>) -> Self {
		self.param = param.into();
		self
	}

	pub fn with_default<I, S>(mut self, terms: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		self.default = terms
			.into_iter()
			.map(|term| OrderTerm::parse(term.as_ref()))
			.collect();
		self
	}

	fn requested(&self, request: &RequestContext) -> Vec<OrderTerm> {
		let Some(raw) = request.query_param(&self.param) else {
			return Vec::new();
		};
		raw.split(',')
			.map(str::trim)
			.filter(|term| !term.is_empty())
			.map(OrderTerm::parse)
			.filter(|term| {
				let allowed = self.allowed.contains(&term.field);
				if !allowed {
					debug!(field = %term.field, "ignoring ordering on a field that is not allowed");
				}
				allowed
			})
			.collect()
	}
}

impl QueryMod for OrderingFilter {
	fn apply(&self, request: &RequestContext, spec: &mut QuerySpec) {
		let mut terms = self.requested(request);
		if terms.is_empty() {
			terms = self.default.clone();
		}
		for term in terms {
			spec.order_by(term);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	fn request(query: &str) -> RequestContext {
		RequestContext::default().with_query_string(query)
	}

	#[rstest]
	fn test_composite_applies_children_in_order() {
		let composite = CompositeQueryMod::new()
			.with(OrderBy::new(["name"]))
			.with(FnQueryMod::new(|_request: &RequestContext, spec: &mut QuerySpec| {
				spec.order_by(OrderTerm::desc("id"));
			}));
		let mut spec = QuerySpec::new();
		composite.apply(&RequestContext::default(), &mut spec);
		assert_eq!(spec.ordering(), [OrderTerm::asc("name"), OrderTerm::desc("id")]);
	}

	#[rstest]
	fn test_query_param_filter_keeps_raw_strings() {
		let mut spec = QuerySpec::new();
		QueryParamFilter::new(["year", "genre"]).apply(&request("year=1965&limit=2"), &mut spec);
		assert_eq!(spec.conditions(), [Condition::exact("year", "1965")]);
	}

	#[rstest]
	#[case("ordering=-price,name", vec![OrderTerm::desc("price"), OrderTerm::asc("name")])]
	#[case("ordering=secret,price", vec![OrderTerm::asc("price")])]
	#[case("ordering=secret", vec![OrderTerm::asc("id")])]
	#[case("", vec![OrderTerm::asc("id")])]
	fn test_ordering_filter(#[case] query: &str, #[case] expected: Vec<OrderTerm>) {
		let filter = OrderingFilter::new(["price", "name"]).with_default(["id"]);
		let mut spec = QuerySpec::new();
		filter.apply(&request(query), &mut spec);
		assert_eq!(spec.ordering(), expected.as_slice());
	}
}
