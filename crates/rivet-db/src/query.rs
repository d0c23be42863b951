//! The per-request query specification.
//!
//! Query modifiers ([`crate::mods`], [`crate::pagination`]) record conditions,
//! ordering and a page window in a [`QuerySpec`]; backends translate the
//! specification when they execute `list` and `retrieve`.

use std::cmp::Ordering;

use rivet_core::types::parse_date_time;
use rivet_core::{InternalValue, Value};

/// Comparison applied by a [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
	Exact,
	Gt,
	Gte,
	Lt,
	Lte,
}

impl Lookup {
	/// Parses the lookup suffix of a `field__gte` style parameter.
	pub fn from_suffix(suffix: &str) -> Option<Self> {
		match suffix {
			"exact" => Some(Lookup::Exact),
			"gt" => Some(Lookup::Gt),
			"gte" => Some(Lookup::Gte),
			"lt" => Some(Lookup::Lt),
			"lte" => Some(Lookup::Lte),
			_ => None,
		}
	}

	pub fn sql_operator(&self) -> &'static str {
		match self {
			Lookup::Exact => "=",
			Lookup::Gt => ">",
			Lookup::Gte => ">=",
			Lookup::Lt => "<",
			Lookup::Lte => "<=",
		}
	}

	fn accepts(&self, ordering: Ordering) -> bool {
		match self {
			Lookup::Exact => ordering == Ordering::Equal,
			Lookup::Gt => ordering == Ordering::Greater,
			Lookup::Gte => ordering != Ordering::Less,
			Lookup::Lt => ordering == Ordering::Less,
			Lookup::Lte => ordering != Ordering::Greater,
		}
	}
}

/// One condition over a stored field.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
	pub field: String,
	pub lookup: Lookup,
	pub value: Value,
}

impl Condition {
	pub fn new(field: impl Into<String>, lookup: Lookup, value: impl Into<Value>) -> Self {
		Self {
			field: field.into(),
			lookup,
			value: value.into(),
		}
	}

	pub fn exact(field: impl Into<String>, value: impl Into<Value>) -> Self {
		Self::new(field, Lookup::Exact, value)
	}

	/// Evaluates the condition against a record held in memory.
	///
	/// Query parameters arrive as strings, so a string operand is parsed into
	/// the kind of the stored value before comparing.
	///
	/// # Examples
	///
	/// ```
	/// use rivet_core::{InternalValue, Value};
	/// use rivet_db::{Condition, Lookup};
	///
	/// let mut record = InternalValue::new();
	/// record.insert("pages".into(), Value::Int(320));
	///
	/// assert!(Condition::exact("pages", "320").matches(&record));
	/// assert!(Condition::new("pages", Lookup::Gt, "100").matches(&record));
	/// assert!(!Condition::new("pages", Lookup::Lt, Value::Int(300)).matches(&record));
	/// ```
	pub fn matches(&self, record: &InternalValue) -> bool {
		let stored = record.get(&self.field).unwrap_or(&Value::Null);
		if self.lookup == Lookup::Exact && stored.loose_eq(&self.value) {
			return true;
		}
		compare_loose(stored, &self.value).is_some_and(|ordering| self.lookup.accepts(ordering))
	}
}

fn compare_loose(stored: &Value, wanted: &Value) -> Option<Ordering> {
	stored.compare(wanted).or_else(|| match wanted {
		Value::String(text) => {
			parse_like(stored, text).and_then(|parsed| stored.compare(&parsed))
		}
		_ => None,
	})
}

fn parse_like(stored: &Value, text: &str) -> Option<Value> {
	match stored {
		Value::Int(_) | Value::UInt(_) => text
			.parse::<i64>()
			.map(Value::Int)
			.ok()
			.or_else(|| text.parse::<f64>().ok().map(Value::Float)),
		Value::Float(_) => text.parse::<f64>().ok().map(Value::Float),
		Value::Bool(_) => text.parse::<bool>().ok().map(Value::Bool),
		Value::DateTime(_) => parse_date_time(text).ok().map(Value::DateTime),
		Value::Nullable(inner) => parse_like(&inner.clone().into_value(), text),
		_ => None,
	}
}

/// One ordering term; `-field` sorts descending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTerm {
	pub field: String,
	pub descending: bool,
}

impl OrderTerm {
	pub fn asc(field: impl Into<String>) -> Self {
		Self {
			field: field.into(),
			descending: false,
		}
	}

	pub fn desc(field: impl Into<String>) -> Self {
		Self {
			field: field.into(),
			descending: true,
		}
	}

	/// Parses `name` or `-name`.
	pub fn parse(term: &str) -> Self {
		match term.strip_prefix('-') {
			Some(field) => Self::desc(field),
			None => Self::asc(term),
		}
	}

	/// Orders two records by this term. Incomparable values tie.
	pub fn compare(&self, left: &InternalValue, right: &InternalValue) -> Ordering {
		let left = left.get(&self.field).unwrap_or(&Value::Null);
		let right = right.get(&self.field).unwrap_or(&Value::Null);
		let ordering = left.compare(right).unwrap_or(Ordering::Equal);
		if self.descending { ordering.reverse() } else { ordering }
	}
}

/// Conditions, ordering and page window of one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpec {
	conditions: Vec<Condition>,
	ordering: Vec<OrderTerm>,
	limit: Option<u64>,
	offset: Option<u64>,
	count_total: bool,
	total: Option<u64>,
}

impl QuerySpec {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn filter(&mut self, condition: Condition) -> &mut Self {
		self.conditions.push(condition);
		self
	}

	pub fn conditions(&self) -> &[Condition] {
		&self.conditions
	}

	pub fn order_by(&mut self, term: OrderTerm) -> &mut Self {
		self.ordering.push(term);
		self
	}

	pub fn clear_ordering(&mut self) -> &mut Self {
		self.ordering.clear();
		self
	}

	pub fn ordering(&self) -> &[OrderTerm] {
		&self.ordering
	}

	pub fn set_limit(&mut self, limit: Option<u64>) -> &mut Self {
		self.limit = limit;
		self
	}

	pub fn limit(&self) -> Option<u64> {
		self.limit
	}

	pub fn set_offset(&mut self, offset: Option<u64>) -> &mut Self {
		self.offset = offset;
		self
	}

	pub fn offset(&self) -> Option<u64> {
		self.offset
	}

	/// Asks the backend to report the number of records matching the
	/// conditions, before the page window is applied.
	pub fn request_total(&mut self) -> &mut Self {
		self.count_total = true;
		self
	}

	pub fn wants_total(&self) -> bool {
		self.count_total
	}

	pub fn set_total(&mut self, total: u64) {
		self.total = Some(total);
	}

	pub fn total(&self) -> Option<u64> {
		self.total
	}

	pub fn matches(&self, record: &InternalValue) -> bool {
		self.conditions.iter().all(|condition| condition.matches(record))
	}

	/// Compares two records by every ordering term in turn.
	pub fn compare(&self, left: &InternalValue, right: &InternalValue) -> Ordering {
		self.ordering
			.iter()
			.map(|term| term.compare(left, right))
			.find(|ordering| *ordering != Ordering::Equal)
			.unwrap_or(Ordering::Equal)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rivet_core::NullValue;
	use rstest::rstest;

	fn record(pages: i64, title: &str) -> InternalValue {
		let mut value = InternalValue::new();
		value.insert("pages".into(), Value::Int(pages));
		value.insert("title".into(), Value::from(title));
		value
	}

	#[rstest]
	#[case(Condition::exact("title", "Dune"), true)]
	#[case(Condition::exact("title", "dune"), false)]
	#[case(Condition::exact("pages", Value::Int(412)), true)]
	#[case(Condition::new("pages", Lookup::Gte, "412"), true)]
	#[case(Condition::new("pages", Lookup::Gt, "412"), false)]
	#[case(Condition::new("pages", Lookup::Lte, "412.5"), true)]
	#[case(Condition::new("pages", Lookup::Lt, "many"), false)]
	#[case(Condition::exact("missing", Value::Null), true)]
	fn test_condition_matches(#[case] condition: Condition, #[case] expected: bool) {
		assert_eq!(condition.matches(&record(412, "Dune")), expected);
	}

	#[rstest]
	fn test_condition_unwraps_nullable() {
		let mut value = InternalValue::new();
		value.insert("rating".into(), Value::Nullable(NullValue::Int32(Some(4))));
		assert!(Condition::exact("rating", "4").matches(&value));
		assert!(Condition::new("rating", Lookup::Gt, "3").matches(&value));
	}

	#[rstest]
	#[case("-created_at", OrderTerm::desc("created_at"))]
	#[case("title", OrderTerm::asc("title"))]
	fn test_order_term_parse(#[case] raw: &str, #[case] expected: OrderTerm) {
		assert_eq!(OrderTerm::parse(raw), expected);
	}

	#[rstest]
	fn test_spec_compares_by_terms_in_order() {
		let mut spec = QuerySpec::new();
		spec.order_by(OrderTerm::desc("pages"))
			.order_by(OrderTerm::asc("title"));
		let mut rows = vec![record(100, "b"), record(300, "c"), record(100, "a")];
		rows.sort_by(|left, right| spec.compare(left, right));
		let titles: Vec<_> = rows
			.iter()
			.map(|row| row["title"].as_str().unwrap().to_string())
			.collect();
		assert_eq!(titles, ["c", "a", "b"]);
	}
}
