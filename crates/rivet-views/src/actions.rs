//! Viewset actions.

use std::fmt;

use http::Method;

/// The standard actions of a model viewset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
	List,
	Retrieve,
	Create,
	Update,
	PartialUpdate,
	Destroy,
}

impl Action {
	pub const ALL: [Action; 6] = [
		Action::List,
		Action::Retrieve,
		Action::Create,
		Action::Update,
		Action::PartialUpdate,
		Action::Destroy,
	];

	/// Maps a method on the collection (`detail == false`) or on one record
	/// to its action.
	///
	/// # Examples
	///
	/// ```
	/// use http::Method;
	/// use rivet_views::Action;
	///
	/// assert_eq!(Action::from_method(&Method::GET, false), Some(Action::List));
	/// assert_eq!(Action::from_method(&Method::PATCH, true), Some(Action::PartialUpdate));
	/// assert_eq!(Action::from_method(&Method::DELETE, false), None);
	/// ```
	pub fn from_method(method: &Method, detail: bool) -> Option<Self> {
		match (method.as_str(), detail) {
			("GET", false) => Some(Action::List),
			("POST", false) => Some(Action::Create),
			("GET", true) => Some(Action::Retrieve),
			("PUT", true) => Some(Action::Update),
			("PATCH", true) => Some(Action::PartialUpdate),
			("DELETE", true) => Some(Action::Destroy),
			_ => None,
		}
	}

	/// Create from a standard action name.
	pub fn from_name(name: &str) -> Option<Self> {
		Self::ALL.into_iter().find(|action| action.name() == name)
	}

	pub fn name(&self) -> &'static str {
		match self {
			Action::List => "list",
			Action::Retrieve => "retrieve",
			Action::Create => "create",
			Action::Update => "update",
			Action::PartialUpdate => "partial_update",
			Action::Destroy => "destroy",
		}
	}

	/// Whether the action addresses one record.
	pub fn is_detail(&self) -> bool {
		!matches!(self, Action::List | Action::Create)
	}
}

impl fmt::Display for Action {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	#[case(Method::GET, false, Some(Action::List))]
	#[case(Method::POST, false, Some(Action::Create))]
	#[case(Method::GET, true, Some(Action::Retrieve))]
	#[case(Method::PUT, true, Some(Action::Update))]
	#[case(Method::DELETE, true, Some(Action::Destroy))]
	#[case(Method::POST, true, None)]
	#[case(Method::PUT, false, None)]
	fn test_from_method(#[case] method: Method, #[case] detail: bool, #[case] expected: Option<Action>) {
		assert_eq!(Action::from_method(&method, detail), expected);
	}

	#[rstest]
	fn test_names_round_trip() {
		for action in Action::ALL {
			assert_eq!(Action::from_name(action.name()), Some(action));
		}
		assert!(Action::Destroy.is_detail());
		assert!(!Action::Create.is_detail());
		assert_eq!(Action::from_name("publish"), None);
	}
}
