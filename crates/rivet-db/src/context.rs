//! Request-scoped query state.

use std::sync::Arc;

use parking_lot::Mutex;
use rivet_core::RequestContext;

use crate::mods::QueryMod;
use crate::query::QuerySpec;

/// State of one request as seen by query modifiers and CRUD operations: the
/// request, the query specification built so far and the active session.
///
/// Created by [`QueryDriver::middleware`](crate::QueryDriver::middleware) once
/// per request. Clones share the same state; contexts are never shared across
/// requests.
///
/// # Examples
///
/// ```
/// use rivet_core::RequestContext;
/// use rivet_db::{Condition, QueryContext};
///
/// let ctx = QueryContext::new(RequestContext::default(), ());
/// ctx.update_spec(|spec| {
///     spec.filter(Condition::exact("status", "open"));
/// });
/// assert_eq!(ctx.spec().conditions().len(), 1);
/// ```
pub struct QueryContext<S> {
	inner: Arc<ContextInner<S>>,
}

struct ContextInner<S> {
	request: RequestContext,
	spec: Mutex<QuerySpec>,
	session: Mutex<S>,
}

impl<S> Clone for QueryContext<S> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<S: Clone> QueryContext<S> {
	pub fn new(request: RequestContext, session: S) -> Self {
		Self {
			inner: Arc::new(ContextInner {
				request,
				spec: Mutex::new(QuerySpec::new()),
				session: Mutex::new(session),
			}),
		}
	}

	pub fn request(&self) -> &RequestContext {
		&self.inner.request
	}

	/// Snapshot of the query specification.
	pub fn spec(&self) -> QuerySpec {
		self.inner.spec.lock().clone()
	}

	pub fn update_spec<R>(&self, update: impl FnOnce(&mut QuerySpec) -> R) -> R {
		update(&mut self.inner.spec.lock())
	}

	/// Runs a query modifier against this request.
	pub fn apply<M: QueryMod + ?Sized>(&self, modifier: &M) {
		let mut spec = self.inner.spec.lock();
		modifier.apply(&self.inner.request, &mut spec);
	}

	/// The session CRUD operations should run on. Inside a transaction this
	/// is the transaction.
	pub fn session(&self) -> S {
		self.inner.session.lock().clone()
	}

	/// Makes `session` current until the returned guard is dropped.
	pub fn swap_session(&self, session: S) -> SessionGuard<S> {
		let previous = std::mem::replace(&mut *self.inner.session.lock(), session);
		SessionGuard {
			ctx: self.clone(),
			previous: Some(previous),
		}
	}
}

/// Restores the previous session of a [`QueryContext`] when dropped.
#[must_use = "the previous session is restored as soon as the guard is dropped"]
pub struct SessionGuard<S> {
	ctx: QueryContext<S>,
	previous: Option<S>,
}

impl<S> Drop for SessionGuard<S> {
	fn drop(&mut self) {
		if let Some(previous) = self.previous.take() {
			*self.ctx.inner.session.lock() = previous;
		}
	}
}
