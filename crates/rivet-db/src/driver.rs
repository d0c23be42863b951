//! Query drivers.
//!
//! A [`QueryDriver`] is everything a view needs to reach storage for one
//! model: the CRUD operations, the filter, order and pagination modifiers,
//! and a middleware step that opens the per-request [`QueryContext`].

use std::sync::Arc;

use rivet_core::RequestContext;

use crate::context::QueryContext;
use crate::crud::Crud;
use crate::mods::{NoopQueryMod, QueryMod};
use crate::pagination::{NoPagination, Pagination};
use crate::transaction::{CreateTx, DestroyTx, Session, UpdateTx};

/// Storage access for one model.
pub trait QueryDriver: Send + Sync {
	type Session: Session;

	fn crud(&self) -> &Crud<Self::Session>;

	fn filter(&self) -> &dyn QueryMod;

	fn order(&self) -> &dyn QueryMod;

	fn pagination(&self) -> &dyn Pagination;

	/// Opens the context of one request on the driver's session.
	fn middleware(&self, request: RequestContext) -> QueryContext<Self::Session>;
}

/// A [`QueryDriver`] assembled from parts.
///
/// Filtering and ordering default to no-ops and pagination to a plain array.
///
/// # Examples
///
/// ```
/// use rivet_core::RequestContext;
/// use rivet_db::{
///     CreateTx, LimitOffsetPagination, MemoryDatabase, OrderBy, QueryDriver, QueryParamFilter,
///     TableSchema, memory_crud,
/// };
///
/// let db = MemoryDatabase::new();
/// let driver = rivet_db::Driver::new(db.session(), memory_crud(TableSchema::new("posts")))
///     .with_filter(QueryParamFilter::new(["author"]))
///     .with_order(OrderBy::new(["-id"]))
///     .with_pagination(LimitOffsetPagination::new().with_max_limit(50))
///     .on_create(CreateTx::new().before(|_ctx, post| async move { Ok(post) }));
///
/// let request = RequestContext::default().with_query_string("author=ana&limit=80");
/// let ctx = driver.middleware(request.clone());
/// ctx.apply(driver.filter());
/// ctx.apply(driver.pagination());
/// assert_eq!(ctx.spec().conditions().len(), 1);
/// assert_eq!(ctx.spec().limit(), Some(50));
/// ```
pub struct Driver<S> {
	crud: Crud<S>,
	filter: Arc<dyn QueryMod>,
	order: Arc<dyn QueryMod>,
	pagination: Arc<dyn Pagination>,
	session: S,
}

impl<S: Clone> Clone for Driver<S> {
	fn clone(&self) -> Self {
		Self {
			crud: self.crud.clone(),
			filter: Arc::clone(&self.filter),
			order: Arc::clone(&self.order),
			pagination: Arc::clone(&self.pagination),
			session: self.session.clone(),
		}
	}
}

impl<S: Session> Driver<S> {
	pub fn new(session: S, crud: Crud<S>) -> Self {
		Self {
			crud,
			filter: Arc::new(NoopQueryMod),
			order: Arc::new(NoopQueryMod),
			pagination: Arc::new(NoPagination),
			session,
		}
	}

	pub fn with_filter(mut self, filter: impl QueryMod + 'static) -> Self {
		self.filter = Arc::new(filter);
		self
	}

	pub fn with_order(mut self, order: impl QueryMod + 'static) -> Self {
		self.order = Arc::new(order);
		self
	}

	pub fn with_pagination(mut self, pagination: impl Pagination + 'static) -> Self {
		self.pagination = Arc::new(pagination);
		self
	}

	/// Transforms the CRUD operations, e.g. to replace one of them.
	pub fn map_crud(mut self, map: impl FnOnce(Crud<S>) -> Crud<S>) -> Self {
		self.crud = map(self.crud);
		self
	}

	/// Runs `create` inside the given transaction pipeline.
	pub fn on_create(self, tx: CreateTx<S>) -> Self {
		self.map_crud(|crud| crud.wrap_create(|create| tx.wrap(create)))
	}

	pub fn on_update(self, tx: UpdateTx<S>) -> Self {
		self.map_crud(|crud| crud.wrap_update(|update| tx.wrap(update)))
	}

	pub fn on_destroy(self, tx: DestroyTx<S>) -> Self {
		self.map_crud(|crud| crud.wrap_destroy(|destroy| tx.wrap(destroy)))
	}

	pub fn session(&self) -> &S {
		&self.session
	}
}

impl<S: Session> QueryDriver for Driver<S> {
	type Session = S;

	fn crud(&self) -> &Crud<S> {
		&self.crud
	}

	fn filter(&self) -> &dyn QueryMod {
		self.filter.as_ref()
	}

	fn order(&self) -> &dyn QueryMod {
		self.order.as_ref()
	}

	fn pagination(&self) -> &dyn Pagination {
		self.pagination.as_ref()
	}

	fn middleware(&self, request: RequestContext) -> QueryContext<S> {
		QueryContext::new(request, self.session.clone())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::backends::memory::{self, MemoryDatabase, MemorySession};
	use crate::mods::OrderBy;
	use crate::schema::TableSchema;
	use rivet_core::{InternalValue, Value};
	use rstest::rstest;

	#[rstest]
	#[tokio::test]
	async fn test_on_create_runs_hooks_in_transaction() {
		let db = MemoryDatabase::new();
		let driver = Driver::new(db.session(), memory::crud(TableSchema::new("posts"))).on_create(
			CreateTx::new().after(|ctx: QueryContext<MemorySession>, created: InternalValue| async move {
				assert!(ctx.session().in_transaction());
				Ok(created)
			}),
		);
		let ctx = driver.middleware(RequestContext::default());
		assert!(!ctx.session().in_transaction());

		let mut post = InternalValue::new();
		post.insert("title".into(), Value::from("hello"));
		driver.crud().create(&ctx, post).await.unwrap();
		assert_eq!(db.len("posts"), 1);
	}

	#[rstest]
	fn test_defaults_leave_spec_untouched() {
		let db = MemoryDatabase::new();
		let driver = Driver::new(db.session(), memory::crud(TableSchema::new("posts")));
		let ctx = driver.middleware(RequestContext::default().with_query_string("limit=1"));
		ctx.apply(driver.filter());
		ctx.apply(driver.order());
		ctx.apply(driver.pagination());
		let spec = ctx.spec();
		assert!(spec.conditions().is_empty());
		assert!(spec.ordering().is_empty());
		assert_eq!(spec.limit(), None);
	}

	#[rstest]
	fn test_with_order() {
		let db = MemoryDatabase::new();
		let driver = Driver::new(db.session(), memory::crud(TableSchema::new("posts")))
			.with_order(OrderBy::new(["-id"]));
		let ctx = driver.middleware(RequestContext::default());
		ctx.apply(driver.order());
		assert!(ctx.spec().ordering()[0].descending);
	}
}
