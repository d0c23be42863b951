//! The CRUD contract.
//!
//! A [`Crud`] bundles the five operations a driver offers for one model. Each
//! operation is a replaceable async function over the request's
//! [`QueryContext`]; `wrap_*` builders decorate an operation, which is how the
//! transaction pipelines in [`crate::transaction`] attach.

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use rivet_core::{InternalValue, Value};
use tracing::trace;

use crate::context::QueryContext;
use crate::error::{QueryError, QueryResult};

pub type ListFn<S> =
	Arc<dyn Fn(QueryContext<S>) -> BoxFuture<'static, QueryResult<Vec<InternalValue>>> + Send + Sync>;

pub type RetrieveFn<S> =
	Arc<dyn Fn(QueryContext<S>, Value) -> BoxFuture<'static, QueryResult<InternalValue>> + Send + Sync>;

pub type CreateFn<S> = Arc<
	dyn Fn(QueryContext<S>, InternalValue) -> BoxFuture<'static, QueryResult<InternalValue>>
		+ Send
		+ Sync,
>;

/// Receives the stored record, the new record and the id.
pub type UpdateFn<S> = Arc<
	dyn Fn(
			QueryContext<S>,
			InternalValue,
			InternalValue,
			Value,
		) -> BoxFuture<'static, QueryResult<InternalValue>>
		+ Send
		+ Sync,
>;

pub type DestroyFn<S> =
	Arc<dyn Fn(QueryContext<S>, Value) -> BoxFuture<'static, QueryResult<()>> + Send + Sync>;

/// List, retrieve, create, update and destroy for one model.
///
/// # Examples
///
/// ```
/// use rivet_core::{InternalValue, RequestContext, Value};
/// use rivet_db::{Crud, QueryContext};
///
/// # tokio_test::block_on(async {
/// let crud: Crud<()> = Crud::new().with_retrieve(|_ctx, id| async move {
///     let mut record = InternalValue::new();
///     record.insert("id".into(), id);
///     Ok(record)
/// });
///
/// let ctx = QueryContext::new(RequestContext::default(), ());
/// let record = crud.retrieve(&ctx, Value::Int(7)).await.unwrap();
/// assert_eq!(record["id"], Value::Int(7));
/// assert!(crud.list(&ctx).await.is_err());
/// # });
/// ```
pub struct Crud<S> {
	list: ListFn<S>,
	retrieve: RetrieveFn<S>,
	create: CreateFn<S>,
	update: UpdateFn<S>,
	destroy: DestroyFn<S>,
}

impl<S> Clone for Crud<S> {
	fn clone(&self) -> Self {
		Self {
			list: Arc::clone(&self.list),
			retrieve: Arc::clone(&self.retrieve),
			create: Arc::clone(&self.create),
			update: Arc::clone(&self.update),
			destroy: Arc::clone(&self.destroy),
		}
	}
}

fn unsupported<T: Send + 'static>(operation: &'static str) -> BoxFuture<'static, QueryResult<T>> {
	async move { Err(QueryError::Unsupported(operation)) }.boxed()
}

impl<S: Clone + Send + 'static> Default for Crud<S> {
	fn default() -> Self {
		Self::new()
	}
}

impl<S: Clone + Send + 'static> Crud<S> {
	/// A CRUD whose every operation fails with [`QueryError::Unsupported`].
	pub fn new() -> Self {
		Self {
			list: Arc::new(|_ctx: QueryContext<S>| unsupported::<Vec<InternalValue>>("list")),
			retrieve: Arc::new(|_ctx: QueryContext<S>, _id: Value| {
				unsupported::<InternalValue>("retrieve")
			}),
			create: Arc::new(|_ctx: QueryContext<S>, _value: InternalValue| {
				unsupported::<InternalValue>("create")
			}),
			update: Arc::new(
				|_ctx: QueryContext<S>, _old: InternalValue, _new: InternalValue, _id: Value| {
					unsupported::<InternalValue>("update")
				},
			),
			destroy: Arc::new(|_ctx: QueryContext<S>, _id: Value| unsupported::<()>("destroy")),
		}
	}

	pub fn with_list<F, Fut>(mut self, list: F) -> Self
	where
		F: Fn(QueryContext<S>) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = QueryResult<Vec<InternalValue>>> + Send + 'static,
	{
		self.list = Arc::new(move |ctx| list(ctx).boxed());
		self
	}

	pub fn with_retrieve<F, Fut>(mut self, retrieve: F) -> Self
	where
		F: Fn(QueryContext<S>, Value) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = QueryResult<InternalValue>> + Send + 'static,
	{
		self.retrieve = Arc::new(move |ctx, id| retrieve(ctx, id).boxed());
		self
	}

	pub fn with_create<F, Fut>(mut self, create: F) -> Self
	where
		F: Fn(QueryContext<S>, InternalValue) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = QueryResult<InternalValue>> + Send + 'static,
	{
		self.create = Arc::new(move |ctx, value| create(ctx, value).boxed());
		self
	}

	pub fn with_update<F, Fut>(mut self, update: F) -> Self
	where
		F: Fn(QueryContext<S>, InternalValue, InternalValue, Value) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = QueryResult<InternalValue>> + Send + 'static,
	{
		self.update = Arc::new(move |ctx, old, new, id| update(ctx, old, new, id).boxed());
		self
	}

	pub fn with_destroy<F, Fut>(mut self, destroy: F) -> Self
	where
		F: Fn(QueryContext<S>, Value) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = QueryResult<()>> + Send + 'static,
	{
		self.destroy = Arc::new(move |ctx, id| destroy(ctx, id).boxed());
		self
	}

	/// Replaces `create` with a decorated version of itself.
	///
	/// ```
	/// use rivet_db::{CreateTx, Crud, MemorySession};
	///
	/// let crud: Crud<MemorySession> = Crud::new().wrap_create(|create| {
	///     CreateTx::new()
	///         .before(|_ctx, value| async move { Ok(value) })
	///         .wrap(create)
	/// });
	/// # drop(crud);
	/// ```
	pub fn wrap_create(mut self, wrap: impl FnOnce(CreateFn<S>) -> CreateFn<S>) -> Self {
		self.create = wrap(self.create);
		self
	}

	pub fn wrap_update(mut self, wrap: impl FnOnce(UpdateFn<S>) -> UpdateFn<S>) -> Self {
		self.update = wrap(self.update);
		self
	}

	pub fn wrap_destroy(mut self, wrap: impl FnOnce(DestroyFn<S>) -> DestroyFn<S>) -> Self {
		self.destroy = wrap(self.destroy);
		self
	}

	pub async fn list(&self, ctx: &QueryContext<S>) -> QueryResult<Vec<InternalValue>> {
		trace!("crud list");
		(self.list)(ctx.clone()).await
	}

	pub async fn retrieve(&self, ctx: &QueryContext<S>, id: Value) -> QueryResult<InternalValue> {
		trace!(id = ?id, "crud retrieve");
		(self.retrieve)(ctx.clone(), id).await
	}

	pub async fn create(
		&self,
		ctx: &QueryContext<S>,
		value: InternalValue,
	) -> QueryResult<InternalValue> {
		trace!("crud create");
		(self.create)(ctx.clone(), value).await
	}

	pub async fn update(
		&self,
		ctx: &QueryContext<S>,
		old: InternalValue,
		new: InternalValue,
		id: Value,
	) -> QueryResult<InternalValue> {
		trace!(id = ?id, "crud update");
		(self.update)(ctx.clone(), old, new, id).await
	}

	pub async fn destroy(&self, ctx: &QueryContext<S>, id: Value) -> QueryResult<()> {
		trace!(id = ?id, "crud destroy");
		(self.destroy)(ctx.clone(), id).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rivet_core::RequestContext;
	use rstest::rstest;
	use std::sync::atomic::{AtomicUsize, Ordering};

	fn ctx() -> QueryContext<()> {
		QueryContext::new(RequestContext::default(), ())
	}

	#[rstest]
	#[tokio::test]
	async fn test_unset_operations_are_unsupported() {
		let crud: Crud<()> = Crud::new();
		let err = crud.destroy(&ctx(), Value::Int(1)).await.unwrap_err();
		assert!(matches!(err, QueryError::Unsupported("destroy")));
	}

	#[rstest]
	#[tokio::test]
	async fn test_wrap_create_decorates_previous_operation() {
		let calls = Arc::new(AtomicUsize::new(0));
		let counter = Arc::clone(&calls);
		let crud: Crud<()> = Crud::new()
			.with_create(move |_ctx, value| {
				counter.fetch_add(1, Ordering::SeqCst);
				async move { Ok(value) }
			})
			.wrap_create(|previous| {
				Arc::new(move |ctx: QueryContext<()>, mut value: InternalValue| {
					value.insert("stamped".into(), Value::Bool(true));
					previous(ctx, value)
				})
			});

		let created = crud.create(&ctx(), InternalValue::new()).await.unwrap();
		assert_eq!(created["stamped"], Value::Bool(true));
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}
}
