//! Transactions and transaction hooks.
//!
//! [`CreateTx`], [`UpdateTx`] and [`DestroyTx`] wrap a CRUD operation in a
//! backend transaction, with ordered hooks running before and after the
//! wrapped operation. All three are evaluated by [`in_transaction`]:
//!
//! 1. begin a transaction on the current session
//! 2. make the transaction the session of the [`QueryContext`]
//! 3. run the before hooks, each receiving the value the previous one returned
//! 4. run the wrapped operation
//! 5. run the after hooks on its result
//! 6. commit
//!
//! The first error rolls everything back and is returned unchanged. The
//! original session is restored on every path, including panics and dropped
//! futures.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use rivet_core::{InternalValue, Value};
use tracing::{trace, warn};

use crate::context::QueryContext;
use crate::crud::{CreateFn, DestroyFn, UpdateFn};
use crate::error::QueryResult;

/// A handle CRUD operations run on: a connection pool, or an open transaction.
#[async_trait]
pub trait Session: Clone + Send + Sync + 'static {
	/// Opens a transaction. Beginning on a transaction nests.
	async fn begin(&self) -> QueryResult<Self>;

	async fn commit(self) -> QueryResult<()>;

	async fn rollback(self) -> QueryResult<()>;
}

/// Runs `body` inside a transaction opened on the context's session.
///
/// # Examples
///
/// ```
/// use rivet_core::{InternalValue, RequestContext, Value};
/// use rivet_db::{MemoryDatabase, QueryContext, QueryError, TableSchema, in_transaction};
///
/// # tokio_test::block_on(async {
/// let db = MemoryDatabase::new();
/// let schema = TableSchema::new("notes");
/// let ctx = QueryContext::new(RequestContext::default(), db.session());
///
/// let result: Result<(), QueryError> = in_transaction(&ctx, |tx| {
///     let schema = schema.clone();
///     async move {
///         tx.session().insert(&schema, InternalValue::new()).await?;
///         Err(QueryError::NotFound)
///     }
/// })
/// .await;
///
/// assert!(result.is_err());
/// assert!(db.session().select(&schema, &Default::default()).unwrap().0.is_empty());
/// # });
/// ```
pub async fn in_transaction<S, T, F, Fut>(ctx: &QueryContext<S>, body: F) -> QueryResult<T>
where
	S: Session,
	F: FnOnce(QueryContext<S>) -> Fut,
	Fut: Future<Output = QueryResult<T>>,
{
	let tx = ctx.session().begin().await?;
	let outcome = {
		let _guard = ctx.swap_session(tx.clone());
		body(ctx.clone()).await
	};
	match outcome {
		Ok(value) => {
			tx.commit().await?;
			trace!("transaction committed");
			Ok(value)
		}
		Err(err) => {
			if let Err(rollback_err) = tx.rollback().await {
				warn!(error = %rollback_err, cause = %err, "transaction rollback failed");
			}
			Err(err)
		}
	}
}

pub type CreateHook<S> = Arc<
	dyn Fn(QueryContext<S>, InternalValue) -> BoxFuture<'static, QueryResult<InternalValue>>
		+ Send
		+ Sync,
>;

/// Receives the stored record, the new record and the id.
pub type UpdateHook<S> = Arc<
	dyn Fn(
			QueryContext<S>,
			InternalValue,
			InternalValue,
			Value,
		) -> BoxFuture<'static, QueryResult<InternalValue>>
		+ Send
		+ Sync,
>;

pub type DestroyHook<S> =
	Arc<dyn Fn(QueryContext<S>, Value) -> BoxFuture<'static, QueryResult<()>> + Send + Sync>;

/// Transaction pipeline around `create`.
///
/// Before hooks thread the value to create; after hooks thread the created
/// record.
///
/// # Examples
///
/// ```
/// use rivet_core::{InternalValue, RequestContext, Value};
/// use rivet_db::{CreateTx, Crud, MemorySession, QueryContext, QueryError};
///
/// let crud: Crud<MemorySession> = Crud::new()
///     .with_create(|_ctx, value| async move { Ok(value) })
///     .wrap_create(|create| {
///         CreateTx::new()
///             .before(|_ctx, mut value| async move {
///                 value.insert("slug".into(), Value::from("draft"));
///                 Ok(value)
///             })
///             .after(|_ctx, created| async move {
///                 if created.contains_key("slug") {
///                     Ok(created)
///                 } else {
///                     Err(QueryError::NotFound)
///                 }
///             })
///             .wrap(create)
///     });
/// # drop(crud);
/// ```
pub struct CreateTx<S> {
	before: Vec<CreateHook<S>>,
	after: Vec<CreateHook<S>>,
}

impl<S: Session> Default for CreateTx<S> {
	fn default() -> Self {
		Self::new()
	}
}

impl<S: Session> CreateTx<S> {
	pub fn new() -> Self {
		Self {
			before: Vec::new(),
			after: Vec::new(),
		}
	}

	pub fn before<F, Fut>(mut self, hook: F) -> Self
	where
		F: Fn(QueryContext<S>, InternalValue) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = QueryResult<InternalValue>> + Send + 'static,
	{
		self.before.push(Arc::new(move |ctx, value| hook(ctx, value).boxed()));
		self
	}

	pub fn after<F, Fut>(mut self, hook: F) -> Self
	where
		F: Fn(QueryContext<S>, InternalValue) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = QueryResult<InternalValue>> + Send + 'static,
	{
		self.after.push(Arc::new(move |ctx, value| hook(ctx, value).boxed()));
		self
	}

	/// Wraps `create` in the pipeline.
	pub fn wrap(self, create: CreateFn<S>) -> CreateFn<S> {
		let hooks = Arc::new(self);
		Arc::new(move |ctx: QueryContext<S>, value: InternalValue| {
			let hooks = Arc::clone(&hooks);
			let create = Arc::clone(&create);
			async move {
				in_transaction(&ctx, move |tx| async move {
					let mut value = value;
					for hook in &hooks.before {
						value = hook(tx.clone(), value).await?;
					}
					let mut created = create(tx.clone(), value).await?;
					for hook in &hooks.after {
						created = hook(tx.clone(), created).await?;
					}
					Ok(created)
				})
				.await
			}
			.boxed()
		})
	}
}

/// Transaction pipeline around `update`.
///
/// Hooks receive the stored record, the new record and the id; before hooks
/// thread the new record, after hooks thread the updated one.
pub struct UpdateTx<S> {
	before: Vec<UpdateHook<S>>,
	after: Vec<UpdateHook<S>>,
}

impl<S: Session> Default for UpdateTx<S> {
	fn default() -> Self {
		Self::new()
	}
}

impl<S: Session> UpdateTx<S> {
	pub fn new() -> Self {
		Self {
			before: Vec::new(),
			after: Vec::new(),
		}
	}

	pub fn before<F, Fut>(mut self, hook: F) -> Self
	where
		F: Fn(QueryContext<S>, InternalValue, InternalValue, Value) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = QueryResult<InternalValue>> + Send + 'static,
	{
		self.before
			.push(Arc::new(move |ctx, old, new, id| hook(ctx, old, new, id).boxed()));
		self
	}

	pub fn after<F, Fut>(mut self, hook: F) -> Self
	where
		F: Fn(QueryContext<S>, InternalValue, InternalValue, Value) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = QueryResult<InternalValue>> + Send + 'static,
	{
		self.after
			.push(Arc::new(move |ctx, old, new, id| hook(ctx, old, new, id).boxed()));
		self
	}

	pub fn wrap(self, update: UpdateFn<S>) -> UpdateFn<S> {
		let hooks = Arc::new(self);
		Arc::new(
			move |ctx: QueryContext<S>, old: InternalValue, new: InternalValue, id: Value| {
				let hooks = Arc::clone(&hooks);
				let update = Arc::clone(&update);
				async move {
					in_transaction(&ctx, move |tx| async move {
						let mut new = new;
						for hook in &hooks.before {
							new = hook(tx.clone(), old.clone(), new, id.clone()).await?;
						}
						let mut updated = update(tx.clone(), old.clone(), new, id.clone()).await?;
						for hook in &hooks.after {
							updated = hook(tx.clone(), old.clone(), updated, id.clone()).await?;
						}
						Ok(updated)
					})
					.await
				}
				.boxed()
			},
		)
	}
}

/// Transaction pipeline around `destroy`.
pub struct DestroyTx<S> {
	before: Vec<DestroyHook<S>>,
	after: Vec<DestroyHook<S>>,
}

impl<S: Session> Default for DestroyTx<S> {
	fn default() -> Self {
		Self::new()
	}
}

impl<S: Session> DestroyTx<S> {
	pub fn new() -> Self {
		Self {
			before: Vec::new(),
			after: Vec::new(),
		}
	}

	pub fn before<F, Fut>(mut self, hook: F) -> Self
	where
		F: Fn(QueryContext<S>, Value) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = QueryResult<()>> + Send + 'static,
	{
		self.before.push(Arc::new(move |ctx, id| hook(ctx, id).boxed()));
		self
	}

	pub fn after<F, Fut>(mut self, hook: F) -> Self
	where
		F: Fn(QueryContext<S>, Value) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = QueryResult<()>> + Send + 'static,
	{
		self.after.push(Arc::new(move |ctx, id| hook(ctx, id).boxed()));
		self
	}

	pub fn wrap(self, destroy: DestroyFn<S>) -> DestroyFn<S> {
		let hooks = Arc::new(self);
		Arc::new(move |ctx: QueryContext<S>, id: Value| {
			let hooks = Arc::clone(&hooks);
			let destroy = Arc::clone(&destroy);
			async move {
				in_transaction(&ctx, move |tx| async move {
					for hook in &hooks.before {
						hook(tx.clone(), id.clone()).await?;
					}
					destroy(tx.clone(), id.clone()).await?;
					for hook in &hooks.after {
						hook(tx.clone(), id.clone()).await?;
					}
					Ok(())
				})
				.await
			}
			.boxed()
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::backends::memory::{MemoryDatabase, MemorySession};
	use crate::crud::Crud;
	use crate::error::QueryError;
	use crate::query::QuerySpec;
	use crate::schema::TableSchema;
	use parking_lot::Mutex;
	use rivet_core::RequestContext;
	use rstest::{fixture, rstest};

	type Log = Arc<Mutex<Vec<&'static str>>>;

	struct Fixture {
		db: MemoryDatabase,
		schema: TableSchema,
		log: Log,
	}

	#[fixture]
	fn setup() -> Fixture {
		Fixture {
			db: MemoryDatabase::new(),
			schema: TableSchema::new("events"),
			log: Arc::new(Mutex::new(Vec::new())),
		}
	}

	fn base_create(schema: &TableSchema, log: &Log) -> Crud<MemorySession> {
		let schema = schema.clone();
		let log = Arc::clone(log);
		Crud::new().with_create(move |ctx: QueryContext<MemorySession>, value| {
			let schema = schema.clone();
			let log = Arc::clone(&log);
			async move {
				log.lock().push("base");
				ctx.session().insert(&schema, value).await
			}
		})
	}

	fn audit_hook(
		name: &'static str,
		schema: &TableSchema,
		log: &Log,
		fail: bool,
	) -> impl Fn(QueryContext<MemorySession>, InternalValue) -> BoxFuture<'static, QueryResult<InternalValue>>
	+ Send
	+ Sync
	+ 'static {
		let schema = schema.clone();
		let log = Arc::clone(log);
		move |ctx, value| {
			let schema = schema.clone();
			let log = Arc::clone(&log);
			async move {
				log.lock().push(name);
				let mut row = InternalValue::new();
				row.insert("hook".into(), Value::from(name));
				ctx.session().insert(&schema.with_name("audit"), row).await?;
				if fail {
					return Err(QueryError::Transaction(format!("{name} failed")));
				}
				Ok(value)
			}
			.boxed()
		}
	}

	fn count(db: &MemoryDatabase, schema: &TableSchema) -> usize {
		db.session().select(schema, &QuerySpec::new()).unwrap().0.len()
	}

	#[rstest]
	#[tokio::test]
	async fn test_hooks_run_in_order_and_commit(setup: Fixture) {
		let Fixture { db, schema, log } = setup;
		let crud = base_create(&schema, &log).wrap_create(|create| {
			CreateTx::new()
				.before(audit_hook("A", &schema, &log, false))
				.before(audit_hook("B", &schema, &log, false))
				.after(audit_hook("C", &schema, &log, false))
				.after(audit_hook("D", &schema, &log, false))
				.wrap(create)
		});
		let ctx = QueryContext::new(RequestContext::default(), db.session());

		crud.create(&ctx, InternalValue::new()).await.unwrap();

		assert_eq!(*log.lock(), ["A", "B", "base", "C", "D"]);
		assert_eq!(count(&db, &schema), 1);
		assert_eq!(count(&db, &schema.with_name("audit")), 4);
		assert!(!ctx.session().in_transaction());
	}

	#[rstest]
	#[tokio::test]
	async fn test_failing_before_hook_rolls_back(setup: Fixture) {
		let Fixture { db, schema, log } = setup;
		let crud = base_create(&schema, &log).wrap_create(|create| {
			CreateTx::new()
				.before(audit_hook("A", &schema, &log, false))
				.before(audit_hook("B", &schema, &log, true))
				.after(audit_hook("C", &schema, &log, false))
				.wrap(create)
		});
		let ctx = QueryContext::new(RequestContext::default(), db.session());

		let err = crud.create(&ctx, InternalValue::new()).await.unwrap_err();

		assert_eq!(err.to_string(), "Transaction error: B failed");
		assert_eq!(*log.lock(), ["A", "B"]);
		assert_eq!(count(&db, &schema), 0);
		assert_eq!(count(&db, &schema.with_name("audit")), 0);
		assert!(!ctx.session().in_transaction());
	}

	#[rstest]
	#[tokio::test]
	async fn test_failing_after_hook_rolls_back_base_operation(setup: Fixture) {
		let Fixture { db, schema, log } = setup;
		let crud = base_create(&schema, &log).wrap_create(|create| {
			CreateTx::new()
				.after(audit_hook("C", &schema, &log, true))
				.wrap(create)
		});
		let ctx = QueryContext::new(RequestContext::default(), db.session());

		assert!(crud.create(&ctx, InternalValue::new()).await.is_err());
		assert_eq!(*log.lock(), ["base", "C"]);
		assert_eq!(count(&db, &schema), 0);
	}

	#[rstest]
	#[tokio::test]
	async fn test_update_hooks_see_old_and_new(setup: Fixture) {
		let Fixture { db, .. } = setup;
		let seen: Arc<Mutex<Vec<(Value, Value)>>> = Arc::new(Mutex::new(Vec::new()));
		let recorder = Arc::clone(&seen);
		let crud: Crud<MemorySession> = Crud::new()
			.with_update(|_ctx, _old, new, _id| async move { Ok(new) })
			.wrap_update(|update| {
				UpdateTx::new()
					.before(|_ctx, _old, mut new: InternalValue, _id| async move {
						new.insert("title".into(), Value::from("edited"));
						Ok(new)
					})
					.after(move |_ctx, old: InternalValue, updated: InternalValue, _id| {
						recorder
							.lock()
							.push((old["title"].clone(), updated["title"].clone()));
						async move { Ok(updated) }
					})
					.wrap(update)
			});
		let ctx = QueryContext::new(RequestContext::default(), db.session());
		let mut old = InternalValue::new();
		old.insert("title".into(), Value::from("draft"));

		let updated = crud
			.update(&ctx, old, InternalValue::new(), Value::Int(1))
			.await
			.unwrap();

		assert_eq!(updated["title"], Value::from("edited"));
		assert_eq!(*seen.lock(), [(Value::from("draft"), Value::from("edited"))]);
	}

	#[rstest]
	#[tokio::test]
	async fn test_destroy_hook_failure_keeps_record(setup: Fixture) {
		let Fixture { db, schema, .. } = setup;
		let created = db
			.session()
			.insert(&schema, InternalValue::new())
			.await
			.unwrap();
		let id = created["id"].clone();
		let destroy_schema = schema.clone();
		let crud: Crud<MemorySession> = Crud::new()
			.with_destroy(move |ctx: QueryContext<MemorySession>, id| {
				let schema = destroy_schema.clone();
				async move { ctx.session().remove(&schema, &id).await }
			})
			.wrap_destroy(|destroy| {
				DestroyTx::new()
					.after(|_ctx, _id| async { Err(QueryError::Transaction("audit failed".into())) })
					.wrap(destroy)
			});
		let ctx = QueryContext::new(RequestContext::default(), db.session());

		assert!(crud.destroy(&ctx, id).await.is_err());
		assert_eq!(count(&db, &schema), 1);
	}

	#[rstest]
	#[tokio::test]
	async fn test_session_restored_when_future_is_dropped(setup: Fixture) {
		let Fixture { db, .. } = setup;
		let ctx = QueryContext::new(RequestContext::default(), db.session());
		let pending = in_transaction(&ctx, |_tx| async {
			futures::future::pending::<QueryResult<()>>().await
		});
		let timed_out =
			tokio::time::timeout(std::time::Duration::from_millis(10), pending).await;
		assert!(timed_out.is_err());
		assert!(!ctx.session().in_transaction());
	}
}
