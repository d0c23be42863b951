//! In-memory backend.
//!
//! A [`MemoryDatabase`] holds one table per model name. Rows are keyed by the
//! textual form of their primary key, so a path segment `"3"` and a stored
//! integer `3` address the same record. Writers are serialized; a transaction
//! works on a staged copy of the tables and publishes it on commit.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use rivet_core::{ConvertError, InternalValue, Model, Value};
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;
use tracing::trace;

use crate::context::QueryContext;
use crate::crud::Crud;
use crate::driver::Driver;
use crate::error::{QueryError, QueryResult};
use crate::query::QuerySpec;
use crate::schema::TableSchema;
use crate::transaction::Session;

/// Failures specific to the in-memory backend.
#[derive(Debug, Error)]
pub enum MemoryError {
	#[error("duplicate primary key `{key}` in table `{table}`")]
	DuplicateKey { table: String, key: String },
}

#[derive(Debug, Clone, Default)]
struct Table {
	rows: IndexMap<String, InternalValue>,
	next_id: u64,
}

type Tables = HashMap<String, Table>;

struct Shared {
	tables: RwLock<Tables>,
	writer: Arc<tokio::sync::Mutex<()>>,
}

/// Tables shared by every model of an application.
///
/// Clones share the same storage.
///
/// # Examples
///
/// ```
/// use rivet_core::{InternalValue, Model, RequestContext, Value};
/// use rivet_db::{MemoryDatabase, QueryDriver};
///
/// #[derive(Model)]
/// struct Note {
///     id: i64,
///     body: String,
/// }
///
/// # tokio_test::block_on(async {
/// let db = MemoryDatabase::new();
/// let driver = db.driver::<Note>();
/// let ctx = driver.middleware(RequestContext::default());
///
/// let mut note = InternalValue::new();
/// note.insert("body".into(), Value::from("buy milk"));
/// let created = driver.crud().create(&ctx, note).await.unwrap();
/// assert_eq!(created["id"], Value::Int(1));
///
/// let fetched = driver.crud().retrieve(&ctx, Value::from("1")).await.unwrap();
/// assert_eq!(fetched["body"], Value::from("buy milk"));
/// # });
/// ```
#[derive(Clone)]
pub struct MemoryDatabase {
	shared: Arc<Shared>,
}

impl Default for MemoryDatabase {
	fn default() -> Self {
		Self::new()
	}
}

impl MemoryDatabase {
	pub fn new() -> Self {
		Self {
			shared: Arc::new(Shared {
				tables: RwLock::new(Tables::new()),
				writer: Arc::new(tokio::sync::Mutex::new(())),
			}),
		}
	}

	/// A session outside any transaction.
	pub fn session(&self) -> MemorySession {
		MemorySession {
			db: self.clone(),
			tx: None,
		}
	}

	/// A driver for `M` with the default CRUD operations.
	pub fn driver<M: Model>(&self) -> Driver<MemorySession> {
		Driver::new(self.session(), crud(TableSchema::of::<M>()))
	}

	/// Number of rows in a table.
	pub fn len(&self, table: &str) -> usize {
		self.shared
			.tables
			.read()
			.get(table)
			.map_or(0, |table| table.rows.len())
	}

	pub fn is_empty(&self, table: &str) -> bool {
		self.len(table) == 0
	}
}

struct MemoryTransaction {
	staged: Mutex<Option<Tables>>,
	parent: Option<Arc<MemoryTransaction>>,
	writer: Mutex<Option<OwnedMutexGuard<()>>>,
	depth: usize,
}

impl MemoryTransaction {
	fn finished() -> QueryError {
		QueryError::Transaction("transaction already finished".to_string())
	}

	fn with_staged<R>(&self, access: impl FnOnce(&mut Tables) -> QueryResult<R>) -> QueryResult<R> {
		let mut staged = self.staged.lock();
		let tables = staged.as_mut().ok_or_else(Self::finished)?;
		access(tables)
	}
}

/// A handle on a [`MemoryDatabase`], possibly inside a transaction.
///
/// While a top-level transaction is open it holds the writer lock, so writes
/// through a session outside that transaction wait for it to finish.
#[derive(Clone)]
pub struct MemorySession {
	db: MemoryDatabase,
	tx: Option<Arc<MemoryTransaction>>,
}

impl MemorySession {
	pub fn database(&self) -> &MemoryDatabase {
		&self.db
	}

	pub fn in_transaction(&self) -> bool {
		self.tx.is_some()
	}

	fn read<R>(&self, access: impl FnOnce(&Tables) -> R) -> QueryResult<R> {
		match &self.tx {
			Some(tx) => tx.with_staged(|tables| Ok(access(tables))),
			None => Ok(access(&self.db.shared.tables.read())),
		}
	}

	async fn write<R>(
		&self,
		access: impl FnOnce(&mut Tables) -> QueryResult<R> + Send,
	) -> QueryResult<R> {
		match &self.tx {
			Some(tx) => tx.with_staged(access),
			None => {
				let _writer = self.db.shared.writer.lock().await;
				let mut tables = self.db.shared.tables.write();
				access(&mut tables)
			}
		}
	}

	/// Matching rows in order, with the page window applied, and the number
	/// of matching rows before paging.
	pub fn select(
		&self,
		schema: &TableSchema,
		spec: &QuerySpec,
	) -> QueryResult<(Vec<InternalValue>, u64)> {
		self.read(|tables| {
			let Some(table) = tables.get(schema.name()) else {
				return (Vec::new(), 0);
			};
			let mut rows: Vec<InternalValue> = table
				.rows
				.values()
				.filter(|row| spec.matches(row))
				.cloned()
				.collect();
			rows.sort_by(|left, right| spec.compare(left, right));
			let total = rows.len() as u64;
			let offset = spec.offset().map_or(0, |offset| offset as usize);
			let limit = spec.limit().map_or(usize::MAX, |limit| limit as usize);
			(rows.into_iter().skip(offset).take(limit).collect(), total)
		})
	}

	/// The row with the given id, if it also satisfies the conditions of
	/// `spec`.
	pub fn get(&self, schema: &TableSchema, id: &Value, spec: &QuerySpec) -> QueryResult<InternalValue> {
		let key = row_key(schema, id)?;
		self.read(|tables| {
			tables
				.get(schema.name())
				.and_then(|table| table.rows.get(&key))
				.filter(|row| spec.matches(row))
				.cloned()
		})?
		.ok_or(QueryError::NotFound)
	}

	/// Inserts a row, drawing an id when the row has none.
	pub async fn insert(&self, schema: &TableSchema, row: InternalValue) -> QueryResult<InternalValue> {
		let mut row = row;
		self.write(|tables| {
			let table = tables.entry(schema.name().to_string()).or_default();
			let id = match row.get(schema.primary_key()) {
				Some(id) if !id.is_null() => {
					if let Some(given) = id.as_i64().and_then(|given| u64::try_from(given).ok()) {
						table.next_id = table.next_id.max(given);
					}
					id.clone()
				}
				_ => schema.next_id(&mut table.next_id),
			};
			let key = row_key(schema, &id)?;
			if table.rows.contains_key(&key) {
				return Err(QueryError::backend(
					format!("insert into `{}`", schema.name()),
					MemoryError::DuplicateKey {
						table: schema.name().to_string(),
						key,
					},
				));
			}
			row.insert(schema.primary_key().to_string(), id);
			schema.stamp_created(&mut row);
			table.rows.insert(key, row.clone());
			trace!(table = schema.name(), "inserted row");
			Ok(row)
		})
		.await
	}

	/// Replaces the row with the given id.
	pub async fn replace(
		&self,
		schema: &TableSchema,
		id: &Value,
		row: InternalValue,
	) -> QueryResult<InternalValue> {
		let key = row_key(schema, id)?;
		let mut row = row;
		self.write(|tables| {
			let slot = tables
				.get_mut(schema.name())
				.and_then(|table| table.rows.get_mut(&key))
				.ok_or(QueryError::NotFound)?;
			if let Some(stored_id) = slot.get(schema.primary_key()) {
				row.insert(schema.primary_key().to_string(), stored_id.clone());
			}
			if let Some(created_at) = slot.get("created_at")
				&& !row.contains_key("created_at")
			{
				row.insert("created_at".to_string(), created_at.clone());
			}
			schema.stamp_updated(&mut row);
			*slot = row.clone();
			Ok(row)
		})
		.await
	}

	/// Deletes the row with the given id; a missing row is not found.
	pub async fn remove(&self, schema: &TableSchema, id: &Value) -> QueryResult<()> {
		let key = row_key(schema, id)?;
		self.write(|tables| {
			tables
				.get_mut(schema.name())
				.and_then(|table| table.rows.shift_remove(&key))
				.map(|_| ())
				.ok_or(QueryError::NotFound)
		})
		.await
	}
}

fn row_key(schema: &TableSchema, id: &Value) -> QueryResult<String> {
	id.id_key().ok_or_else(|| {
		QueryError::Convert(ConvertError::invalid(format!(
			"`{}` cannot address a row of `{}`",
			id.kind_name(),
			schema.name()
		)))
	})
}

#[async_trait]
impl Session for MemorySession {
	async fn begin(&self) -> QueryResult<Self> {
		let tx = match &self.tx {
			Some(parent) => {
				let snapshot = parent.with_staged(|tables| Ok(tables.clone()))?;
				MemoryTransaction {
					staged: Mutex::new(Some(snapshot)),
					parent: Some(Arc::clone(parent)),
					writer: Mutex::new(None),
					depth: parent.depth + 1,
				}
			}
			None => {
				let writer = Arc::clone(&self.db.shared.writer).lock_owned().await;
				let snapshot = self.db.shared.tables.read().clone();
				MemoryTransaction {
					staged: Mutex::new(Some(snapshot)),
					parent: None,
					writer: Mutex::new(Some(writer)),
					depth: 1,
				}
			}
		};
		trace!(depth = tx.depth, "begin memory transaction");
		Ok(MemorySession {
			db: self.db.clone(),
			tx: Some(Arc::new(tx)),
		})
	}

	async fn commit(self) -> QueryResult<()> {
		let tx = self
			.tx
			.ok_or_else(|| QueryError::Transaction("no transaction to commit".to_string()))?;
		let staged = tx.staged.lock().take().ok_or_else(MemoryTransaction::finished)?;
		match &tx.parent {
			Some(parent) => {
				let mut slot = parent.staged.lock();
				if slot.is_none() {
					return Err(MemoryTransaction::finished());
				}
				*slot = Some(staged);
			}
			None => {
				*self.db.shared.tables.write() = staged;
				tx.writer.lock().take();
			}
		}
		trace!(depth = tx.depth, "commit memory transaction");
		Ok(())
	}

	async fn rollback(self) -> QueryResult<()> {
		let tx = self
			.tx
			.ok_or_else(|| QueryError::Transaction("no transaction to roll back".to_string()))?;
		tx.staged.lock().take().ok_or_else(MemoryTransaction::finished)?;
		tx.writer.lock().take();
		trace!(depth = tx.depth, "rollback memory transaction");
		Ok(())
	}
}

/// The default CRUD operations over one table.
///
/// `list` and `retrieve` honour the conditions of the query specification;
/// `update` replaces the stored row.
pub fn crud(schema: TableSchema) -> Crud<MemorySession> {
	let schema = Arc::new(schema);
	let list_schema = Arc::clone(&schema);
	let retrieve_schema = Arc::clone(&schema);
	let create_schema = Arc::clone(&schema);
	let update_schema = Arc::clone(&schema);
	let destroy_schema = schema;

	Crud::new()
		.with_list(move |ctx: QueryContext<MemorySession>| {
			let schema = Arc::clone(&list_schema);
			async move {
				let spec = ctx.spec();
				let (rows, total) = ctx.session().select(&schema, &spec)?;
				if spec.wants_total() {
					ctx.update_spec(|spec| spec.set_total(total));
				}
				Ok(rows)
			}
		})
		.with_retrieve(move |ctx: QueryContext<MemorySession>, id| {
			let schema = Arc::clone(&retrieve_schema);
			async move { ctx.session().get(&schema, &id, &ctx.spec()) }
		})
		.with_create(move |ctx: QueryContext<MemorySession>, value| {
			let schema = Arc::clone(&create_schema);
			async move { ctx.session().insert(&schema, value).await }
		})
		.with_update(move |ctx: QueryContext<MemorySession>, _old, new, id| {
			let schema = Arc::clone(&update_schema);
			async move { ctx.session().replace(&schema, &id, new).await }
		})
		.with_destroy(move |ctx: QueryContext<MemorySession>, id| {
			let schema = Arc::clone(&destroy_schema);
			async move { ctx.session().remove(&schema, &id).await }
		})
}
