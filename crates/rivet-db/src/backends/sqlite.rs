//! SQLite backend.
//!
//! Statements are built from the [`TableSchema`] of a model and the
//! [`QuerySpec`] of the request. Identifiers are quoted and every value is
//! bound as a parameter. Nested transactions map to savepoints on the
//! connection of the outermost transaction.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use rivet_core::conf::DatabaseSettings;
use rivet_core::{ConvertError, InternalValue, Model, Value};
use serde_json::Value as JsonValue;
use sqlx::sqlite::{SqliteArguments, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column as _, Row, Sqlite, Transaction, TypeInfo, ValueRef};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::context::QueryContext;
use crate::crud::Crud;
use crate::driver::Driver;
use crate::error::{QueryError, QueryResult};
use crate::query::{Condition, QuerySpec};
use crate::schema::{IdKind, TableSchema};
use crate::transaction::Session;

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// Failures raised before a statement reaches SQLite.
#[derive(Debug, Error)]
pub enum SqliteError {
	#[error("table `{table}` has no column `{column}`")]
	UnknownColumn { table: String, column: String },
}

/// A bound statement parameter.
#[derive(Debug, Clone, PartialEq)]
enum SqlParam {
	Null,
	Bool(bool),
	Int(i64),
	Float(f64),
	Text(String),
	Bytes(Vec<u8>),
}

impl SqlParam {
	fn from_value(value: &Value) -> QueryResult<Self> {
		Ok(match value {
			Value::Null => SqlParam::Null,
			Value::Bool(b) => SqlParam::Bool(*b),
			Value::Int(i) => SqlParam::Int(*i),
			Value::UInt(u) => match i64::try_from(*u) {
				Ok(i) => SqlParam::Int(i),
				Err(_) => SqlParam::Text(u.to_string()),
			},
			Value::Float(f) => SqlParam::Float(*f),
			Value::String(s) => SqlParam::Text(s.clone()),
			Value::DateTime(dt) => SqlParam::Text(dt.to_rfc3339()),
			Value::Bytes(bytes) => SqlParam::Bytes(bytes.clone()),
			Value::Json(JsonValue::Null) => SqlParam::Null,
			Value::Json(json) => SqlParam::Text(json.to_string()),
			Value::Nullable(inner) => Self::from_value(&inner.clone().into_value())?,
			Value::List(_) | Value::Object(_) => SqlParam::Text(value.to_json().to_string()),
			Value::Custom(custom) => {
				return Err(ConvertError::invalid(format!(
					"`{}` has no stored form; give the field a valuer",
					custom.type_name()
				))
				.into());
			}
		})
	}
}

fn bind_params(mut query: SqliteQuery<'_>, params: Vec<SqlParam>) -> SqliteQuery<'_> {
	for param in params {
		query = match param {
			SqlParam::Null => query.bind(None::<i64>),
			SqlParam::Bool(b) => query.bind(b),
			SqlParam::Int(i) => query.bind(i),
			SqlParam::Float(f) => query.bind(f),
			SqlParam::Text(s) => query.bind(s),
			SqlParam::Bytes(b) => query.bind(b),
		};
	}
	query
}

/// Converts a result row. Columns declared `BOOLEAN` read as booleans.
fn read_row(row: &SqliteRow) -> QueryResult<InternalValue> {
	let mut record = InternalValue::new();
	for column in row.columns() {
		let index = column.ordinal();
		let name = column.name();
		let is_null = row
			.try_get_raw(index)
			.map_err(|err| QueryError::backend(format!("read column `{name}`"), err))?
			.is_null();

		let value = if is_null {
			Value::Null
		} else if column.type_info().name().to_uppercase().contains("BOOL") {
			row.try_get::<i64, _>(index)
				.map(|flag| Value::Bool(flag != 0))
				.or_else(|_| row.try_get::<bool, _>(index).map(Value::Bool))
				.unwrap_or(Value::Null)
		} else if let Ok(i) = row.try_get::<i64, _>(index) {
			Value::Int(i)
		} else if let Ok(f) = row.try_get::<f64, _>(index) {
			Value::Float(f)
		} else if let Ok(s) = row.try_get::<String, _>(index) {
			Value::String(s)
		} else if let Ok(bytes) = row.try_get::<Vec<u8>, _>(index) {
			Value::Bytes(bytes)
		} else {
			Value::Null
		};
		record.insert(name.to_string(), value);
	}
	Ok(record)
}

fn quote(ident: &str) -> String {
	format!("\"{}\"", ident.replace('"', "\"\""))
}

fn checked_column(schema: &TableSchema, column: &str) -> QueryResult<String> {
	if schema.has_column(column) {
		Ok(quote(column))
	} else {
		Err(QueryError::backend(
			format!("query `{}`", schema.name()),
			SqliteError::UnknownColumn {
				table: schema.name().to_string(),
				column: column.to_string(),
			},
		))
	}
}

/// Builds ` WHERE ..` for the conditions and an optional primary key match.
fn where_clause(
	schema: &TableSchema,
	conditions: &[Condition],
	id: Option<&Value>,
	params: &mut Vec<SqlParam>,
) -> QueryResult<String> {
	let mut terms = Vec::new();
	if let Some(id) = id {
		terms.push(format!("{} = ?", quote(schema.primary_key())));
		params.push(SqlParam::from_value(id)?);
	}
	for condition in conditions {
		let column = checked_column(schema, &condition.field)?;
		terms.push(format!("{column} {} ?", condition.lookup.sql_operator()));
		params.push(SqlParam::from_value(&condition.value)?);
	}
	if terms.is_empty() {
		Ok(String::new())
	} else {
		Ok(format!(" WHERE {}", terms.join(" AND ")))
	}
}

fn window(spec: &QuerySpec, params: &mut Vec<SqlParam>) -> String {
	let to_param = |n: u64| SqlParam::Int(i64::try_from(n).unwrap_or(i64::MAX));
	match (spec.limit(), spec.offset()) {
		(None, None) => String::new(),
		(Some(limit), None) => {
			params.push(to_param(limit));
			" LIMIT ?".to_string()
		}
		(limit, Some(offset)) => {
			params.push(limit.map_or(SqlParam::Int(-1), to_param));
			params.push(to_param(offset));
			" LIMIT ? OFFSET ?".to_string()
		}
	}
}

/// Sorted `(column, stored value)` pairs of a row; keys without a column are
/// skipped.
fn stored_columns(schema: &TableSchema, row: &InternalValue) -> QueryResult<Vec<(String, SqlParam)>> {
	let mut keys: Vec<&String> = row.keys().collect();
	keys.sort();
	let mut columns = Vec::with_capacity(keys.len());
	for key in keys {
		if !schema.has_column(key) {
			debug!(table = schema.name(), column = %key, "skipping value without a column");
			continue;
		}
		let value = &row[key];
		let stored = match schema.column(key) {
			Some(column) => column.to_stored(value)?,
			None => value.clone(),
		};
		columns.push((quote(key), SqlParam::from_value(&stored)?));
	}
	Ok(columns)
}

fn sqlx_error(context: impl Into<String>) -> impl FnOnce(sqlx::Error) -> QueryError {
	let context = context.into();
	move |err| QueryError::backend(context, err)
}

/// A pool of SQLite connections.
///
/// # Examples
///
/// ```
/// use rivet_core::conf::DatabaseSettings;
/// use rivet_db::SqliteDatabase;
///
/// # tokio_test::block_on(async {
/// let settings = DatabaseSettings {
///     url: "sqlite::memory:".to_string(),
///     max_connections: 1,
/// };
/// let db = SqliteDatabase::from_settings(&settings).await.unwrap();
/// let affected = db
///     .session()
///     .execute("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT)", Vec::new())
///     .await
///     .unwrap();
/// assert_eq!(affected, 0);
/// # });
/// ```
#[derive(Clone)]
pub struct SqliteDatabase {
	pool: SqlitePool,
}

impl SqliteDatabase {
	pub async fn connect(url: &str) -> QueryResult<Self> {
		let pool = SqlitePool::connect(url)
			.await
			.map_err(sqlx_error(format!("connect to `{url}`")))?;
		Ok(Self { pool })
	}

	pub async fn from_settings(settings: &DatabaseSettings) -> QueryResult<Self> {
		let pool = SqlitePoolOptions::new()
			.max_connections(settings.max_connections)
			.connect(&settings.url)
			.await
			.map_err(sqlx_error(format!("connect to `{}`", settings.url)))?;
		Ok(Self { pool })
	}

	pub fn from_pool(pool: SqlitePool) -> Self {
		Self { pool }
	}

	pub fn pool(&self) -> &SqlitePool {
		&self.pool
	}

	pub fn session(&self) -> SqliteSession {
		SqliteSession {
			pool: self.pool.clone(),
			tx: None,
		}
	}

	/// A driver for `M` with the default CRUD operations.
	pub fn driver<M: Model>(&self) -> Driver<SqliteSession> {
		Driver::new(self.session(), crud(TableSchema::of::<M>()))
	}
}

type SharedTransaction = Arc<Mutex<Option<Transaction<'static, Sqlite>>>>;

struct SqliteTransaction {
	conn: SharedTransaction,
	savepoint: Option<String>,
	depth: usize,
	finished: AtomicBool,
}

impl SqliteTransaction {
	fn finished_error() -> QueryError {
		QueryError::Transaction("transaction already finished".to_string())
	}

	fn ensure_open(&self) -> QueryResult<()> {
		if self.finished.load(Ordering::SeqCst) {
			Err(Self::finished_error())
		} else {
			Ok(())
		}
	}

	async fn run(&self, sql: &str) -> QueryResult<()> {
		let mut guard = self.conn.lock().await;
		let conn = guard.as_mut().ok_or_else(Self::finished_error)?;
		sqlx::query(sql)
			.execute(&mut **conn)
			.await
			.map_err(sqlx_error(format!("execute `{sql}`")))?;
		Ok(())
	}
}

/// A handle on the pool, or on an open transaction.
#[derive(Clone)]
pub struct SqliteSession {
	pool: SqlitePool,
	tx: Option<Arc<SqliteTransaction>>,
}

impl SqliteSession {
	pub fn in_transaction(&self) -> bool {
		self.tx.is_some()
	}

	async fn fetch_rows(&self, sql: &str, params: Vec<SqlParam>) -> QueryResult<Vec<SqliteRow>> {
		trace!(sql, "fetch");
		let query = bind_params(sqlx::query(sql), params);
		let rows = match &self.tx {
			None => query.fetch_all(&self.pool).await,
			Some(tx) => {
				tx.ensure_open()?;
				let mut guard = tx.conn.lock().await;
				let conn = guard.as_mut().ok_or_else(SqliteTransaction::finished_error)?;
				query.fetch_all(&mut **conn).await
			}
		};
		rows.map_err(sqlx_error(format!("query `{sql}`")))
	}

	async fn fetch_optional_row(
		&self,
		sql: &str,
		params: Vec<SqlParam>,
	) -> QueryResult<Option<SqliteRow>> {
		trace!(sql, "fetch optional");
		let query = bind_params(sqlx::query(sql), params);
		let row = match &self.tx {
			None => query.fetch_optional(&self.pool).await,
			Some(tx) => {
				tx.ensure_open()?;
				let mut guard = tx.conn.lock().await;
				let conn = guard.as_mut().ok_or_else(SqliteTransaction::finished_error)?;
				query.fetch_optional(&mut **conn).await
			}
		};
		row.map_err(sqlx_error(format!("query `{sql}`")))
	}

	async fn execute_params(&self, sql: &str, params: Vec<SqlParam>) -> QueryResult<u64> {
		trace!(sql, "execute");
		let query = bind_params(sqlx::query(sql), params);
		let done = match &self.tx {
			None => query.execute(&self.pool).await,
			Some(tx) => {
				tx.ensure_open()?;
				let mut guard = tx.conn.lock().await;
				let conn = guard.as_mut().ok_or_else(SqliteTransaction::finished_error)?;
				query.execute(&mut **conn).await
			}
		};
		done.map(|done| done.rows_affected())
			.map_err(sqlx_error(format!("execute `{sql}`")))
	}

	/// Runs a statement and returns the number of affected rows.
	pub async fn execute(&self, sql: &str, params: Vec<Value>) -> QueryResult<u64> {
		let params = params.iter().map(SqlParam::from_value).collect::<QueryResult<_>>()?;
		self.execute_params(sql, params).await
	}

	/// Runs a query and converts every row.
	pub async fn fetch(&self, sql: &str, params: Vec<Value>) -> QueryResult<Vec<InternalValue>> {
		let params = params.iter().map(SqlParam::from_value).collect::<QueryResult<_>>()?;
		self.fetch_rows(sql, params).await?.iter().map(read_row).collect()
	}

	/// Matching rows in order with the page window applied.
	pub async fn select(&self, schema: &TableSchema, spec: &QuerySpec) -> QueryResult<Vec<InternalValue>> {
		let mut params = Vec::new();
		let mut sql = format!("SELECT * FROM {}", quote(schema.name()));
		sql.push_str(&where_clause(schema, spec.conditions(), None, &mut params)?);
		if !spec.ordering().is_empty() {
			let terms = spec
				.ordering()
				.iter()
				.map(|term| {
					let column = checked_column(schema, &term.field)?;
					Ok(format!("{column} {}", if term.descending { "DESC" } else { "ASC" }))
				})
				.collect::<QueryResult<Vec<_>>>()?;
			sql.push_str(&format!(" ORDER BY {}", terms.join(", ")));
		}
		sql.push_str(&window(spec, &mut params));
		self.fetch_rows(&sql, params).await?.iter().map(read_row).collect()
	}

	/// Number of rows matching the conditions of `spec`, ignoring the window.
	pub async fn count(&self, schema: &TableSchema, spec: &QuerySpec) -> QueryResult<u64> {
		let mut params = Vec::new();
		let sql = format!(
			"SELECT COUNT(*) FROM {}{}",
			quote(schema.name()),
			where_clause(schema, spec.conditions(), None, &mut params)?
		);
		let row = self
			.fetch_optional_row(&sql, params)
			.await?
			.ok_or(QueryError::NotFound)?;
		let count: i64 = row.try_get(0).map_err(sqlx_error(format!("read `{sql}`")))?;
		Ok(u64::try_from(count).unwrap_or_default())
	}

	/// The row with the given id, if it also satisfies the conditions of
	/// `spec`.
	pub async fn get(&self, schema: &TableSchema, id: &Value, spec: &QuerySpec) -> QueryResult<InternalValue> {
		let mut params = Vec::new();
		let sql = format!(
			"SELECT * FROM {}{} LIMIT 1",
			quote(schema.name()),
			where_clause(schema, spec.conditions(), Some(id), &mut params)?
		);
		match self.fetch_optional_row(&sql, params).await? {
			Some(row) => read_row(&row),
			None => Err(QueryError::NotFound),
		}
	}

	/// Inserts a row. Integer keys left empty are assigned by SQLite; UUID
	/// keys are generated.
	pub async fn insert(&self, schema: &TableSchema, row: InternalValue) -> QueryResult<InternalValue> {
		let mut row = row;
		let pk = schema.primary_key().to_string();
		if row.get(&pk).is_none_or(Value::is_null) {
			match schema.id_kind() {
				IdKind::Uuid => {
					row.insert(pk, schema.next_id(&mut 0));
				}
				IdKind::Int | IdKind::UInt => {
					row.remove(&pk);
				}
			}
		}
		schema.stamp_created(&mut row);

		let columns = stored_columns(schema, &row)?;
		let sql = if columns.is_empty() {
			format!("INSERT INTO {} DEFAULT VALUES RETURNING *", quote(schema.name()))
		} else {
			let names: Vec<&str> = columns.iter().map(|(name, _)| name.as_str()).collect();
			format!(
				"INSERT INTO {} ({}) VALUES ({}) RETURNING *",
				quote(schema.name()),
				names.join(", "),
				vec!["?"; names.len()].join(", ")
			)
		};
		let params = columns.into_iter().map(|(_, param)| param).collect();
		let stored = self
			.fetch_optional_row(&sql, params)
			.await?
			.ok_or_else(|| anyhow::anyhow!("insert into `{}` returned no row", schema.name()))?;
		read_row(&stored)
	}

	/// Writes the columns present in `row` to the row with the given id.
	pub async fn replace(
		&self,
		schema: &TableSchema,
		id: &Value,
		row: InternalValue,
	) -> QueryResult<InternalValue> {
		let mut row = row;
		row.remove(schema.primary_key());
		schema.stamp_updated(&mut row);

		let columns = stored_columns(schema, &row)?;
		if columns.is_empty() {
			return self.get(schema, id, &QuerySpec::new()).await;
		}
		let assignments: Vec<String> = columns.iter().map(|(name, _)| format!("{name} = ?")).collect();
		let mut params: Vec<SqlParam> = columns.into_iter().map(|(_, param)| param).collect();
		let sql = format!(
			"UPDATE {} SET {}{} RETURNING *",
			quote(schema.name()),
			assignments.join(", "),
			where_clause(schema, &[], Some(id), &mut params)?
		);
		match self.fetch_optional_row(&sql, params).await? {
			Some(updated) => read_row(&updated),
			None => Err(QueryError::NotFound),
		}
	}

	/// Deletes the row with the given id; a missing row is not found.
	pub async fn remove(&self, schema: &TableSchema, id: &Value) -> QueryResult<()> {
		let mut params = Vec::new();
		let sql = format!(
			"DELETE FROM {}{}",
			quote(schema.name()),
			where_clause(schema, &[], Some(id), &mut params)?
		);
		match self.execute_params(&sql, params).await? {
			0 => Err(QueryError::NotFound),
			_ => Ok(()),
		}
	}
}

#[async_trait]
impl Session for SqliteSession {
	async fn begin(&self) -> QueryResult<Self> {
		let tx = match &self.tx {
			None => {
				let inner = self
					.pool
					.begin()
					.await
					.map_err(sqlx_error("begin transaction"))?;
				SqliteTransaction {
					conn: Arc::new(Mutex::new(Some(inner))),
					savepoint: None,
					depth: 1,
					finished: AtomicBool::new(false),
				}
			}
			Some(parent) => {
				parent.ensure_open()?;
				let depth = parent.depth + 1;
				let savepoint = format!("sp_{depth}");
				parent.run(&format!("SAVEPOINT {}", quote(&savepoint))).await?;
				SqliteTransaction {
					conn: Arc::clone(&parent.conn),
					savepoint: Some(savepoint),
					depth,
					finished: AtomicBool::new(false),
				}
			}
		};
		trace!(depth = tx.depth, "begin sqlite transaction");
		Ok(SqliteSession {
			pool: self.pool.clone(),
			tx: Some(Arc::new(tx)),
		})
	}

	async fn commit(self) -> QueryResult<()> {
		let tx = self
			.tx
			.ok_or_else(|| QueryError::Transaction("no transaction to commit".to_string()))?;
		if tx.finished.swap(true, Ordering::SeqCst) {
			return Err(SqliteTransaction::finished_error());
		}
		match &tx.savepoint {
			Some(name) => tx.run(&format!("RELEASE SAVEPOINT {}", quote(name))).await?,
			None => {
				let inner = tx
					.conn
					.lock()
					.await
					.take()
					.ok_or_else(SqliteTransaction::finished_error)?;
				inner.commit().await.map_err(sqlx_error("commit transaction"))?;
			}
		}
		trace!(depth = tx.depth, "commit sqlite transaction");
		Ok(())
	}

	async fn rollback(self) -> QueryResult<()> {
		let tx = self
			.tx
			.ok_or_else(|| QueryError::Transaction("no transaction to roll back".to_string()))?;
		if tx.finished.swap(true, Ordering::SeqCst) {
			return Err(SqliteTransaction::finished_error());
		}
		match &tx.savepoint {
			Some(name) => {
				tx.run(&format!("ROLLBACK TO SAVEPOINT {}", quote(name))).await?;
				tx.run(&format!("RELEASE SAVEPOINT {}", quote(name))).await?;
			}
			None => {
				let inner = tx
					.conn
					.lock()
					.await
					.take()
					.ok_or_else(SqliteTransaction::finished_error)?;
				inner.rollback().await.map_err(sqlx_error("roll back transaction"))?;
			}
		}
		trace!(depth = tx.depth, "rollback sqlite transaction");
		Ok(())
	}
}

/// The default CRUD operations over one table.
pub fn crud(schema: TableSchema) -> Crud<SqliteSession> {
	let schema = Arc::new(schema);
	let list_schema = Arc::clone(&schema);
	let retrieve_schema = Arc::clone(&schema);
	let create_schema = Arc::clone(&schema);
	let update_schema = Arc::clone(&schema);
	let destroy_schema = schema;

	Crud::new()
		.with_list(move |ctx: QueryContext<SqliteSession>| {
			let schema = Arc::clone(&list_schema);
			async move {
				let spec = ctx.spec();
				let session = ctx.session();
				let rows = session.select(&schema, &spec).await?;
				if spec.wants_total() {
					let total = session.count(&schema, &spec).await?;
					ctx.update_spec(|spec| spec.set_total(total));
				}
				Ok(rows)
			}
		})
		.with_retrieve(move |ctx: QueryContext<SqliteSession>, id| {
			let schema = Arc::clone(&retrieve_schema);
			async move { ctx.session().get(&schema, &id, &ctx.spec()).await }
		})
		.with_create(move |ctx: QueryContext<SqliteSession>, value| {
			let schema = Arc::clone(&create_schema);
			async move { ctx.session().insert(&schema, value).await }
		})
		.with_update(move |ctx: QueryContext<SqliteSession>, _old, new, id| {
			let schema = Arc::clone(&update_schema);
			async move { ctx.session().replace(&schema, &id, new).await }
		})
		.with_destroy(move |ctx: QueryContext<SqliteSession>, id| {
			let schema = Arc::clone(&destroy_schema);
			async move { ctx.session().remove(&schema, &id).await }
		})
}
