//! Table layout of a model, shared by the backends.

use std::fmt;

use chrono::Utc;
use rivet_core::types::StoreFn;
use rivet_core::{FieldMeta, InternalValue, Model, ModelMeta, TypeKey, Value};
use uuid::Uuid;

use crate::error::QueryResult;

/// How a backend assigns identifiers to new records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
	/// Signed integers from a per-table counter.
	Int,
	/// Unsigned integers from a per-table counter.
	UInt,
	/// Random UUID v4 strings.
	Uuid,
}

impl IdKind {
	fn of(key: TypeKey) -> Self {
		if key == TypeKey::of::<Uuid>() || key == TypeKey::of::<String>() {
			IdKind::Uuid
		} else if key == TypeKey::of::<u8>()
			|| key == TypeKey::of::<u16>()
			|| key == TypeKey::of::<u32>()
			|| key == TypeKey::of::<u64>()
			|| key == TypeKey::of::<usize>()
		{
			IdKind::UInt
		} else {
			IdKind::Int
		}
	}
}

/// A stored column and the conversion from internal to stored form.
#[derive(Clone)]
pub struct Column {
	name: String,
	valuer: Option<StoreFn>,
}

impl Column {
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Converts an internal value into the form the column stores.
	pub fn to_stored(&self, value: &Value) -> QueryResult<Value> {
		match &self.valuer {
			Some(valuer) => Ok(valuer(value)?),
			None => Ok(value.clone()),
		}
	}
}

impl fmt::Debug for Column {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Column")
			.field("name", &self.name)
			.field("valuer", &self.valuer.is_some())
			.finish()
	}
}

/// Table name, primary key, columns and timestamp columns of a model.
///
/// # Examples
///
/// ```
/// use rivet_core::{BaseModel, Model};
/// use rivet_db::{IdKind, TableSchema};
///
/// #[derive(Model)]
/// struct Ticket {
///     #[rivet(embed)]
///     base: BaseModel,
///     title: String,
/// }
///
/// let schema = TableSchema::of::<Ticket>();
/// assert_eq!(schema.name(), "ticket");
/// assert_eq!(schema.primary_key(), "id");
/// assert_eq!(schema.id_kind(), IdKind::Uuid);
/// assert!(schema.column("created_at").is_some());
/// ```
#[derive(Debug, Clone)]
pub struct TableSchema {
	name: String,
	primary_key: String,
	id_kind: IdKind,
	columns: Vec<Column>,
	created_at: bool,
	updated_at: bool,
}

impl TableSchema {
	/// A schema with an integer `id` and no declared columns.
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			primary_key: "id".to_string(),
			id_kind: IdKind::Int,
			columns: Vec::new(),
			created_at: false,
			updated_at: false,
		}
	}

	pub fn of<M: Model>() -> Self {
		Self::from_meta(M::meta())
	}

	/// Relation fields have no column.
	pub fn from_meta(meta: &ModelMeta) -> Self {
		let primary_key = meta.primary_key();
		let is_date_time = |name: &str| {
			meta.field(name)
				.is_some_and(|field| field.capabilities().is_date_time())
		};
		Self {
			name: meta.name().to_string(),
			primary_key: primary_key
				.map(|field| field.name().to_string())
				.unwrap_or_else(|| "id".to_string()),
			id_kind: primary_key
				.map(|field| IdKind::of(field.type_key()))
				.unwrap_or(IdKind::Int),
			columns: meta
				.fields()
				.iter()
				.filter(|field| !field.is_relation())
				.map(column_of)
				.collect(),
			created_at: is_date_time("created_at"),
			updated_at: is_date_time("updated_at"),
		}
	}

	pub fn with_name(&self, name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			..self.clone()
		}
	}

	pub fn with_primary_key(mut self, name: impl Into<String>, kind: IdKind) -> Self {
		self.primary_key = name.into();
		self.id_kind = kind;
		self
	}

	/// Maintains `created_at` and `updated_at`.
	pub fn with_timestamps(mut self) -> Self {
		self.created_at = true;
		self.updated_at = true;
		self
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn primary_key(&self) -> &str {
		&self.primary_key
	}

	pub fn id_kind(&self) -> IdKind {
		self.id_kind
	}

	/// Declared columns; empty for hand-built schemas, which accept any key.
	pub fn columns(&self) -> &[Column] {
		&self.columns
	}

	pub fn column(&self, name: &str) -> Option<&Column> {
		self.columns.iter().find(|column| column.name == name)
	}

	pub fn has_column(&self, name: &str) -> bool {
		self.columns.is_empty() || name == self.primary_key || self.column(name).is_some()
	}

	/// Draws the next identifier. Integer counters never hand out a value
	/// twice, even after deletions.
	pub(crate) fn next_id(&self, counter: &mut u64) -> Value {
		match self.id_kind {
			IdKind::Int => {
				*counter += 1;
				Value::Int(i64::try_from(*counter).unwrap_or(i64::MAX))
			}
			IdKind::UInt => {
				*counter += 1;
				Value::UInt(*counter)
			}
			IdKind::Uuid => Value::String(Uuid::new_v4().to_string()),
		}
	}

	/// Fills missing timestamps of a new record.
	pub(crate) fn stamp_created(&self, row: &mut InternalValue) {
		let now = Value::DateTime(Utc::now());
		for (enabled, name) in [(self.created_at, "created_at"), (self.updated_at, "updated_at")] {
			if enabled && row.get(name).is_none_or(Value::is_null) {
				row.insert(name.to_string(), now.clone());
			}
		}
	}

	pub(crate) fn stamp_updated(&self, row: &mut InternalValue) {
		if self.updated_at {
			row.insert("updated_at".to_string(), Value::DateTime(Utc::now()));
		}
	}
}

fn column_of(field: &FieldMeta) -> Column {
	Column {
		name: field.name().to_string(),
		valuer: field.capabilities().valuer_fn().cloned(),
	}
}
