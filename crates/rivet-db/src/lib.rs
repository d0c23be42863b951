//! # Rivet DB
//!
//! CRUD query drivers for Rivet views.
//!
//! A view never talks to storage directly. It asks a [`QueryDriver`] for:
//!
//! - a [`QueryContext`] for the request, opened by the driver's middleware
//! - the [`QueryMod`]s that record filters and ordering in the context's
//!   [`QuerySpec`]
//! - a [`Pagination`] that restricts the page window and formats the list body
//! - the [`Crud`] operations, which read the spec and the session from the
//!   context
//!
//! Create, update and destroy can be wrapped in transaction pipelines
//! ([`CreateTx`], [`UpdateTx`], [`DestroyTx`]) whose hooks run on the same
//! transaction as the operation they surround.
//!
//! ## Example
//!
//! ```
//! use rivet_core::{InternalValue, Model, RequestContext, Value};
//! use rivet_db::{LimitOffsetPagination, MemoryDatabase, OrderBy, QueryDriver};
//!
//! #[derive(Model)]
//! struct City {
//!     id: i64,
//!     name: String,
//! }
//!
//! # tokio_test::block_on(async {
//! let db = MemoryDatabase::new();
//! let driver = db
//!     .driver::<City>()
//!     .with_order(OrderBy::new(["name"]))
//!     .with_pagination(LimitOffsetPagination::new().with_envelope(true));
//!
//! let ctx = driver.middleware(RequestContext::default());
//! for name in ["Osaka", "Lyon", "Quito"] {
//!     let mut city = InternalValue::new();
//!     city.insert("name".into(), Value::from(name));
//!     driver.crud().create(&ctx, city).await.unwrap();
//! }
//!
//! let ctx = driver.middleware(RequestContext::default().with_query_string("limit=2"));
//! ctx.apply(driver.order());
//! ctx.apply(driver.pagination());
//! let page = driver.crud().list(&ctx).await.unwrap();
//! assert_eq!(page[0]["name"], Value::from("Lyon"));
//! assert_eq!(page.len(), 2);
//! assert_eq!(ctx.spec().total(), Some(3));
//! # });
//! ```

pub mod backends;
pub mod context;
pub mod crud;
pub mod driver;
pub mod error;
pub mod mods;
pub mod pagination;
pub mod query;
pub mod schema;
pub mod transaction;

pub use backends::memory::{MemoryDatabase, MemorySession, crud as memory_crud};
#[cfg(feature = "sqlite")]
pub use backends::sqlite::{SqliteDatabase, SqliteSession, crud as sqlite_crud};
pub use context::{QueryContext, SessionGuard};
pub use crud::{CreateFn, Crud, DestroyFn, ListFn, RetrieveFn, UpdateFn};
pub use driver::{Driver, QueryDriver};
pub use error::{BoxError, QueryError, QueryResult};
pub use mods::{
	CompositeQueryMod, FnQueryMod, NoopQueryMod, OrderBy, OrderingFilter, QueryMod,
	QueryParamFilter,
};
pub use pagination::{LimitOffsetPagination, NoPagination, Pagination};
pub use query::{Condition, Lookup, OrderTerm, QuerySpec};
pub use schema::{Column, IdKind, TableSchema};
pub use transaction::{
	CreateHook, CreateTx, DestroyHook, DestroyTx, Session, UpdateHook, UpdateTx, in_transaction,
};
