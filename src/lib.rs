//! # Rivet
//!
//! Reflective model serialization and CRUD query drivers for REST endpoints.
//!
//! Rivet turns a plain Rust struct into a set of JSON endpoints. The model is
//! described once by deriving [`Model`]; everything else is derived from that
//! description at runtime:
//!
//! - [`rest`]: serializers that convert between the wire representation, the
//!   internal value handed to storage, and the stored row
//! - [`db`]: query drivers with filtering, ordering, pagination and
//!   transactional create, update and destroy pipelines
//! - [`views`]: model viewsets dispatching requests to the standard actions
//!
//! ## Feature Flags
//!
//! - `standard` (default): derive macro and viewsets
//! - `macros`: `#[derive(Model)]`
//! - `views`: the [`views`] module
//! - `db-sqlite`: the SQLite driver, backed by `sqlx`
//! - `full`: all of the above
//!
//! ## Quick Example
//!
//! ```
//! # tokio_test::block_on(async {
//! use rivet::prelude::*;
//! use serde_json::json;
//!
//! #[derive(Model)]
//! #[rivet(name = "users")]
//! struct User {
//!     id: i64,
//!     username: String,
//!     #[rivet(rename = "email_address")]
//!     email: String,
//! }
//!
//! let db = MemoryDatabase::new();
//! let users = ModelViewSet::<User, _>::new(db.driver::<User>()).unwrap();
//!
//! let response = users
//!     .dispatch(
//!         RequestContext::new(Method::POST, "/users"),
//!         br#"{"username": "ana", "email_address": "ana@example.com"}"#,
//!     )
//!     .await;
//! assert_eq!(response.status, StatusCode::CREATED);
//! assert_eq!(response.body["id"], json!(1));
//!
//! let response = users
//!     .dispatch(RequestContext::new(Method::POST, "/users"), br#"{"nickname": "a"}"#)
//!     .await;
//! assert_eq!(response.status, StatusCode::BAD_REQUEST);
//! assert!(response.body["errors"]["nickname"].is_array());
//! # });
//! ```

extern crate self as rivet;

pub use rivet_core::*;

pub use rivet_db as db;
pub use rivet_rest as rest;
#[cfg(feature = "views")]
pub use rivet_views as views;

pub use http::{Method, StatusCode};

/// Everything needed to declare a model and serve it.
pub mod prelude {
	pub use crate::{
		Error, InternalValue, Method, Model, RequestContext, Representation, StatusCode,
		ValidationError, Value,
	};

	pub use crate::db::{
		CreateTx, DestroyTx, Driver, LimitOffsetPagination, MemoryDatabase, OrderingFilter,
		QueryContext, QueryDriver, QueryParamFilter, UpdateTx,
	};
	#[cfg(feature = "db-sqlite")]
	pub use crate::db::SqliteDatabase;

	pub use crate::rest::{
		ModelSerializer, RequiredFields, Serializer, SerializerError, ValidatingSerializer,
	};

	#[cfg(feature = "views")]
	pub use crate::views::{Action, ModelViewSet, ViewResponse, ViewSet};
}
