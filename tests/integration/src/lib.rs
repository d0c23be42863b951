//! Integration test utilities for Rivet
//!
//! Shared models, request builders and logging setup for the tests under
//! `tests/`.

use std::sync::Once;

use rivet::prelude::*;
use serde_json::Value as JsonValue;
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Installs a test subscriber once per binary. `RUST_LOG` overrides the
/// default `warn` filter.
pub fn init_tracing() {
	TRACING.call_once(|| {
		let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
		let _ = tracing_subscriber::fmt()
			.with_env_filter(filter)
			.with_test_writer()
			.try_init();
	});
}

#[derive(Model)]
#[rivet(name = "books")]
pub struct Book {
	pub id: i64,
	pub title: String,
	pub author: String,
	pub pages: i64,
}

/// DDL for [`Book`] on SQLite.
pub const BOOKS_TABLE: &str = "CREATE TABLE books (
	id INTEGER PRIMARY KEY AUTOINCREMENT,
	title TEXT NOT NULL DEFAULT '',
	author TEXT NOT NULL DEFAULT '',
	pages INTEGER NOT NULL DEFAULT 0
)";

pub fn collection(method: Method) -> RequestContext {
	RequestContext::new(method, "/books")
}

pub fn detail(method: Method, id: i64) -> RequestContext {
	RequestContext::new(method, format!("/books/{id}")).with_param("id", id.to_string())
}

/// Dispatches `body` serialized as JSON, or an empty body for `Null`.
pub async fn send(viewset: &dyn ViewSet, request: RequestContext, body: JsonValue) -> ViewResponse {
	let body = match body {
		JsonValue::Null => Vec::new(),
		body => body.to_string().into_bytes(),
	};
	viewset.dispatch(request, &body).await
}

/// Creates a book and returns its id.
pub async fn create_book(viewset: &dyn ViewSet, title: &str, author: &str, pages: i64) -> i64 {
	let response = send(
		viewset,
		collection(Method::POST),
		serde_json::json!({ "title": title, "author": author, "pages": pages }),
	)
	.await;
	assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
	response.body["id"].as_i64().expect("created book has an integer id")
}
