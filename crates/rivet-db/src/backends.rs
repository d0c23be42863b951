//! Storage backends.
//!
//! [`memory`] keeps every table in process and is always available;
//! [`sqlite`] runs the same operations through `sqlx` behind the `sqlite`
//! feature.

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;
