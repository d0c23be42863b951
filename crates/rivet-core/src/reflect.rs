//! Model reflection.
//!
//! A [`ModelMeta`] is the registration-time table describing every declared
//! field of a model: its wire name, its type and the conversion capabilities
//! the type exposes. [`probe`] answers capability questions from that table.

mod base;
mod meta;
mod probe;

pub use base::BaseModel;
pub use meta::{FieldMeta, Model, ModelMeta, ModelMetaBuilder, field_from};
pub use probe::{FieldSettings, probe};
