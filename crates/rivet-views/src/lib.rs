//! # Rivet Views
//!
//! Model viewsets for Rivet.
//!
//! A [`ModelViewSet`] ties a serializer from `rivet-rest` to a query driver
//! from `rivet-db` and exposes the standard actions:
//!
//! | Method   | Path          | Action           | Success |
//! |----------|---------------|------------------|---------|
//! | `GET`    | `/items`      | `list`           | 200     |
//! | `POST`   | `/items`      | `create`         | 201     |
//! | `GET`    | `/items/{id}` | `retrieve`       | 200     |
//! | `PUT`    | `/items/{id}` | `update`         | 200     |
//! | `PATCH`  | `/items/{id}` | `partial_update` | 200     |
//! | `DELETE` | `/items/{id}` | `destroy`        | 204     |
//!
//! Failures are rendered from [`rivet_core::Error`]: validation problems
//! answer 400 with an `errors` object keyed by field, a missing record 404,
//! and anything unexpected a generic 500.

pub mod actions;
pub mod response;
pub mod viewset;

pub use actions::Action;
pub use response::ViewResponse;
pub use viewset::{ModelViewSet, ViewSet};
