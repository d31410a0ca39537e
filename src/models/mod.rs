//! Domain entities and their validation rules.
//!
//! Entities are built through validating constructors and map to database
//! rows via `sqlx::FromRow` and to JSON via `serde`.

pub mod id;
pub mod measurement;
pub mod user;
pub mod validation;

pub use id::{Id, InvalidId, new_id, parse_id};
pub use measurement::{ImageEncoding, Measurement};
pub use user::{User, UserError};
pub use validation::ValidationError;
