//! Label payload validation, schema-version freezing, and forward
//! migrations.
//!
//! - `fields`: per-field typed validation returning the accepted payload
//!   or the complete per-field error list (never short-circuits)
//! - `versioning`: freeze-on-first-write semantics for schema versions
//! - `migration`: registered payload transforms between versions, with
//!   batching and dry-run

pub mod fields;
pub mod migration;
pub mod versioning;

pub use fields::{validate_payload, FieldError, FieldValue, ValidationCode};
pub use migration::{MigrationEngine, MigrationReport, PayloadTransform};
pub use versioning::{freeze, freeze_on_first_write, VersioningError};
