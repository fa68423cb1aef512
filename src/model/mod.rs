//! Domain entities for the labeling queue service.
//!
//! Every persisted entity carries a tenant id; the store treats records
//! from a foreign tenant as absent. Identifiers are opaque strings and
//! compare byte-wise.

pub mod assignment;
pub mod audit;
pub mod dataset;
pub mod label;
pub mod labeler;
pub mod queue;
pub mod sample;
pub mod schema;

pub use assignment::{Assignment, AssignmentStatus};
pub use audit::{AuditAction, AuditRecord};
pub use dataset::Dataset;
pub use label::Label;
pub use labeler::Labeler;
pub use queue::{PolicyConfig, Queue, QueueStatus};
pub use sample::{Difficulty, DifficultyLevel, SampleRef};
pub use schema::{FieldDef, FieldMetadata, FieldType, PiiLevel, Schema, SchemaVersion};

/// JSON object map used for label payloads and free-form metadata.
///
/// `serde_json`'s map is ordered by key, which keeps payload iteration
/// (and therefore "first field" defaults and CSV column layout)
/// deterministic.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Generate an opaque entity id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
