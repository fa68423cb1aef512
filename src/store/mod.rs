//! Persistence contract.
//!
//! Every read is tenant-scoped: records owned by another tenant are
//! indistinguishable from absent. Assignment updates use optimistic
//! concurrency on the integer `version`; a conflicting update fails with
//! `stale_version` and the caller reloads and retries. All mutations flow
//! through a [`Store`] implementation; the service ships with the
//! in-memory [`MemoryStore`] and treats the durable backend as a
//! deployment concern behind this trait.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{
    Assignment, AuditRecord, Dataset, JsonMap, Label, Labeler, Queue, SampleRef, Schema,
    SchemaVersion,
};

pub use memory::MemoryStore;

/// Store errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Absent, or owned by a different tenant.
    #[error("not found: {0}")]
    NotFound(String),

    /// A write named a resource owned by a different tenant.
    #[error("tenant mismatch for {0}")]
    TenantMismatch(String),

    /// Optimistic-lock conflict; reload and retry.
    #[error("stale version for assignment {0}")]
    StaleVersion(String),

    /// A label for this (assignment, labeler) pair already exists.
    #[error("duplicate label for assignment {assignment_id} by labeler {labeler_id}")]
    DuplicateLabel {
        assignment_id: String,
        labeler_id: String,
    },

    /// Unique-name collision within a tenant.
    #[error("duplicate name: {0}")]
    DuplicateName(String),

    /// The schema version is frozen or referenced by labels.
    #[error("schema version {0} is immutable")]
    Immutable(String),

    /// The assignment status machine forbids this edge.
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("store conflict: {0}")]
    Conflict(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Work-remaining counters for a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total_assignments: u64,
    pub labeled: u64,
    /// `max(total_assignments - labeled, 0)`.
    pub remaining: u64,
}

/// Durable persistence for queues, schema versions, sample refs,
/// assignments, labels, and the audit log.
#[async_trait]
pub trait Store: Send + Sync {
    // -- schemas ---------------------------------------------------------

    async fn put_schema(&self, schema: Schema) -> StoreResult<Schema>;
    async fn get_schema(&self, id: &str, tenant_id: &str) -> StoreResult<Schema>;

    // -- schema versions -------------------------------------------------

    /// Insert or update a version. Updates require the stored version to
    /// still be mutable.
    async fn put_schema_version(&self, version: SchemaVersion) -> StoreResult<SchemaVersion>;
    async fn get_schema_version(&self, id: &str, tenant_id: &str) -> StoreResult<SchemaVersion>;
    /// Explicit freeze; freezing an already-frozen version is a conflict.
    async fn freeze_schema_version(
        &self,
        id: &str,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<SchemaVersion>;

    // -- queues ----------------------------------------------------------

    async fn put_queue(&self, queue: Queue) -> StoreResult<Queue>;
    async fn get_queue(&self, id: &str, tenant_id: &str) -> StoreResult<Queue>;
    async fn queue_stats(&self, queue_id: &str, tenant_id: &str) -> StoreResult<QueueStats>;

    // -- samples ---------------------------------------------------------

    async fn put_sample(&self, sample: SampleRef) -> StoreResult<SampleRef>;
    async fn get_sample(&self, id: &str, tenant_id: &str) -> StoreResult<SampleRef>;
    async fn list_queue_samples(&self, queue_id: &str, tenant_id: &str)
        -> StoreResult<Vec<SampleRef>>;

    // -- labelers --------------------------------------------------------

    async fn put_labeler(&self, labeler: Labeler) -> StoreResult<Labeler>;
    async fn get_labeler(&self, id: &str, tenant_id: &str) -> StoreResult<Labeler>;
    async fn get_labeler_by_external_id(
        &self,
        external_id: &str,
        tenant_id: &str,
    ) -> StoreResult<Labeler>;
    async fn list_labelers(&self, tenant_id: &str) -> StoreResult<Vec<Labeler>>;

    // -- assignments -----------------------------------------------------

    async fn create_assignment(&self, assignment: Assignment) -> StoreResult<Assignment>;
    async fn get_assignment(&self, id: &str, tenant_id: &str) -> StoreResult<Assignment>;
    /// Optimistic update: succeeds iff the stored row still carries
    /// `assignment.version`, then stores with the version incremented.
    async fn update_assignment(&self, assignment: Assignment) -> StoreResult<Assignment>;
    async fn list_queue_assignments(
        &self,
        queue_id: &str,
        tenant_id: &str,
    ) -> StoreResult<Vec<Assignment>>;
    /// Reserved assignments currently held by the labeler.
    async fn count_active_assignments(
        &self,
        labeler_id: &str,
        tenant_id: &str,
    ) -> StoreResult<u32>;
    /// Reserved assignments whose deadline has passed, across tenants.
    /// Worker-only.
    async fn find_expired_assignments(&self, now: DateTime<Utc>) -> StoreResult<Vec<Assignment>>;

    // -- labels ----------------------------------------------------------

    /// Atomic submission: insert the label (unique per
    /// (assignment, labeler)), freeze the schema version on first write,
    /// bump its label count, and move the assignment to `completed` under
    /// the optimistic lock. Partial failure leaves no visible change.
    async fn submit_label(&self, label: Label, assignment: Assignment) -> StoreResult<Label>;
    async fn get_label(&self, id: &str, tenant_id: &str) -> StoreResult<Label>;
    /// Live labels for one sample.
    async fn list_sample_labels(&self, sample_id: &str, tenant_id: &str)
        -> StoreResult<Vec<Label>>;
    /// Live labels of a queue ordered by
    /// `(sample_id, labeler_id, submitted_at)`, in offset/limit pages.
    async fn list_queue_labels(
        &self,
        queue_id: &str,
        tenant_id: &str,
        offset: usize,
        limit: usize,
    ) -> StoreResult<Vec<Label>>;
    /// Labels validated against one schema version, in offset/limit pages.
    async fn list_version_labels(
        &self,
        schema_version_id: &str,
        tenant_id: &str,
        offset: usize,
        limit: usize,
    ) -> StoreResult<Vec<Label>>;
    /// Rewrite a label payload (retention redaction / migration). When
    /// `schema_version_id` is given the label is re-homed and both
    /// versions' label counts are adjusted.
    async fn rewrite_label_payload(
        &self,
        id: &str,
        tenant_id: &str,
        payload: JsonMap,
        schema_version_id: Option<String>,
    ) -> StoreResult<Label>;
    /// Soft delete: set the tombstone, keep the row.
    async fn tombstone_label(
        &self,
        id: &str,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Label>;
    /// Hard delete: destroy the row.
    async fn delete_label(&self, id: &str, tenant_id: &str) -> StoreResult<()>;
    /// All labels, across tenants, for retention scans. Worker-only.
    async fn scan_labels(&self) -> StoreResult<Vec<Label>>;
    /// Sample ids with at least `min_labels` live labels, optionally
    /// restricted to one queue, across tenants. Worker-only.
    async fn samples_with_min_labels(
        &self,
        min_labels: usize,
        queue_id: Option<&str>,
    ) -> StoreResult<Vec<String>>;

    // -- audit -----------------------------------------------------------

    async fn append_audit(&self, record: AuditRecord) -> StoreResult<()>;
    async fn list_audit(&self, tenant_id: &str) -> StoreResult<Vec<AuditRecord>>;
    /// Delete audit records older than `cutoff`, across tenants; returns
    /// how many were removed. Worker-only.
    async fn delete_audit_older_than(&self, cutoff: DateTime<Utc>) -> StoreResult<usize>;

    // -- datasets --------------------------------------------------------

    async fn put_dataset(&self, dataset: Dataset) -> StoreResult<Dataset>;
    async fn get_dataset(&self, id: &str, tenant_id: &str) -> StoreResult<Dataset>;
}
