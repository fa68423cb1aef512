//! In-memory store backend.
//!
//! All tables live behind one `parking_lot::RwLock`, which is what makes
//! the multi-table submission transaction genuinely atomic: every check
//! runs before any mutation while the write guard is held. Nothing in
//! here suspends, so holding the guard across a call is safe.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};

use super::{QueueStats, Store, StoreError, StoreResult};
use crate::model::{
    Assignment, AssignmentStatus, AuditRecord, Dataset, JsonMap, Label, Labeler, Queue, SampleRef,
    Schema, SchemaVersion,
};
use crate::validation::versioning;

#[derive(Default)]
struct Tables {
    schemas: HashMap<String, Schema>,
    schema_versions: HashMap<String, SchemaVersion>,
    queues: HashMap<String, Queue>,
    samples: HashMap<String, SampleRef>,
    labelers: HashMap<String, Labeler>,
    assignments: HashMap<String, Assignment>,
    labels: HashMap<String, Label>,
    /// Uniqueness index: one label per (assignment, labeler).
    label_keys: HashSet<(String, String)>,
    audit: Vec<AuditRecord>,
    datasets: HashMap<String, Dataset>,
}

/// The in-memory [`Store`] implementation.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Tenant-scoped lookup helper: a foreign-tenant record reads as absent.
fn scoped<'a, T>(record: Option<&'a T>, id: &str, tenant_id: &str) -> StoreResult<&'a T>
where
    T: crate::tenant::TenantScoped,
{
    match record {
        Some(r) if r.tenant_id() == tenant_id => Ok(r),
        _ => Err(StoreError::NotFound(id.to_string())),
    }
}

/// Write guard: an existing record may not move between tenants.
fn check_same_tenant<T: crate::tenant::TenantScoped>(
    existing: Option<&T>,
    incoming: &T,
    id: &str,
) -> StoreResult<()> {
    if let Some(existing) = existing {
        if existing.tenant_id() != incoming.tenant_id() {
            return Err(StoreError::TenantMismatch(id.to_string()));
        }
    }
    Ok(())
}

fn label_sort_key(label: &Label) -> (String, String, DateTime<Utc>) {
    (
        label.sample_id.clone(),
        label.labeler_id.clone(),
        label.submitted_at,
    )
}

#[async_trait]
impl Store for MemoryStore {
    // -- schemas ---------------------------------------------------------

    async fn put_schema(&self, schema: Schema) -> StoreResult<Schema> {
        let mut tables = self.tables.write();
        check_same_tenant(tables.schemas.get(&schema.id), &schema, &schema.id)?;
        tables.schemas.insert(schema.id.clone(), schema.clone());
        Ok(schema)
    }

    async fn get_schema(&self, id: &str, tenant_id: &str) -> StoreResult<Schema> {
        let tables = self.tables.read();
        scoped(tables.schemas.get(id), id, tenant_id).map(Clone::clone)
    }

    // -- schema versions -------------------------------------------------

    async fn put_schema_version(&self, version: SchemaVersion) -> StoreResult<SchemaVersion> {
        let mut tables = self.tables.write();
        if let Some(existing) = tables.schema_versions.get(&version.id) {
            check_same_tenant(Some(existing), &version, &version.id)?;
            if !existing.is_mutable() {
                return Err(StoreError::Immutable(version.id.clone()));
            }
        }
        tables
            .schema_versions
            .insert(version.id.clone(), version.clone());
        Ok(version)
    }

    async fn get_schema_version(&self, id: &str, tenant_id: &str) -> StoreResult<SchemaVersion> {
        let tables = self.tables.read();
        scoped(tables.schema_versions.get(id), id, tenant_id).map(Clone::clone)
    }

    async fn freeze_schema_version(
        &self,
        id: &str,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<SchemaVersion> {
        let mut tables = self.tables.write();
        let mut version = scoped(tables.schema_versions.get(id), id, tenant_id)?.clone();
        versioning::freeze(&mut version, now)
            .map_err(|err| StoreError::Conflict(err.to_string()))?;
        tables
            .schema_versions
            .insert(version.id.clone(), version.clone());
        Ok(version)
    }

    // -- queues ----------------------------------------------------------

    async fn put_queue(&self, queue: Queue) -> StoreResult<Queue> {
        let mut tables = self.tables.write();
        check_same_tenant(tables.queues.get(&queue.id), &queue, &queue.id)?;
        let name_taken = tables.queues.values().any(|q| {
            q.id != queue.id && q.tenant_id == queue.tenant_id && q.name == queue.name
        });
        if name_taken {
            return Err(StoreError::DuplicateName(queue.name.clone()));
        }
        tables.queues.insert(queue.id.clone(), queue.clone());
        Ok(queue)
    }

    async fn get_queue(&self, id: &str, tenant_id: &str) -> StoreResult<Queue> {
        let tables = self.tables.read();
        scoped(tables.queues.get(id), id, tenant_id).map(Clone::clone)
    }

    async fn queue_stats(&self, queue_id: &str, tenant_id: &str) -> StoreResult<QueueStats> {
        let tables = self.tables.read();
        scoped(tables.queues.get(queue_id), queue_id, tenant_id)?;

        let total_assignments = tables
            .assignments
            .values()
            .filter(|a| a.queue_id == queue_id)
            .count() as u64;
        let labeled = tables
            .labels
            .values()
            .filter(|l| l.queue_id == queue_id && l.is_live())
            .count() as u64;

        Ok(QueueStats {
            total_assignments,
            labeled,
            remaining: total_assignments.saturating_sub(labeled),
        })
    }

    // -- samples ---------------------------------------------------------

    async fn put_sample(&self, sample: SampleRef) -> StoreResult<SampleRef> {
        let mut tables = self.tables.write();
        let queue = tables
            .queues
            .get(&sample.queue_id)
            .ok_or_else(|| StoreError::NotFound(sample.queue_id.clone()))?;
        if queue.tenant_id != sample.tenant_id {
            return Err(StoreError::TenantMismatch(sample.queue_id.clone()));
        }
        check_same_tenant(tables.samples.get(&sample.id), &sample, &sample.id)?;
        tables.samples.insert(sample.id.clone(), sample.clone());
        Ok(sample)
    }

    async fn get_sample(&self, id: &str, tenant_id: &str) -> StoreResult<SampleRef> {
        let tables = self.tables.read();
        scoped(tables.samples.get(id), id, tenant_id).map(Clone::clone)
    }

    async fn list_queue_samples(
        &self,
        queue_id: &str,
        tenant_id: &str,
    ) -> StoreResult<Vec<SampleRef>> {
        let tables = self.tables.read();
        scoped(tables.queues.get(queue_id), queue_id, tenant_id)?;
        let mut samples: Vec<SampleRef> = tables
            .samples
            .values()
            .filter(|s| s.queue_id == queue_id && s.tenant_id == tenant_id)
            .cloned()
            .collect();
        samples.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(samples)
    }

    // -- labelers --------------------------------------------------------

    async fn put_labeler(&self, labeler: Labeler) -> StoreResult<Labeler> {
        let mut tables = self.tables.write();
        check_same_tenant(tables.labelers.get(&labeler.id), &labeler, &labeler.id)?;
        let external_taken = tables.labelers.values().any(|l| {
            l.id != labeler.id
                && l.tenant_id == labeler.tenant_id
                && l.external_id == labeler.external_id
        });
        if external_taken {
            return Err(StoreError::DuplicateName(labeler.external_id.clone()));
        }
        tables.labelers.insert(labeler.id.clone(), labeler.clone());
        Ok(labeler)
    }

    async fn get_labeler(&self, id: &str, tenant_id: &str) -> StoreResult<Labeler> {
        let tables = self.tables.read();
        scoped(tables.labelers.get(id), id, tenant_id).map(Clone::clone)
    }

    async fn get_labeler_by_external_id(
        &self,
        external_id: &str,
        tenant_id: &str,
    ) -> StoreResult<Labeler> {
        let tables = self.tables.read();
        tables
            .labelers
            .values()
            .find(|l| l.tenant_id == tenant_id && l.external_id == external_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(external_id.to_string()))
    }

    async fn list_labelers(&self, tenant_id: &str) -> StoreResult<Vec<Labeler>> {
        let tables = self.tables.read();
        let mut labelers: Vec<Labeler> = tables
            .labelers
            .values()
            .filter(|l| l.tenant_id == tenant_id)
            .cloned()
            .collect();
        labelers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(labelers)
    }

    // -- assignments -----------------------------------------------------

    async fn create_assignment(&self, assignment: Assignment) -> StoreResult<Assignment> {
        let mut tables = self.tables.write();
        if tables.assignments.contains_key(&assignment.id) {
            return Err(StoreError::Conflict(format!(
                "assignment {} already exists",
                assignment.id
            )));
        }

        // Capacity constraint: a sample never carries more live labels
        // plus active reservations than the queue's redundancy target.
        // This is what resolves two dispatchers racing on one candidate.
        if assignment.status == AssignmentStatus::Reserved {
            if let Some(queue) = tables.queues.get(&assignment.queue_id) {
                let labeled = tables
                    .labels
                    .values()
                    .filter(|l| l.sample_id == assignment.sample_id && l.is_live())
                    .count() as u32;
                let reserved = tables
                    .assignments
                    .values()
                    .filter(|a| {
                        a.sample_id == assignment.sample_id
                            && a.status == AssignmentStatus::Reserved
                    })
                    .count() as u32;
                if labeled + reserved >= queue.labels_per_sample {
                    return Err(StoreError::Conflict(format!(
                        "sample {} is fully reserved",
                        assignment.sample_id
                    )));
                }
            }
        }

        tables
            .assignments
            .insert(assignment.id.clone(), assignment.clone());
        Ok(assignment)
    }

    async fn get_assignment(&self, id: &str, tenant_id: &str) -> StoreResult<Assignment> {
        let tables = self.tables.read();
        scoped(tables.assignments.get(id), id, tenant_id).map(Clone::clone)
    }

    async fn update_assignment(&self, assignment: Assignment) -> StoreResult<Assignment> {
        let mut tables = self.tables.write();
        let stored = scoped(
            tables.assignments.get(&assignment.id),
            &assignment.id,
            &assignment.tenant_id,
        )?;

        if stored.version != assignment.version {
            return Err(StoreError::StaleVersion(assignment.id.clone()));
        }
        if stored.status != assignment.status
            && !stored.status.can_transition_to(assignment.status)
        {
            return Err(StoreError::InvalidTransition {
                from: format!("{:?}", stored.status),
                to: format!("{:?}", assignment.status),
            });
        }

        // Entering `reserved` is subject to the same capacity constraint
        // as creating a reserved row.
        if assignment.status == AssignmentStatus::Reserved
            && stored.status != AssignmentStatus::Reserved
        {
            if let Some(queue) = tables.queues.get(&assignment.queue_id) {
                let labeled = tables
                    .labels
                    .values()
                    .filter(|l| l.sample_id == assignment.sample_id && l.is_live())
                    .count() as u32;
                let reserved = tables
                    .assignments
                    .values()
                    .filter(|a| {
                        a.id != assignment.id
                            && a.sample_id == assignment.sample_id
                            && a.status == AssignmentStatus::Reserved
                    })
                    .count() as u32;
                if labeled + reserved >= queue.labels_per_sample {
                    return Err(StoreError::Conflict(format!(
                        "sample {} is fully reserved",
                        assignment.sample_id
                    )));
                }
            }
        }

        let mut updated = assignment;
        updated.version += 1;
        tables
            .assignments
            .insert(updated.id.clone(), updated.clone());
        Ok(updated)
    }

    async fn list_queue_assignments(
        &self,
        queue_id: &str,
        tenant_id: &str,
    ) -> StoreResult<Vec<Assignment>> {
        let tables = self.tables.read();
        scoped(tables.queues.get(queue_id), queue_id, tenant_id)?;
        let mut assignments: Vec<Assignment> = tables
            .assignments
            .values()
            .filter(|a| a.queue_id == queue_id && a.tenant_id == tenant_id)
            .cloned()
            .collect();
        assignments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(assignments)
    }

    async fn count_active_assignments(
        &self,
        labeler_id: &str,
        tenant_id: &str,
    ) -> StoreResult<u32> {
        let tables = self.tables.read();
        let count = tables
            .assignments
            .values()
            .filter(|a| {
                a.tenant_id == tenant_id
                    && a.status == AssignmentStatus::Reserved
                    && a.labeler_id.as_deref() == Some(labeler_id)
            })
            .count();
        Ok(count as u32)
    }

    async fn find_expired_assignments(&self, now: DateTime<Utc>) -> StoreResult<Vec<Assignment>> {
        let tables = self.tables.read();
        let mut expired: Vec<Assignment> = tables
            .assignments
            .values()
            .filter(|a| a.is_expired(now))
            .cloned()
            .collect();
        expired.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(expired)
    }

    // -- labels ----------------------------------------------------------

    async fn submit_label(&self, label: Label, assignment: Assignment) -> StoreResult<Label> {
        let mut tables = self.tables.write();

        // Phase 1: every check, no mutation.
        let stored = scoped(
            tables.assignments.get(&assignment.id),
            &assignment.id,
            &assignment.tenant_id,
        )?;
        if stored.version != assignment.version {
            return Err(StoreError::StaleVersion(assignment.id.clone()));
        }
        if stored.status != assignment.status
            && !stored.status.can_transition_to(assignment.status)
        {
            return Err(StoreError::InvalidTransition {
                from: format!("{:?}", stored.status),
                to: format!("{:?}", assignment.status),
            });
        }

        let key = (label.assignment_id.clone(), label.labeler_id.clone());
        if tables.label_keys.contains(&key) {
            return Err(StoreError::DuplicateLabel {
                assignment_id: key.0,
                labeler_id: key.1,
            });
        }

        scoped(
            tables.schema_versions.get(&label.schema_version_id),
            &label.schema_version_id,
            &label.tenant_id,
        )?;

        // Phase 2: apply.
        let mut updated = assignment;
        updated.version += 1;
        tables
            .assignments
            .insert(updated.id.clone(), updated.clone());

        if let Some(version) = tables.schema_versions.get_mut(&label.schema_version_id) {
            versioning::freeze_on_first_write(version, label.submitted_at);
            version.label_count += 1;
        }

        tables.label_keys.insert(key);
        tables.labels.insert(label.id.clone(), label.clone());
        Ok(label)
    }

    async fn get_label(&self, id: &str, tenant_id: &str) -> StoreResult<Label> {
        let tables = self.tables.read();
        scoped(tables.labels.get(id), id, tenant_id).map(Clone::clone)
    }

    async fn list_sample_labels(
        &self,
        sample_id: &str,
        tenant_id: &str,
    ) -> StoreResult<Vec<Label>> {
        let tables = self.tables.read();
        let mut labels: Vec<Label> = tables
            .labels
            .values()
            .filter(|l| l.sample_id == sample_id && l.tenant_id == tenant_id && l.is_live())
            .cloned()
            .collect();
        labels.sort_by(|a, b| label_sort_key(a).cmp(&label_sort_key(b)));
        Ok(labels)
    }

    async fn list_queue_labels(
        &self,
        queue_id: &str,
        tenant_id: &str,
        offset: usize,
        limit: usize,
    ) -> StoreResult<Vec<Label>> {
        let tables = self.tables.read();
        scoped(tables.queues.get(queue_id), queue_id, tenant_id)?;
        let mut labels: Vec<Label> = tables
            .labels
            .values()
            .filter(|l| l.queue_id == queue_id && l.tenant_id == tenant_id && l.is_live())
            .cloned()
            .collect();
        labels.sort_by(|a, b| label_sort_key(a).cmp(&label_sort_key(b)));
        Ok(labels.into_iter().skip(offset).take(limit).collect())
    }

    async fn list_version_labels(
        &self,
        schema_version_id: &str,
        tenant_id: &str,
        offset: usize,
        limit: usize,
    ) -> StoreResult<Vec<Label>> {
        let tables = self.tables.read();
        let mut labels: Vec<Label> = tables
            .labels
            .values()
            .filter(|l| {
                l.schema_version_id == schema_version_id
                    && l.tenant_id == tenant_id
                    && l.is_live()
            })
            .cloned()
            .collect();
        labels.sort_by(|a, b| {
            a.submitted_at
                .cmp(&b.submitted_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(labels.into_iter().skip(offset).take(limit).collect())
    }

    async fn rewrite_label_payload(
        &self,
        id: &str,
        tenant_id: &str,
        payload: JsonMap,
        schema_version_id: Option<String>,
    ) -> StoreResult<Label> {
        let mut tables = self.tables.write();
        let label = scoped(tables.labels.get(id), id, tenant_id)?.clone();

        if let Some(target_id) = &schema_version_id {
            scoped(tables.schema_versions.get(target_id), target_id, tenant_id)?;
        }

        let mut updated = label;
        updated.payload = payload;
        if let Some(target_id) = schema_version_id {
            if target_id != updated.schema_version_id {
                let previous_id = updated.schema_version_id.clone();
                if let Some(previous) = tables.schema_versions.get_mut(&previous_id) {
                    previous.label_count = previous.label_count.saturating_sub(1);
                }
                if let Some(target) = tables.schema_versions.get_mut(&target_id) {
                    versioning::freeze_on_first_write(target, updated.submitted_at);
                    target.label_count += 1;
                }
                updated.schema_version_id = target_id;
            }
        }

        tables.labels.insert(updated.id.clone(), updated.clone());
        Ok(updated)
    }

    async fn tombstone_label(
        &self,
        id: &str,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Label> {
        let mut tables = self.tables.write();
        let label = scoped(tables.labels.get(id), id, tenant_id)?.clone();
        let mut updated = label;
        updated.deleted_at = Some(now);
        tables.labels.insert(updated.id.clone(), updated.clone());
        Ok(updated)
    }

    async fn delete_label(&self, id: &str, tenant_id: &str) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let label = scoped(tables.labels.get(id), id, tenant_id)?.clone();
        tables
            .label_keys
            .remove(&(label.assignment_id.clone(), label.labeler_id.clone()));
        tables.labels.remove(id);
        Ok(())
    }

    async fn scan_labels(&self) -> StoreResult<Vec<Label>> {
        let tables = self.tables.read();
        let mut labels: Vec<Label> = tables.labels.values().cloned().collect();
        labels.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(labels)
    }

    async fn samples_with_min_labels(
        &self,
        min_labels: usize,
        queue_id: Option<&str>,
    ) -> StoreResult<Vec<String>> {
        let tables = self.tables.read();
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for label in tables.labels.values() {
            if !label.is_live() {
                continue;
            }
            if let Some(queue_id) = queue_id {
                if label.queue_id != queue_id {
                    continue;
                }
            }
            *counts.entry(label.sample_id.as_str()).or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .filter(|(_, count)| *count >= min_labels)
            .map(|(sample_id, _)| sample_id.to_string())
            .collect())
    }

    // -- audit -----------------------------------------------------------

    async fn append_audit(&self, record: AuditRecord) -> StoreResult<()> {
        self.tables.write().audit.push(record);
        Ok(())
    }

    async fn list_audit(&self, tenant_id: &str) -> StoreResult<Vec<AuditRecord>> {
        let tables = self.tables.read();
        Ok(tables
            .audit
            .iter()
            .filter(|r| r.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn delete_audit_older_than(&self, cutoff: DateTime<Utc>) -> StoreResult<usize> {
        let mut tables = self.tables.write();
        let before = tables.audit.len();
        tables.audit.retain(|r| r.occurred_at >= cutoff);
        Ok(before - tables.audit.len())
    }

    // -- datasets --------------------------------------------------------

    async fn put_dataset(&self, dataset: Dataset) -> StoreResult<Dataset> {
        let mut tables = self.tables.write();
        check_same_tenant(tables.datasets.get(&dataset.id), &dataset, &dataset.id)?;
        tables.datasets.insert(dataset.id.clone(), dataset.clone());
        Ok(dataset)
    }

    async fn get_dataset(&self, id: &str, tenant_id: &str) -> StoreResult<Dataset> {
        let tables = self.tables.read();
        scoped(tables.datasets.get(id), id, tenant_id).map(Clone::clone)
    }
}
