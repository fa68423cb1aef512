//! Append-only audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::JsonMap;

/// What happened to the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    Updated,
    Deleted,
    Accessed,
}

/// One audit trail entry. Records are appended and never edited; the
/// retention worker is the only thing that removes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub tenant_id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub action: AuditAction,
    /// Who did it (labeler id, worker name, or system).
    pub actor: String,
    #[serde(default)]
    pub metadata: JsonMap,
    pub occurred_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        tenant_id: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        action: AuditAction,
        actor: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: super::new_id(),
            tenant_id: tenant_id.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            action,
            actor: actor.into(),
            metadata: JsonMap::new(),
            occurred_at,
        }
    }

    pub fn with_metadata(mut self, metadata: JsonMap) -> Self {
        self.metadata = metadata;
        self
    }
}
