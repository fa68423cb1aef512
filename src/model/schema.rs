//! Label schemas and their immutable-once-used versions.
//!
//! A schema is an ordered list of typed fields. Queues reference a
//! [`SchemaVersion`], which stays mutable only until the first label is
//! written against it; from then on it is frozen forever and migrations
//! are the only way forward.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::JsonMap;
use crate::privacy::redaction::RedactionPolicy;

/// Field value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Select,
    Multiselect,
    Range,
    Number,
    Boolean,
    Date,
    Datetime,
}

/// How likely a field is to contain personally identifying information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiLevel {
    #[default]
    None,
    Possible,
    Likely,
    Definite,
}

/// Free-form per-field metadata; the PII level and retention window drive
/// the redaction and retention subsystems.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldMetadata {
    /// PII classification, `none` when unset.
    #[serde(default)]
    pub pii: PiiLevel,

    /// Retention window in days; `None` means indefinite.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_days: Option<u32>,

    /// Explicit redaction policy; when absent the PII level picks the
    /// default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redaction_policy: Option<RedactionPolicy>,

    /// Anything else the caller wants to carry along.
    #[serde(flatten)]
    pub extra: JsonMap,
}

/// One field of a label schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name; payload keys match against this.
    pub name: String,

    /// Value type.
    #[serde(rename = "type")]
    pub field_type: FieldType,

    /// Whether a payload must provide this field.
    #[serde(default)]
    pub required: bool,

    /// Lower bound for `range`/`number` fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    /// Upper bound for `range`/`number` fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    /// Allowed values for `select`/`multiselect` fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,

    /// Regex a `text` value must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    /// Value used when an optional field is absent from a payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// PII / retention / redaction metadata.
    #[serde(default)]
    pub metadata: FieldMetadata,
}

impl FieldDef {
    /// Minimal field of the given type.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            min: None,
            max: None,
            options: None,
            pattern: None,
            default: None,
            metadata: FieldMetadata::default(),
        }
    }

    /// Mark the field required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set numeric bounds.
    pub fn with_bounds(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// Set the allowed-values list.
    pub fn with_options(mut self, options: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.options = Some(options.into_iter().map(Into::into).collect());
        self
    }

    /// Set the text pattern.
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// Set field metadata.
    pub fn with_metadata(mut self, metadata: FieldMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A named, tenant-scoped label schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    /// Ordered field list.
    pub fields: Vec<FieldDef>,
    pub created_at: DateTime<Utc>,
}

impl Schema {
    pub fn new(
        tenant_id: impl Into<String>,
        name: impl Into<String>,
        fields: Vec<FieldDef>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: super::new_id(),
            tenant_id: tenant_id.into(),
            name: name.into(),
            fields,
            created_at,
        }
    }

    /// Look up a field definition by name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A concrete, versioned snapshot of a schema bound to a queue.
///
/// Mutable only while `frozen_at` is unset and no label has been written
/// against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaVersion {
    pub id: String,
    pub queue_id: String,
    pub tenant_id: String,
    /// Monotonically increasing, starts at 1.
    pub version_number: u32,
    /// The field definitions this version validates against.
    pub definition: Vec<FieldDef>,
    /// Name of the registered transform from the previous version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform_from_previous: Option<String>,
    /// Set the first time the version is frozen; never cleared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frozen_at: Option<DateTime<Utc>>,
    /// Number of labels written against this version.
    #[serde(default)]
    pub label_count: u64,
}

impl SchemaVersion {
    pub fn new(
        queue_id: impl Into<String>,
        tenant_id: impl Into<String>,
        version_number: u32,
        definition: Vec<FieldDef>,
    ) -> Self {
        Self {
            id: super::new_id(),
            queue_id: queue_id.into(),
            tenant_id: tenant_id.into(),
            version_number,
            definition,
            transform_from_previous: None,
            frozen_at: None,
            label_count: 0,
        }
    }

    /// A version may be edited only before it is frozen and before any
    /// label references it.
    pub fn is_mutable(&self) -> bool {
        self.frozen_at.is_none() && self.label_count == 0
    }

    /// Look up a field definition by name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.definition.iter().find(|f| f.name == name)
    }
}
