//! Export manifests.
//!
//! A manifest is the reproducibility record of one export: which queue
//! and schema version, which parameters, how many rows, and the SHA-256
//! of the artifact's bytes. It is written next to the artifact as
//! `<output>.manifest.json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ExportFormat, ExportResult};

/// Prefix of generated export ids.
pub const EXPORT_ID_PREFIX: &str = "exp_";

/// Reproducibility record for one export artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// `exp_<hex>`.
    pub export_id: String,
    pub queue_id: String,
    pub schema_version_id: String,
    /// Forge sample-version tag the export was pinned to, when given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_version: Option<String>,
    pub format: ExportFormat,
    pub output_path: String,
    pub row_count: u64,
    /// SHA-256 of the artifact's byte stream, lowercase hex.
    pub sha256_hash: String,
    pub exported_at: DateTime<Utc>,
    /// The invocation parameters, echoed verbatim.
    pub parameters: Value,
    /// Implementation version that produced the artifact.
    pub version: String,
    /// SHA-256 of the schema definition JSON, when computed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_definition_hash: Option<String>,
}

impl Manifest {
    /// Generate a fresh export id.
    pub fn new_export_id() -> String {
        format!("{EXPORT_ID_PREFIX}{}", uuid::Uuid::new_v4().simple())
    }

    /// Serialize to pretty JSON with the stable key set.
    pub fn to_json(&self) -> ExportResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a manifest; unknown `format` strings and unknown keys are
    /// rejected.
    pub fn from_json(json: &str) -> ExportResult<Manifest> {
        Ok(serde_json::from_str(json)?)
    }

    /// Path the manifest is saved at, next to the artifact.
    pub fn manifest_path(output_path: &str) -> String {
        format!("{output_path}.manifest.json")
    }
}
