//! Streaming export pipeline.
//!
//! Labels are pulled from the store in bounded batches, already sorted by
//! `(sample_id, labeler_id, submitted_at)`, and streamed to a temp file
//! that is atomically renamed on completion. The SHA-256 in the manifest
//! is computed by re-reading the final artifact, so it attests to the
//! bytes a consumer will actually see.

use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::manifest::Manifest;
use super::writer::{CsvWriter, ExportRow, JsonlWriter, RowWriter};
use super::{ExportError, ExportFormat, ExportResult};
use crate::core::Clock;
use crate::model::{Label, SchemaVersion};
use crate::privacy::redaction::{redact_payload, RedactionMode};
use crate::store::Store;

/// Rows pulled from the store per batch.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Export invocation parameters.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub output_path: PathBuf,
    pub format: ExportFormat,
    /// Override the queue's schema version.
    pub schema_version_id: Option<String>,
    /// Forge sample-version tag recorded in the manifest.
    pub sample_version: Option<String>,
    pub limit: Option<usize>,
    pub offset: usize,
    /// Restrict the export to these sample ids.
    pub sample_filter: Option<Vec<String>>,
    pub redaction_mode: RedactionMode,
    pub use_pseudonyms: bool,
    /// Include the `labeling_time_seconds, created_at, valid` CSV columns.
    pub include_metadata: bool,
    pub batch_size: usize,
}

impl ExportOptions {
    pub fn new(output_path: impl Into<PathBuf>, format: ExportFormat) -> Self {
        Self {
            output_path: output_path.into(),
            format,
            schema_version_id: None,
            sample_version: None,
            limit: None,
            offset: 0,
            sample_filter: None,
            redaction_mode: RedactionMode::None,
            use_pseudonyms: false,
            include_metadata: false,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_redaction(mut self, mode: RedactionMode) -> Self {
        self.redaction_mode = mode;
        self
    }

    pub fn with_pseudonyms(mut self) -> Self {
        self.use_pseudonyms = true;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn parameters_json(&self) -> serde_json::Value {
        json!({
            "schema_version_id": self.schema_version_id,
            "sample_version": self.sample_version,
            "limit": self.limit,
            "offset": self.offset,
            "sample_filter": self.sample_filter,
            "redaction_mode": self.redaction_mode,
            "use_pseudonyms": self.use_pseudonyms,
            "include_metadata": self.include_metadata,
        })
    }
}

/// Drives exports against a store.
pub struct Exporter {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl Exporter {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Export a queue's labels and write the artifact plus its manifest.
    pub async fn export(
        &self,
        queue_id: &str,
        tenant_id: &str,
        options: &ExportOptions,
    ) -> ExportResult<Manifest> {
        let queue = self.store.get_queue(queue_id, tenant_id).await?;
        let version_id = options
            .schema_version_id
            .clone()
            .unwrap_or_else(|| queue.schema_version_id.clone());
        let version = self.store.get_schema_version(&version_id, tenant_id).await?;

        let pseudonyms = if options.use_pseudonyms {
            Some(self.pseudonym_map(tenant_id).await?)
        } else {
            None
        };

        let temp_path = temp_path_for(&options.output_path);
        if let Some(parent) = options.output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let row_count = match self
            .stream_rows(queue_id, tenant_id, &version, pseudonyms.as_ref(), options, &temp_path)
            .await
        {
            Ok(count) => count,
            Err(err) => {
                // Leave nothing behind on failure.
                let _ = fs::remove_file(&temp_path);
                return Err(err);
            }
        };

        fs::rename(&temp_path, &options.output_path)?;

        let sha256_hash = match hash_file(&options.output_path) {
            Ok(hash) => hash,
            Err(err) => {
                let _ = fs::remove_file(&options.output_path);
                return Err(err.into());
            }
        };

        let manifest = Manifest {
            export_id: Manifest::new_export_id(),
            queue_id: queue_id.to_string(),
            schema_version_id: version_id,
            sample_version: options.sample_version.clone(),
            format: options.format,
            output_path: options.output_path.display().to_string(),
            row_count,
            sha256_hash,
            exported_at: self.clock.now(),
            parameters: options.parameters_json(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            schema_definition_hash: schema_definition_hash(&version),
        };

        let manifest_path = Manifest::manifest_path(&manifest.output_path);
        if let Err(err) = fs::write(&manifest_path, manifest.to_json()?) {
            let _ = fs::remove_file(&options.output_path);
            return Err(err.into());
        }

        tracing::info!(
            queue_id,
            export_id = %manifest.export_id,
            rows = row_count,
            output = %manifest.output_path,
            "export completed"
        );
        Ok(manifest)
    }

    async fn pseudonym_map(&self, tenant_id: &str) -> ExportResult<HashMap<String, String>> {
        let labelers = self.store.list_labelers(tenant_id).await?;
        labelers
            .into_iter()
            .map(|labeler| {
                labeler
                    .pseudonym
                    .clone()
                    .map(|p| (labeler.id.clone(), p))
                    .ok_or(ExportError::MissingPseudonym(labeler.id))
            })
            .collect()
    }

    async fn stream_rows(
        &self,
        queue_id: &str,
        tenant_id: &str,
        version: &SchemaVersion,
        pseudonyms: Option<&HashMap<String, String>>,
        options: &ExportOptions,
        temp_path: &Path,
    ) -> ExportResult<u64> {
        let mut writer: Box<dyn RowWriter> = match options.format {
            ExportFormat::Jsonl => Box::new(JsonlWriter::new()),
            ExportFormat::Csv => Box::new(CsvWriter::new(
                version.definition.iter().map(|f| f.name.clone()).collect(),
                options.include_metadata,
            )),
        };

        let file = File::create(temp_path)?;
        let mut out = BufWriter::new(file);
        writer.write_header(&mut out)?;

        let batch_size = options.batch_size.max(1);
        let mut cursor = options.offset;
        let mut remaining = options.limit.unwrap_or(usize::MAX);
        let mut row_count = 0u64;

        loop {
            if remaining == 0 {
                break;
            }
            let want = batch_size.min(remaining);
            let batch = self
                .store
                .list_queue_labels(queue_id, tenant_id, cursor, want)
                .await?;
            let fetched = batch.len();
            cursor += fetched;

            for label in &batch {
                if let Some(filter) = &options.sample_filter {
                    if !filter.iter().any(|s| s == &label.sample_id) {
                        continue;
                    }
                }
                let row = self.build_row(label, version, pseudonyms, options)?;
                writer.write_row(&mut out, &row)?;
                row_count += 1;
            }

            remaining = remaining.saturating_sub(fetched);
            if fetched < want {
                break;
            }
        }

        out.flush()?;
        Ok(row_count)
    }

    fn build_row(
        &self,
        label: &Label,
        version: &SchemaVersion,
        pseudonyms: Option<&HashMap<String, String>>,
        options: &ExportOptions,
    ) -> ExportResult<ExportRow> {
        let payload = redact_payload(&version.definition, &label.payload, options.redaction_mode);
        let labeler_id = match pseudonyms {
            Some(map) => map
                .get(&label.labeler_id)
                .cloned()
                .ok_or_else(|| ExportError::MissingPseudonym(label.labeler_id.clone()))?,
            None => label.labeler_id.clone(),
        };
        Ok(ExportRow {
            sample_id: label.sample_id.clone(),
            labeler_id,
            payload,
            submitted_at: label.submitted_at,
            labeling_time_seconds: label.labeling_time_seconds,
            created_at: label.created_at,
            valid: true,
        })
    }
}

/// SHA-256 of the schema definition JSON, recorded so consumers can
/// detect definition drift between exports of the same version id.
fn schema_definition_hash(version: &SchemaVersion) -> Option<String> {
    serde_json::to_vec(&version.definition)
        .ok()
        .map(|bytes| hex::encode(Sha256::digest(bytes)))
}

fn temp_path_for(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "export".to_string());
    name.push_str(".tmp");
    output.with_file_name(name)
}

/// Stream the file through SHA-256.
fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}
