//! Export pipeline.
//!
//! Streams a queue's labels to disk in a deterministic order, writes the
//! artifact atomically (temp file + rename), hashes the final bytes, and
//! records everything needed to reproduce the export in a manifest saved
//! next to the output.

pub mod manifest;
pub mod pipeline;
pub mod writer;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoreError;

pub use manifest::Manifest;
pub use pipeline::{ExportOptions, Exporter};
pub use writer::{CsvWriter, ExportRow, JsonlWriter, RowWriter};

/// Supported artifact formats. `Manifest::from_json` rejects anything
/// else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Jsonl,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Jsonl => "jsonl",
            ExportFormat::Csv => "csv",
        }
    }
}

/// Export errors.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("io error during export: {0}")]
    Io(#[from] std::io::Error),

    #[error("manifest serialization failed: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("pseudonym missing for labeler {0}")]
    MissingPseudonym(String),
}

pub type ExportResult<T> = Result<T, ExportError>;
