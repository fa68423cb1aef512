//! Row writers for the export formats.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};
use std::io::{self, Write};

use crate::model::JsonMap;

/// One export row after redaction and pseudonymization.
#[derive(Debug, Clone)]
pub struct ExportRow {
    pub sample_id: String,
    pub labeler_id: String,
    pub payload: JsonMap,
    pub submitted_at: DateTime<Utc>,
    pub labeling_time_seconds: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub valid: bool,
}

/// Streaming writer for one export format.
pub trait RowWriter {
    /// Write the header, if the format has one.
    fn write_header(&mut self, out: &mut dyn Write) -> io::Result<()>;

    /// Write one row, newline-terminated.
    fn write_row(&mut self, out: &mut dyn Write, row: &ExportRow) -> io::Result<()>;
}

/// JSONL: one object per line, no trailing blank line.
#[derive(Debug, Default)]
pub struct JsonlWriter;

impl JsonlWriter {
    pub fn new() -> Self {
        Self
    }
}

impl RowWriter for JsonlWriter {
    fn write_header(&mut self, _out: &mut dyn Write) -> io::Result<()> {
        Ok(())
    }

    fn write_row(&mut self, out: &mut dyn Write, row: &ExportRow) -> io::Result<()> {
        let line = json!({
            "sample_id": row.sample_id,
            "labeler_id": row.labeler_id,
            "payload": Value::Object(row.payload.clone()),
            "submitted_at": row.submitted_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        });
        writeln!(out, "{line}")
    }
}

/// CSV with RFC 4180 quoting.
///
/// Columns: `sample_id, labeler_id, <payload fields sorted by name>` and,
/// when metadata is included, `labeling_time_seconds, created_at, valid`.
#[derive(Debug)]
pub struct CsvWriter {
    payload_fields: Vec<String>,
    include_metadata: bool,
}

impl CsvWriter {
    pub fn new(mut payload_fields: Vec<String>, include_metadata: bool) -> Self {
        payload_fields.sort();
        Self {
            payload_fields,
            include_metadata,
        }
    }

    fn render_cell(value: Option<&Value>) -> String {
        match value {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}

impl RowWriter for CsvWriter {
    fn write_header(&mut self, out: &mut dyn Write) -> io::Result<()> {
        let mut columns = vec!["sample_id".to_string(), "labeler_id".to_string()];
        columns.extend(self.payload_fields.iter().cloned());
        if self.include_metadata {
            columns.extend([
                "labeling_time_seconds".to_string(),
                "created_at".to_string(),
                "valid".to_string(),
            ]);
        }
        writeln!(out, "{}", columns.iter().map(|c| escape(c)).collect::<Vec<_>>().join(","))
    }

    fn write_row(&mut self, out: &mut dyn Write, row: &ExportRow) -> io::Result<()> {
        let mut cells = vec![escape(&row.sample_id), escape(&row.labeler_id)];
        for field in &self.payload_fields {
            cells.push(escape(&Self::render_cell(row.payload.get(field))));
        }
        if self.include_metadata {
            cells.push(
                row.labeling_time_seconds
                    .map(|secs| secs.to_string())
                    .unwrap_or_default(),
            );
            cells.push(escape(
                &row.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            ));
            cells.push(row.valid.to_string());
        }
        writeln!(out, "{}", cells.join(","))
    }
}

/// RFC 4180: values containing a comma, quote, or newline are wrapped in
/// quotes with inner quotes doubled.
fn escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(sample: &str, labeler: &str, entries: &[(&str, Value)]) -> ExportRow {
        let mut payload = JsonMap::new();
        for (k, v) in entries {
            payload.insert(k.to_string(), v.clone());
        }
        ExportRow {
            sample_id: sample.into(),
            labeler_id: labeler.into(),
            payload,
            submitted_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
            labeling_time_seconds: Some(12.5),
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
            valid: true,
        }
    }

    #[test]
    fn jsonl_lines_carry_the_contract_fields() {
        let mut out = Vec::new();
        let mut writer = JsonlWriter::new();
        writer
            .write_row(&mut out, &row("s-1", "l-1", &[("sentiment", json!("positive"))]))
            .unwrap();

        let line = String::from_utf8(out).unwrap();
        assert!(line.ends_with('\n'));
        let parsed: Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(parsed["sample_id"], "s-1");
        assert_eq!(parsed["labeler_id"], "l-1");
        assert_eq!(parsed["payload"]["sentiment"], "positive");
        assert_eq!(parsed["submitted_at"], "2024-03-01T09:30:00Z");
    }

    #[test]
    fn csv_header_sorts_payload_fields() {
        let mut out = Vec::new();
        let mut writer = CsvWriter::new(vec!["zeta".into(), "alpha".into()], true);
        writer.write_header(&mut out).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "sample_id,labeler_id,alpha,zeta,labeling_time_seconds,created_at,valid\n"
        );
    }

    #[test]
    fn csv_quotes_separators_and_doubles_quotes() {
        let mut out = Vec::new();
        let mut writer = CsvWriter::new(vec!["comment".into()], false);
        writer
            .write_row(
                &mut out,
                &row("s-1", "l-1", &[("comment", json!("said \"hi, there\"\nbye"))]),
            )
            .unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "s-1,l-1,\"said \"\"hi, there\"\"\nbye\"\n"
        );
    }

    #[test]
    fn csv_renders_missing_and_null_as_empty() {
        let mut out = Vec::new();
        let mut writer = CsvWriter::new(vec!["a".into(), "b".into()], false);
        writer
            .write_row(&mut out, &row("s-1", "l-1", &[("a", Value::Null)]))
            .unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "s-1,l-1,,\n");
    }
}
