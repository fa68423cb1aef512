//! Field-level redaction.
//!
//! Each schema field declares a PII level and optionally an explicit
//! redaction policy; when the policy is absent the PII level picks the
//! default. The export pipeline applies these per row.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::model::schema::{FieldDef, FieldMetadata, PiiLevel};
use crate::model::JsonMap;

/// Replacement text used by pattern redaction.
pub const REDACTED_MARKER: &str = "[REDACTED]";

/// Default maximum length for `truncate`.
pub const DEFAULT_TRUNCATE_LENGTH: usize = 100;

/// Built-in PII patterns: emails, SSNs, phone numbers, credit cards.
static DEFAULT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}",
        r"\b\d{3}-\d{2}-\d{4}\b",
        r"\+?\d{1,2}[\s.-]?\(?\d{3}\)?[\s.-]?\d{3}[\s.-]?\d{4}",
        r"\b(?:\d[ -]?){13,16}\b",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// How to rewrite a field value before it leaves the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RedactionPolicy {
    /// Identity.
    Preserve,
    /// Replace any value with null.
    Strip,
    /// Truncate strings to `max_length`; non-strings pass through.
    Truncate {
        #[serde(default = "default_truncate_length")]
        max_length: usize,
    },
    /// SHA-256 hex of the UTF-8 stringified value, optionally salted.
    Hash {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        salt: Option<String>,
    },
    /// Pattern-based redaction for strings; `None` uses the built-in set.
    RegexRedact {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        patterns: Option<Vec<String>>,
    },
}

fn default_truncate_length() -> usize {
    DEFAULT_TRUNCATE_LENGTH
}

impl RedactionPolicy {
    /// Default policy for a PII level.
    pub fn default_for(pii: PiiLevel) -> RedactionPolicy {
        match pii {
            PiiLevel::None => RedactionPolicy::Preserve,
            PiiLevel::Possible => RedactionPolicy::Truncate {
                max_length: DEFAULT_TRUNCATE_LENGTH,
            },
            PiiLevel::Likely | PiiLevel::Definite => RedactionPolicy::Strip,
        }
    }

    /// The policy a field's metadata resolves to.
    pub fn effective(metadata: &FieldMetadata) -> RedactionPolicy {
        metadata
            .redaction_policy
            .clone()
            .unwrap_or_else(|| RedactionPolicy::default_for(metadata.pii))
    }

    /// Apply this policy to one value.
    pub fn apply(&self, value: &Value) -> Value {
        match self {
            RedactionPolicy::Preserve => value.clone(),
            RedactionPolicy::Strip => Value::Null,
            RedactionPolicy::Truncate { max_length } => match value {
                Value::String(s) => {
                    Value::String(s.chars().take(*max_length).collect::<String>())
                }
                other => other.clone(),
            },
            RedactionPolicy::Hash { salt } => {
                let rendered = stringify(value);
                let mut hasher = Sha256::new();
                if let Some(salt) = salt {
                    hasher.update(salt.as_bytes());
                }
                hasher.update(rendered.as_bytes());
                Value::String(hex::encode(hasher.finalize()))
            }
            RedactionPolicy::RegexRedact { patterns } => match value {
                Value::String(s) => Value::String(redact_patterns(s, patterns.as_deref())),
                other => other.clone(),
            },
        }
    }
}

/// Export redaction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedactionMode {
    /// Raw payloads.
    #[default]
    None,
    /// Apply each field's declared policy.
    Automatic,
    /// Strip any field whose PII level is not `none`, regardless of its
    /// declared policy.
    Aggressive,
}

/// Redact a payload according to the schema definition and mode.
///
/// Payload keys without a schema field pass through unchanged; the
/// validator already rejects them at submission time.
pub fn redact_payload(definition: &[FieldDef], payload: &JsonMap, mode: RedactionMode) -> JsonMap {
    match mode {
        RedactionMode::None => payload.clone(),
        RedactionMode::Automatic => payload
            .iter()
            .map(|(key, value)| {
                let redacted = match definition.iter().find(|f| &f.name == key) {
                    Some(field) => RedactionPolicy::effective(&field.metadata).apply(value),
                    None => value.clone(),
                };
                (key.clone(), redacted)
            })
            .collect(),
        RedactionMode::Aggressive => payload
            .iter()
            .map(|(key, value)| {
                let redacted = match definition.iter().find(|f| &f.name == key) {
                    Some(field) if field.metadata.pii != PiiLevel::None => Value::Null,
                    Some(field) => RedactionPolicy::effective(&field.metadata).apply(value),
                    None => value.clone(),
                };
                (key.clone(), redacted)
            })
            .collect(),
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn redact_patterns(input: &str, patterns: Option<&[String]>) -> String {
    match patterns {
        None => {
            let mut out = input.to_string();
            for pattern in DEFAULT_PATTERNS.iter() {
                out = pattern.replace_all(&out, REDACTED_MARKER).into_owned();
            }
            out
        }
        Some(custom) => {
            let mut out = input.to_string();
            for raw in custom {
                match Regex::new(raw) {
                    Ok(pattern) => {
                        out = pattern.replace_all(&out, REDACTED_MARKER).into_owned();
                    }
                    Err(err) => {
                        tracing::warn!(pattern = %raw, %err, "skipping invalid redaction pattern");
                    }
                }
            }
            out
        }
    }
}
