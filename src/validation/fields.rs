//! Per-field payload validation.
//!
//! Validation materializes the dynamic JSON payload into typed
//! [`FieldValue`]s against the queue's schema version. Every field is
//! checked; the failure result carries one error per offending field
//! rather than stopping at the first.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::model::schema::{FieldDef, FieldType};
use crate::model::JsonMap;

/// Machine-readable validation failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationCode {
    IsRequired,
    InvalidType,
    OutOfRange,
    PatternMismatch,
    InvalidOptions,
    UnknownField,
}

/// One field's validation failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub code: ValidationCode,
    pub message: String,
}

impl FieldError {
    fn new(field: &str, code: ValidationCode, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            code,
            message: message.into(),
        }
    }
}

/// A payload value materialized against its field definition.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Select(String),
    Multiselect(Vec<String>),
    Range(i64),
    Number(f64),
    Boolean(bool),
    Date(NaiveDate),
    Datetime(DateTime<Utc>),
}

/// Validate `payload` against `definition`.
///
/// Returns the typed payload on success, or every per-field error on
/// failure. Absent optional fields with a declared default are validated
/// as if the default had been supplied; payload keys with no matching
/// field definition are rejected.
pub fn validate_payload(
    definition: &[FieldDef],
    payload: &JsonMap,
) -> Result<BTreeMap<String, FieldValue>, Vec<FieldError>> {
    let mut accepted = BTreeMap::new();
    let mut errors = Vec::new();

    for field in definition {
        let supplied = payload.get(&field.name);
        let value = match supplied {
            Some(v) if !v.is_null() => v,
            _ => {
                if let Some(default) = &field.default {
                    default
                } else {
                    if field.required {
                        errors.push(FieldError::new(
                            &field.name,
                            ValidationCode::IsRequired,
                            "is required",
                        ));
                    }
                    continue;
                }
            }
        };

        match validate_field(field, value) {
            Ok(typed) => {
                accepted.insert(field.name.clone(), typed);
            }
            Err(err) => errors.push(err),
        }
    }

    for key in payload.keys() {
        if !definition.iter().any(|f| &f.name == key) {
            errors.push(FieldError::new(
                key,
                ValidationCode::UnknownField,
                "is not a schema field",
            ));
        }
    }

    if errors.is_empty() {
        Ok(accepted)
    } else {
        Err(errors)
    }
}

fn validate_field(field: &FieldDef, value: &Value) -> Result<FieldValue, FieldError> {
    match field.field_type {
        FieldType::Text => validate_text(field, value),
        FieldType::Select => validate_select(field, value),
        FieldType::Multiselect => validate_multiselect(field, value),
        FieldType::Range => validate_range(field, value),
        FieldType::Number => validate_number(field, value),
        FieldType::Boolean => match value {
            Value::Bool(b) => Ok(FieldValue::Boolean(*b)),
            _ => Err(FieldError::new(
                &field.name,
                ValidationCode::InvalidType,
                "must be true or false",
            )),
        },
        FieldType::Date => validate_date(field, value),
        FieldType::Datetime => validate_datetime(field, value),
    }
}

fn validate_text(field: &FieldDef, value: &Value) -> Result<FieldValue, FieldError> {
    let text = value.as_str().ok_or_else(|| {
        FieldError::new(&field.name, ValidationCode::InvalidType, "must be a string")
    })?;

    if let Some(pattern) = &field.pattern {
        let regex = regex::Regex::new(pattern).map_err(|_| {
            FieldError::new(
                &field.name,
                ValidationCode::PatternMismatch,
                "field pattern is not a valid regex",
            )
        })?;
        if !regex.is_match(text) {
            return Err(FieldError::new(
                &field.name,
                ValidationCode::PatternMismatch,
                format!("does not match pattern {pattern}"),
            ));
        }
    }

    Ok(FieldValue::Text(text.to_string()))
}

fn validate_select(field: &FieldDef, value: &Value) -> Result<FieldValue, FieldError> {
    let choice = value.as_str().ok_or_else(|| {
        FieldError::new(&field.name, ValidationCode::InvalidType, "must be a string")
    })?;

    if let Some(options) = &field.options {
        if !options.iter().any(|o| o == choice) {
            return Err(FieldError::new(
                &field.name,
                ValidationCode::InvalidOptions,
                format!("\"{choice}\" is not one of the allowed options"),
            ));
        }
    }

    Ok(FieldValue::Select(choice.to_string()))
}

fn validate_multiselect(field: &FieldDef, value: &Value) -> Result<FieldValue, FieldError> {
    let items = value.as_array().ok_or_else(|| {
        FieldError::new(
            &field.name,
            ValidationCode::InvalidType,
            "must be a list of strings",
        )
    })?;

    let mut choices = Vec::with_capacity(items.len());
    for item in items {
        let choice = item.as_str().ok_or_else(|| {
            FieldError::new(
                &field.name,
                ValidationCode::InvalidType,
                "must be a list of strings",
            )
        })?;
        if let Some(options) = &field.options {
            if !options.iter().any(|o| o == choice) {
                return Err(FieldError::new(
                    &field.name,
                    ValidationCode::InvalidOptions,
                    format!("\"{choice}\" is not one of the allowed options"),
                ));
            }
        }
        choices.push(choice.to_string());
    }

    Ok(FieldValue::Multiselect(choices))
}

fn validate_range(field: &FieldDef, value: &Value) -> Result<FieldValue, FieldError> {
    let number = value.as_i64().ok_or_else(|| {
        FieldError::new(
            &field.name,
            ValidationCode::InvalidType,
            "must be an integer",
        )
    })?;

    check_bounds(field, number as f64)?;
    Ok(FieldValue::Range(number))
}

fn validate_number(field: &FieldDef, value: &Value) -> Result<FieldValue, FieldError> {
    let number = value.as_f64().ok_or_else(|| {
        FieldError::new(&field.name, ValidationCode::InvalidType, "must be a number")
    })?;

    check_bounds(field, number)?;
    Ok(FieldValue::Number(number))
}

fn check_bounds(field: &FieldDef, number: f64) -> Result<(), FieldError> {
    let below = field.min.map(|min| number < min).unwrap_or(false);
    let above = field.max.map(|max| number > max).unwrap_or(false);
    if below || above {
        let min = field.min.map_or("-inf".to_string(), |m| m.to_string());
        let max = field.max.map_or("inf".to_string(), |m| m.to_string());
        return Err(FieldError::new(
            &field.name,
            ValidationCode::OutOfRange,
            format!("must be between {min} and {max}"),
        ));
    }
    Ok(())
}

fn validate_date(field: &FieldDef, value: &Value) -> Result<FieldValue, FieldError> {
    let text = value.as_str().ok_or_else(|| {
        FieldError::new(
            &field.name,
            ValidationCode::InvalidType,
            "must be an ISO-8601 date string",
        )
    })?;

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map(FieldValue::Date)
        .map_err(|_| {
            FieldError::new(
                &field.name,
                ValidationCode::InvalidType,
                "must be an ISO-8601 date string",
            )
        })
}

fn validate_datetime(field: &FieldDef, value: &Value) -> Result<FieldValue, FieldError> {
    match value {
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .map(|dt| FieldValue::Datetime(dt.with_timezone(&Utc)))
            .map_err(|_| {
                FieldError::new(
                    &field.name,
                    ValidationCode::InvalidType,
                    "must be an ISO-8601 instant",
                )
            }),
        Value::Number(n) => n
            .as_i64()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .map(FieldValue::Datetime)
            .ok_or_else(|| {
                FieldError::new(
                    &field.name,
                    ValidationCode::InvalidType,
                    "must be an ISO-8601 instant",
                )
            }),
        _ => Err(FieldError::new(
            &field.name,
            ValidationCode::InvalidType,
            "must be an ISO-8601 instant",
        )),
    }
}
