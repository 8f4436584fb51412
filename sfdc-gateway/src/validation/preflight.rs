//! Preflight validator
//!
//! Runs entirely against the local metadata cache; the only remote knowledge
//! it cannot substitute for (referenced-id existence, validation-rule
//! formulas) becomes suggestions and warnings instead of errors.

use std::collections::HashMap;

use anyhow::Result;
use serde_json::Value;
use sqlx::SqlitePool;

use crate::metadata::models::{FieldMetadata, FieldType};
use crate::metadata::store;

use super::{IssueKind, ValidationIssue, ValidationResult};

/// Relationship fields the platform populates; never demanded from payloads.
const SYSTEM_RELATIONSHIP_FIELDS: &[&str] =
    &["OwnerId", "CreatedById", "LastModifiedById", "RecordTypeId"];

/// Max picklist values echoed in a suggestion.
const PICKLIST_SUGGESTION_LIMIT: usize = 10;

pub struct PreflightValidator {
    pool: SqlitePool,
}

impl PreflightValidator {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Validate a create payload: existence, createable, required fields,
    /// per-field checks, validation-rule awareness, relationships.
    pub async fn validate_create(&self, sobject: &str, data: &Value) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        let Some(meta) = store::get_sobject(&self.pool, sobject).await? else {
            result.add_error(ValidationIssue::new(
                IssueKind::MetadataNotFound,
                None,
                format!("no cached metadata for {sobject}"),
            ));
            return Ok(result);
        };
        if !meta.createable {
            result.add_error(ValidationIssue::new(
                IssueKind::CrudPermission,
                None,
                format!("{sobject} is not createable"),
            ));
            return Ok(result);
        }

        self.check_required_fields(sobject, data, &mut result).await?;
        self.check_fields(sobject, data, &mut result).await?;
        self.check_validation_rules(sobject, &mut result).await?;
        self.check_relationships(sobject, data, true, &mut result).await?;
        Ok(result)
    }

    /// Validate an update payload. Partial payloads are expected, so the
    /// required-field step is skipped.
    pub async fn validate_update(
        &self,
        sobject: &str,
        _record_id: &str,
        data: &Value,
    ) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        let Some(meta) = store::get_sobject(&self.pool, sobject).await? else {
            result.add_error(ValidationIssue::new(
                IssueKind::MetadataNotFound,
                None,
                format!("no cached metadata for {sobject}"),
            ));
            return Ok(result);
        };
        if !meta.updateable {
            result.add_error(ValidationIssue::new(
                IssueKind::CrudPermission,
                None,
                format!("{sobject} is not updateable"),
            ));
            return Ok(result);
        }

        self.check_fields(sobject, data, &mut result).await?;
        self.check_validation_rules(sobject, &mut result).await?;
        self.check_relationships(sobject, data, false, &mut result).await?;
        Ok(result)
    }

    async fn check_required_fields(
        &self,
        sobject: &str,
        data: &Value,
        result: &mut ValidationResult,
    ) -> Result<()> {
        for field in store::get_required_fields(&self.pool, sobject).await? {
            let value = data.get(&field.name);
            let missing = match value {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.is_empty(),
                Some(_) => false,
            };
            if missing {
                result.add_error(
                    ValidationIssue::new(
                        IssueKind::RequiredField,
                        Some(&field.name),
                        format!("required field {} is missing or empty", field.name),
                    )
                    .with_suggestion(format!("provide a value for \"{}\"", field.label)),
                );
            }
        }
        Ok(())
    }

    async fn check_fields(
        &self,
        sobject: &str,
        data: &Value,
        result: &mut ValidationResult,
    ) -> Result<()> {
        let fields: HashMap<String, FieldMetadata> = store::get_fields(&self.pool, sobject)
            .await?
            .into_iter()
            .map(|f| (f.name.clone(), f))
            .collect();

        let Some(payload) = data.as_object() else {
            return Ok(());
        };

        for (name, value) in payload {
            // Nulls are "clear this field", not a type violation.
            if value.is_null() {
                continue;
            }
            let Some(field) = fields.get(name) else {
                // The schema snapshot may simply not know this field yet.
                result.add_warning(ValidationIssue::new(
                    IssueKind::UnknownField,
                    Some(name),
                    format!("field {name} is not in cached metadata for {sobject}"),
                ));
                continue;
            };

            check_type(field, value, result);
            check_length(field, value, result);
            check_picklist(field, value, result);
            check_numeric_bounds(field, value, result);
        }
        Ok(())
    }

    async fn check_validation_rules(
        &self,
        sobject: &str,
        result: &mut ValidationResult,
    ) -> Result<()> {
        let rules = store::get_validation_rules(&self.pool, sobject).await?;
        if !rules.is_empty() {
            result.add_warning(
                ValidationIssue::new(
                    IssueKind::ValidationRulesExist,
                    None,
                    format!(
                        "{sobject} has {} active validation rule(s) that cannot be checked locally",
                        rules.len()
                    ),
                )
                .with_suggestion(
                    rules
                        .iter()
                        .map(|r| r.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                ),
            );
        }
        Ok(())
    }

    async fn check_relationships(
        &self,
        sobject: &str,
        data: &Value,
        is_create: bool,
        result: &mut ValidationResult,
    ) -> Result<()> {
        for rel in store::get_relationships(&self.pool, sobject).await? {
            if SYSTEM_RELATIONSHIP_FIELDS.contains(&rel.field.as_str()) {
                continue;
            }
            let present = data
                .get(&rel.field)
                .is_some_and(|v| !v.is_null() && v.as_str().is_none_or(|s| !s.is_empty()));
            if present {
                // Existence of the referenced record needs a round trip;
                // deferred to duplicate matching / execution time.
                result.add_suggestion(ValidationIssue::new(
                    IssueKind::ReferenceCheck,
                    Some(&rel.field),
                    format!(
                        "verify the {} id in {} actually exists",
                        rel.to_sobject, rel.field
                    ),
                ));
            } else if rel.required && is_create {
                result.add_error(
                    ValidationIssue::new(
                        IssueKind::RequiredRelationship,
                        Some(&rel.field),
                        format!("required relationship field {} is missing", rel.field),
                    )
                    .with_suggestion(format!("supply the id of the parent {}", rel.to_sobject)),
                );
            }
        }
        Ok(())
    }
}

fn check_type(field: &FieldMetadata, value: &Value, result: &mut ValidationResult) {
    let (ok, expected) = match &field.field_type {
        t if t.is_string_like() => (value.is_string(), "a string"),
        t if t.is_numeric() => (value.is_number(), "a number"),
        FieldType::Boolean => (value.is_boolean(), "a boolean"),
        _ => return,
    };
    if !ok {
        result.add_error(
            ValidationIssue::new(
                IssueKind::TypeMismatch,
                Some(&field.name),
                format!(
                    "{} expects {expected} ({}), got {value}",
                    field.name,
                    field.field_type.api_name()
                ),
            )
            .with_suggestion(format!("convert the value to {expected}")),
        );
    }
}

fn check_length(field: &FieldMetadata, value: &Value, result: &mut ValidationResult) {
    let (Some(max), Some(s)) = (field.length, value.as_str()) else {
        return;
    };
    if max > 0 && s.chars().count() as i64 > max {
        result.add_error(
            ValidationIssue::new(
                IssueKind::LengthExceeded,
                Some(&field.name),
                format!(
                    "{} is {} characters, exceeding the maximum of {max}",
                    field.name,
                    s.chars().count()
                ),
            )
            .with_suggestion(format!("shorten the value to {max} characters")),
        );
    }
}

fn check_picklist(field: &FieldMetadata, value: &Value, result: &mut ValidationResult) {
    if !matches!(field.field_type, FieldType::Picklist | FieldType::MultiPicklist)
        || field.picklist_values.is_empty()
    {
        return;
    }
    let Some(s) = value.as_str() else {
        return;
    };
    // Multipicklist values are semicolon-joined.
    let entries: Vec<&str> = if field.field_type == FieldType::MultiPicklist {
        s.split(';').map(str::trim).collect()
    } else {
        vec![s]
    };
    for entry in entries {
        if field.picklist_values.iter().any(|p| p.value == entry) {
            continue;
        }
        let valid: Vec<&str> = field
            .picklist_values
            .iter()
            .take(PICKLIST_SUGGESTION_LIMIT)
            .map(|p| p.value.as_str())
            .collect();
        result.add_error(
            ValidationIssue::new(
                IssueKind::InvalidPicklistValue,
                Some(&field.name),
                format!("\"{entry}\" is not a valid value for {}", field.name),
            )
            .with_suggestion(format!("valid values include: {}", valid.join(", "))),
        );
    }
}

fn check_numeric_bounds(field: &FieldMetadata, value: &Value, result: &mut ValidationResult) {
    if !field.field_type.is_numeric() {
        return;
    }
    let Some(n) = value.as_f64() else {
        return;
    };
    // Digit counts from the canonical decimal rendering.
    let rendered = format!("{}", n.abs());
    let (int_part, frac_part) = match rendered.split_once('.') {
        Some((i, f)) => (i, f),
        None => (rendered.as_str(), ""),
    };
    let int_digits = int_part.trim_start_matches('0').len();
    let scale_digits = frac_part.len();
    let total_digits = int_digits + scale_digits;

    if let Some(precision) = field.precision {
        if precision > 0 && total_digits as i64 > precision {
            result.add_warning(
                ValidationIssue::new(
                    IssueKind::PrecisionWarning,
                    Some(&field.name),
                    format!(
                        "{} has {total_digits} significant digits, more than the declared {precision}",
                        field.name
                    ),
                )
                .with_suggestion("the remote service may round or reject the value".to_string()),
            );
        }
    }
    if let Some(scale) = field.scale {
        if scale_digits as i64 > scale {
            result.add_warning(
                ValidationIssue::new(
                    IssueKind::ScaleWarning,
                    Some(&field.name),
                    format!(
                        "{} has {scale_digits} decimal places, more than the declared {scale}",
                        field.name
                    ),
                )
                .with_suggestion(format!("round to {scale} decimal places")),
            );
        }
    }
}

/// Human-readable banner + enumerated findings, for user-facing messages.
/// Programmatic callers branch on the structured result instead.
pub fn render_summary(result: &ValidationResult) -> String {
    let mut out = String::new();
    if result.valid() {
        out.push_str("✓ Validation passed");
    } else {
        out.push_str(&format!("✗ Validation failed ({} error(s))", result.errors.len()));
    }
    for (heading, issues) in [
        ("Errors", &result.errors),
        ("Warnings", &result.warnings),
        ("Suggestions", &result.suggestions),
    ] {
        if issues.is_empty() {
            continue;
        }
        out.push_str(&format!("\n{heading}:"));
        for (i, issue) in issues.iter().enumerate() {
            out.push_str(&format!("\n  {}. {}", i + 1, issue.message));
            if let Some(hint) = &issue.suggestion {
                out.push_str(&format!(" (hint: {hint})"));
            }
        }
    }
    out
}
