use crate::model::{
    FieldConstraints, FieldSpec, FieldType, SchemaDetails, SchemaField, TypedValue,
};
use crate::store::traits::Store;
use anyhow::Result;
use regex::Regex;
use serde_json::Value;

/// Values sampled per field when checking type-change compatibility.
pub const TYPE_CHANGE_SAMPLE_LIMIT: usize = 100;

/// Record count above which structural changes get a migration-cost warning.
pub const LARGE_SCHEMA_THRESHOLD: u64 = 100_000;

/// Constraint scan reports at most this many individual violations.
const CONSTRAINT_REPORT_LIMIT: usize = 5;

/// Outcome of a pre-flight check: hard errors plus advisory warnings.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// One rejected value in a candidate record payload.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ValueError {
    pub field: String,
    pub message: String,
}

/// Stateless validation rules. Reads existing data volume where a rule
/// depends on it, never writes.
pub struct ValidationEngine;

impl ValidationEngine {
    /// Validate a batch of field definitions. Returns every violation found,
    /// not just the first.
    pub fn validate_field_specs(specs: &[FieldSpec]) -> Vec<String> {
        let mut errors = Vec::new();
        let mut seen: Vec<&str> = Vec::new();

        for spec in specs {
            if !is_identifier(&spec.name) {
                errors.push(format!(
                    "field name '{}' is not a valid identifier (letters, digits, underscores; must not start with a digit)",
                    spec.name
                ));
            }
            if seen.contains(&spec.name.as_str()) {
                errors.push(format!("duplicate field name '{}'", spec.name));
            }
            seen.push(&spec.name);

            // A required field with no default cannot be applied against
            // existing records, so the combination is rejected up front.
            if spec.required && spec.default.is_none() {
                errors.push(format!(
                    "field '{}' is required but has no default value",
                    spec.name
                ));
            }

            if let Some(default) = &spec.default {
                let raw = Value::String(default.clone());
                if TypedValue::coerce(&raw, spec.field_type).is_err() {
                    errors.push(format!(
                        "default value '{}' for field '{}' is not a valid {}",
                        default, spec.name, spec.field_type
                    ));
                }
            }

            if let Some(constraints) = &spec.constraints {
                for problem in constraint_shape_errors(constraints, spec.field_type) {
                    errors.push(format!("field '{}': {}", spec.name, problem));
                }
            }
        }

        errors
    }

    /// Pre-flight check for adding one field to a schema that may already
    /// hold records.
    pub fn validate_add_field(spec: &FieldSpec, existing_record_count: u64) -> ValidationReport {
        let mut report = ValidationReport {
            errors: Self::validate_field_specs(std::slice::from_ref(spec)),
            warnings: Vec::new(),
        };

        if spec.required && spec.default.is_none() && existing_record_count > 0 {
            report.errors.push(format!(
                "cannot add required field '{}' without a default: {} existing record(s) would have no value",
                spec.name, existing_record_count
            ));
        }

        if existing_record_count > LARGE_SCHEMA_THRESHOLD {
            report.warnings.push(format!(
                "schema holds {} records; applying this change will backfill every one and may take a while",
                existing_record_count
            ));
        }

        report
    }

    /// Check whether a field's stored values survive a type change.
    ///
    /// Consults the compatibility table first, then samples up to
    /// `TYPE_CHANGE_SAMPLE_LIMIT` stored values and attempts the actual
    /// conversion. Any sample failure is extrapolated to the full population.
    pub async fn validate_type_change<S: Store>(
        store: &S,
        field: &SchemaField,
        new_type: FieldType,
    ) -> Result<Vec<String>> {
        if field.field_type == new_type {
            return Ok(Vec::new());
        }
        if !field.field_type.can_convert_to(new_type) {
            return Ok(vec![format!(
                "type change {} -> {} is not allowed for field '{}'",
                field.field_type, new_type, field.name
            )]);
        }

        let sample = store
            .list_values_for_field(&field.id, Some(TYPE_CHANGE_SAMPLE_LIMIT))
            .await?;
        let total = store.count_values_for_field(&field.id).await?;

        let mut incompatible = 0u64;
        for cell in &sample {
            let Some(value) = cell.get_value(field.field_type) else {
                continue;
            };
            if value.convert_to(new_type).is_err() {
                incompatible += 1;
            }
        }

        if incompatible == 0 {
            return Ok(Vec::new());
        }

        let sampled = sample.len() as u64;
        let estimated = if sampled > 0 && total > sampled {
            incompatible * total / sampled
        } else {
            incompatible
        };
        Ok(vec![format!(
            "{} of {} value(s) cannot be converted from {} to {} (estimated from a sample of {})",
            estimated, total, field.field_type, new_type, sampled
        )])
    }

    /// Shape-check new constraints, then scan every stored value for
    /// violations. Reports the first few offenders with their record ids.
    pub async fn validate_constraints<S: Store>(
        store: &S,
        field: &SchemaField,
        constraints: &FieldConstraints,
    ) -> Result<Vec<String>> {
        let mut errors: Vec<String> = constraint_shape_errors(constraints, field.field_type)
            .into_iter()
            .map(|p| format!("field '{}': {}", field.name, p))
            .collect();
        if !errors.is_empty() {
            return Ok(errors);
        }

        let values = store.list_values_for_field(&field.id, None).await?;
        let mut violations = 0usize;
        for cell in &values {
            let Some(value) = cell.get_value(field.field_type) else {
                continue;
            };
            if let Some(problem) = constraint_violation(constraints, &value) {
                violations += 1;
                if violations <= CONSTRAINT_REPORT_LIMIT {
                    errors.push(format!("record '{}': {}", cell.record_id, problem));
                }
            }
        }
        if violations > CONSTRAINT_REPORT_LIMIT {
            errors.push(format!(
                "and {} more violation(s)",
                violations - CONSTRAINT_REPORT_LIMIT
            ));
        }
        Ok(errors)
    }

    /// Pre-flight check for removing a field: never blocks, but warns when
    /// stored data would become unreachable.
    pub async fn validate_field_removal<S: Store>(
        store: &S,
        field: &SchemaField,
    ) -> Result<ValidationReport> {
        let mut report = ValidationReport::default();
        let non_null = store.count_non_null_values(&field.id).await?;
        if non_null > 0 {
            report.warnings.push(format!(
                "field '{}' holds {} non-null value(s); prefer a soft delete so they stay recoverable",
                field.name, non_null
            ));
        }
        if field.required {
            report.warnings.push(format!(
                "field '{}' is required; records validated against this schema will lose a mandatory attribute",
                field.name
            ));
        }
        Ok(report)
    }

    /// Validate a candidate record payload against a schema's active fields.
    pub fn validate_record_values(
        schema: &SchemaDetails,
        values: &serde_json::Map<String, Value>,
    ) -> Vec<ValueError> {
        let mut errors = Vec::new();

        for field in schema.fields.iter().filter(|f| f.is_active()) {
            let supplied = values.get(&field.name).filter(|v| !v.is_null());
            // A default does not excuse an absent required value: applying
            // defaults is the write path's job, validation reports the gap.
            if field.required && supplied.is_none() {
                errors.push(ValueError {
                    field: field.name.clone(),
                    message: "required field is missing".to_string(),
                });
            }
        }

        for (name, raw) in values {
            let Some(field) = schema.active_field(name) else {
                if !schema.schema.allow_additional_fields {
                    errors.push(ValueError {
                        field: name.clone(),
                        message: "schema does not allow additional fields".to_string(),
                    });
                }
                continue;
            };
            if raw.is_null() {
                continue;
            }
            let typed = match TypedValue::coerce(raw, field.field_type) {
                Ok(typed) => typed,
                Err(err) => {
                    errors.push(ValueError {
                        field: name.clone(),
                        message: err.to_string(),
                    });
                    continue;
                }
            };
            if let Some(constraints) = &field.constraints {
                if let Some(problem) = constraint_violation(constraints, &typed) {
                    errors.push(ValueError {
                        field: name.clone(),
                        message: problem,
                    });
                }
            }
        }

        errors
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Structural problems with a constraint definition, independent of data.
fn constraint_shape_errors(constraints: &FieldConstraints, field_type: FieldType) -> Vec<String> {
    let mut problems = Vec::new();

    if let (Some(min), Some(max)) = (constraints.min, constraints.max) {
        if min > max {
            problems.push(format!("constraint min ({min}) exceeds max ({max})"));
        }
    }
    if (constraints.min.is_some() || constraints.max.is_some()) && !field_type.is_numeric() {
        problems.push(format!(
            "min/max constraints do not apply to type {field_type}"
        ));
    }

    if let (Some(min), Some(max)) = (constraints.min_length, constraints.max_length) {
        if min > max {
            problems.push(format!(
                "constraint min_length ({min}) exceeds max_length ({max})"
            ));
        }
    }
    if (constraints.min_length.is_some() || constraints.max_length.is_some())
        && field_type != FieldType::String
    {
        problems.push(format!(
            "length constraints do not apply to type {field_type}"
        ));
    }

    if let Some(pattern) = &constraints.regex {
        if let Err(err) = Regex::new(pattern) {
            problems.push(format!("constraint regex does not compile: {err}"));
        }
    }

    if let Some(values) = &constraints.enum_values {
        if values.is_empty() {
            problems.push("constraint enum list is empty".to_string());
        }
    }

    problems
}

/// Check one typed value against a constraint set. `None` means it passes.
fn constraint_violation(constraints: &FieldConstraints, value: &TypedValue) -> Option<String> {
    if let Some(n) = numeric(value) {
        if let Some(min) = constraints.min {
            if n < min {
                return Some(format!("value {n} is below minimum {min}"));
            }
        }
        if let Some(max) = constraints.max {
            if n > max {
                return Some(format!("value {n} exceeds maximum {max}"));
            }
        }
    }

    if let TypedValue::String(s) = value {
        if let Some(min) = constraints.min_length {
            if s.chars().count() < min {
                return Some(format!("length {} is below minimum {min}", s.chars().count()));
            }
        }
        if let Some(max) = constraints.max_length {
            if s.chars().count() > max {
                return Some(format!("length {} exceeds maximum {max}", s.chars().count()));
            }
        }
        if let Some(pattern) = &constraints.regex {
            // Shape validation already confirmed the pattern compiles.
            if let Ok(re) = Regex::new(pattern) {
                if !re.is_match(s) {
                    return Some(format!("value '{s}' does not match pattern '{pattern}'"));
                }
            }
        }
    }

    if let Some(allowed) = &constraints.enum_values {
        if !allowed.contains(&value.as_json()) {
            return Some(format!(
                "value {} is not one of the allowed values",
                value.as_json()
            ));
        }
    }

    None
}

fn numeric(value: &TypedValue) -> Option<f64> {
    match value {
        TypedValue::Int(i) => Some(*i as f64),
        TypedValue::Float(f) => Some(*f),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{generate_id, FieldValue, Schema, SchemaField};
    use crate::store::memory::MemoryStore;
    use crate::store::traits::ValueStore;
    use chrono::Utc;
    use serde_json::json;

    fn spec(name: &str, ty: FieldType) -> FieldSpec {
        FieldSpec::new(name, ty)
    }

    #[test]
    fn rejects_bad_identifiers_and_duplicates() {
        let errors = ValidationEngine::validate_field_specs(&[
            spec("1starts_with_digit", FieldType::String),
            spec("has space", FieldType::String),
            spec("ok_name", FieldType::String),
            spec("ok_name", FieldType::Integer),
        ]);
        assert_eq!(errors.len(), 3);
        assert!(errors[0].contains("1starts_with_digit"));
        assert!(errors[1].contains("has space"));
        assert!(errors[2].contains("duplicate"));
    }

    #[test]
    fn required_without_default_always_fails() {
        let mut s = spec("title", FieldType::String);
        s.required = true;
        let errors = ValidationEngine::validate_field_specs(&[s]);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("no default"));

        let ok = spec("title", FieldType::String).required(Some("Untitled"));
        assert!(ValidationEngine::validate_field_specs(&[ok]).is_empty());
    }

    #[test]
    fn default_must_coerce_to_declared_type() {
        let bad = spec("count", FieldType::Integer).required(Some("not-a-number"));
        let errors = ValidationEngine::validate_field_specs(&[bad]);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("not a valid integer"));
    }

    #[test]
    fn constraint_shape_checks() {
        let mut c = FieldConstraints::default();
        c.min = Some(10.0);
        c.max = Some(1.0);
        let errors =
            ValidationEngine::validate_field_specs(&[spec("n", FieldType::Integer)
                .with_constraints(c)]);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("exceeds max"));

        let mut c = FieldConstraints::default();
        c.regex = Some("[unclosed".to_string());
        c.enum_values = Some(vec![]);
        let errors = ValidationEngine::validate_field_specs(&[spec("s", FieldType::String)
            .with_constraints(c)]);
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn add_field_report_flags_required_and_large_schemas() {
        let mut s = spec("flag", FieldType::Boolean);
        s.required = true;
        let report = ValidationEngine::validate_add_field(&s, 10);
        assert!(!report.is_ok());

        let s = spec("flag", FieldType::Boolean);
        let report = ValidationEngine::validate_add_field(&s, LARGE_SCHEMA_THRESHOLD + 1);
        assert!(report.is_ok());
        assert_eq!(report.warnings.len(), 1);
    }

    fn test_field(ty: FieldType) -> SchemaField {
        SchemaField::from_spec("schema-1".to_string(), &spec("price", ty), 0)
    }

    async fn store_value(store: &MemoryStore, field_id: &str, ty: FieldType, raw: Value) {
        let mut cell = FieldValue::new(generate_id(), field_id.to_string());
        cell.set_value(ty, Some(&raw)).unwrap();
        store.upsert_value(cell).await.unwrap();
    }

    #[tokio::test]
    async fn type_change_blocked_by_table() {
        let store = MemoryStore::new();
        let field = test_field(FieldType::Float);
        let errors = ValidationEngine::validate_type_change(&store, &field, FieldType::Boolean)
            .await
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("not allowed"));
    }

    #[tokio::test]
    async fn type_change_samples_stored_values() {
        let store = MemoryStore::new();
        let field = test_field(FieldType::String);
        store_value(&store, &field.id, FieldType::String, json!("42")).await;
        store_value(&store, &field.id, FieldType::String, json!("oops")).await;

        // string -> json is table-allowed and every value converts.
        let errors = ValidationEngine::validate_type_change(&store, &field, FieldType::Json)
            .await
            .unwrap();
        assert!(errors.is_empty());

        // Same declared type short-circuits.
        let errors = ValidationEngine::validate_type_change(&store, &field, FieldType::String)
            .await
            .unwrap();
        assert!(errors.is_empty());
    }

    #[tokio::test]
    async fn constraint_scan_reports_record_ids() {
        let store = MemoryStore::new();
        let field = test_field(FieldType::Integer);
        store_value(&store, &field.id, FieldType::Integer, json!(5)).await;
        store_value(&store, &field.id, FieldType::Integer, json!(500)).await;

        let mut constraints = FieldConstraints::default();
        constraints.max = Some(100.0);
        let errors = ValidationEngine::validate_constraints(&store, &field, &constraints)
            .await
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("exceeds maximum"));
        assert!(errors[0].starts_with("record '"));
    }

    fn details(fields: Vec<SchemaField>, allow_additional: bool) -> SchemaDetails {
        SchemaDetails {
            schema: Schema {
                id: "schema-1".to_string(),
                name: "Product".to_string(),
                version: 1,
                asset_type_id: "asset-1".to_string(),
                parent_schema_id: None,
                allow_additional_fields: allow_additional,
                is_active: true,
                created_by: "tester".to_string(),
                created_at: Utc::now(),
            },
            fields,
        }
    }

    #[test]
    fn record_values_flag_missing_required_and_unknown_keys() {
        let title = SchemaField::from_spec(
            "schema-1".to_string(),
            &spec("title", FieldType::String).required(Some("Untitled")),
            0,
        );
        let schema = details(vec![title], false);

        let mut payload = serde_json::Map::new();
        payload.insert("unknown".to_string(), json!("x"));
        let errors = ValidationEngine::validate_record_values(&schema, &payload);

        // Missing `title` is flagged even though it carries a default, plus
        // the unknown key.
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.field == "title"));
        assert!(errors.iter().any(|e| e.field == "unknown"));
    }

    #[test]
    fn required_field_with_default_is_still_missing() {
        let title = SchemaField::from_spec(
            "schema-1".to_string(),
            &spec("title", FieldType::String).required(Some("Untitled")),
            0,
        );
        let schema = details(vec![title], true);

        let errors = ValidationEngine::validate_record_values(&schema, &serde_json::Map::new());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "title");
        assert!(errors[0].message.contains("required field is missing"));

        // An explicit null is the same as absent.
        let mut payload = serde_json::Map::new();
        payload.insert("title".to_string(), Value::Null);
        let errors = ValidationEngine::validate_record_values(&schema, &payload);
        assert_eq!(errors.len(), 1);

        let mut payload = serde_json::Map::new();
        payload.insert("title".to_string(), json!("Catalog"));
        assert!(ValidationEngine::validate_record_values(&schema, &payload).is_empty());
    }

    #[test]
    fn record_values_check_coercion_and_constraints() {
        let mut constraints = FieldConstraints::default();
        constraints.min = Some(0.0);
        let price = SchemaField::from_spec(
            "schema-1".to_string(),
            &spec("price", FieldType::Float).with_constraints(constraints),
            0,
        );
        let schema = details(vec![price], true);

        let mut payload = serde_json::Map::new();
        payload.insert("price".to_string(), json!("cheap"));
        let errors = ValidationEngine::validate_record_values(&schema, &payload);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("cannot convert"));

        let mut payload = serde_json::Map::new();
        payload.insert("price".to_string(), json!(-1.5));
        let errors = ValidationEngine::validate_record_values(&schema, &payload);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("below minimum"));
    }
}
