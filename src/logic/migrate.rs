use crate::error::SchemaError;
use crate::logic::validate::{ValidationEngine, LARGE_SCHEMA_THRESHOLD};
use crate::logic::version_control::SchemaVersionControl;
use crate::model::{FieldSnapshot, FieldSpec, FieldType, Id, SqlDialect};
use crate::store::traits::Store;
use chrono::Utc;
use serde::Serialize;
use std::fmt;

/// Per-record cost coefficients for the coarse impact estimates.
const SECONDS_PER_RECORD: f64 = 0.001;
const MEGABYTES_PER_RECORD: f64 = 0.0001;

/// Non-null value count above which removing a field is rated critical.
const CRITICAL_VALUE_COUNT: u64 = 100;

/// Generated migration text plus the versions and dialect it targets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationScript {
    pub script: String,
    pub from_version: i32,
    pub to_version: i32,
    pub dialect: SqlDialect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdditionImpact {
    pub field_name: String,
    pub affected_records: u64,
    pub estimated_time_secs: f64,
    pub estimated_storage_mb: f64,
    pub risk: RiskLevel,
    pub requires_default: bool,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemovalImpact {
    pub field_name: String,
    pub value_count: u64,
    pub non_null_values: u64,
    pub risk: RiskLevel,
    pub soft_delete_recommended: bool,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeChangeImpact {
    pub field_name: String,
    pub from_type: FieldType,
    pub to_type: FieldType,
    pub compatible: bool,
    pub errors: Vec<String>,
    pub risk: RiskLevel,
    pub reversible: bool,
    pub recommendations: Vec<String>,
}

/// Emits SQL migration text from version diffs and live field metadata.
/// Read-only: the scripts are a produced value, never executed here.
pub struct MigrationGenerator;

impl MigrationGenerator {
    /// SQL statements moving a hypothetical flat table for this schema from
    /// one version's shape to another's.
    pub async fn generate_migration<S: Store>(
        store: &S,
        schema_id: &Id,
        from_version: i32,
        to_version: i32,
        dialect: SqlDialect,
    ) -> Result<MigrationScript, SchemaError> {
        let from = SchemaVersionControl::get_version(store, schema_id, from_version).await?;
        let to = SchemaVersionControl::get_version(store, schema_id, to_version).await?;
        let diff = crate::model::VersionDiff::between(&from.snapshot, &to.snapshot);
        let table = table_name(&to.snapshot.name);

        let mut lines = vec![
            format!(
                "-- Migration for schema '{}' ({})",
                to.snapshot.name, schema_id
            ),
            format!("-- From version {from_version} to version {to_version}"),
            format!("-- Dialect: {dialect}"),
            format!("-- Generated at {}", Utc::now().to_rfc3339()),
            format!(
                "-- Changes: {} added, {} modified, {} removed",
                diff.summary.additions, diff.summary.modifications, diff.summary.removals
            ),
            String::new(),
            "BEGIN TRANSACTION;".to_string(),
            String::new(),
        ];

        for name in &diff.added_fields {
            if let Some(field) = to.snapshot.field(name) {
                lines.push(add_column(&table, field, dialect));
            }
        }
        for name in diff.modified_fields.keys() {
            if let Some(field) = to.snapshot.field(name) {
                lines.extend(alter_column(&table, field, dialect));
            }
        }
        for name in &diff.removed_fields {
            lines.push(format!("ALTER TABLE {table} DROP COLUMN {name};"));
        }

        lines.push(String::new());
        lines.push("COMMIT;".to_string());

        Ok(MigrationScript {
            script: lines.join("\n"),
            from_version,
            to_version,
            dialect,
        })
    }

    /// The inverse migration: same diff walked in the opposite direction.
    pub async fn generate_rollback_script<S: Store>(
        store: &S,
        schema_id: &Id,
        from_version: i32,
        to_version: i32,
        dialect: SqlDialect,
    ) -> Result<MigrationScript, SchemaError> {
        Self::generate_migration(store, schema_id, to_version, from_version, dialect).await
    }

    /// Complete create-table statement for the schema's current active
    /// fields, plus an index on the record-linkage column.
    pub async fn generate_full_schema_ddl<S: Store>(
        store: &S,
        schema_id: &Id,
        dialect: SqlDialect,
    ) -> Result<String, SchemaError> {
        let schema = store
            .get_schema(schema_id)
            .await?
            .ok_or_else(|| SchemaError::not_found("schema", schema_id.clone()))?;
        let fields = store.list_fields(schema_id, false).await?;
        let table = table_name(&schema.name);

        let mut columns = vec![
            "    id TEXT PRIMARY KEY".to_string(),
            "    record_id TEXT NOT NULL".to_string(),
        ];
        for field in &fields {
            let mut column = format!(
                "    {} {}",
                field.name,
                dialect.sql_type(field.field_type)
            );
            if field.required {
                column.push_str(" NOT NULL");
            }
            columns.push(column);
        }
        columns.push(format!("    created_at {} NOT NULL", dialect.sql_type(FieldType::Date)));
        columns.push(format!("    updated_at {} NOT NULL", dialect.sql_type(FieldType::Date)));

        Ok(format!(
            "-- Schema '{}' version {} ({dialect})\nCREATE TABLE {table} (\n{}\n);\n\nCREATE INDEX idx_{table}_record_id ON {table} (record_id);",
            schema.name,
            schema.version,
            columns.join(",\n")
        ))
    }

    /// Commented data-migration template for a pending type change. The
    /// cast is left for an operator to review before running.
    pub async fn generate_data_migration<S: Store>(
        store: &S,
        schema_id: &Id,
        field_name: &str,
        new_type: FieldType,
        dialect: SqlDialect,
    ) -> Result<String, SchemaError> {
        let schema = store
            .get_schema(schema_id)
            .await?
            .ok_or_else(|| SchemaError::not_found("schema", schema_id.clone()))?;
        let field = store
            .get_active_field(schema_id, field_name)
            .await?
            .ok_or_else(|| SchemaError::not_found("field", field_name))?;
        let table = table_name(&schema.name);

        Ok(format!(
            "-- Data migration template: {field_name} {} -> {new_type}\n-- Review the cast before running; rows that cannot convert will fail.\n-- UPDATE {table} SET {field_name} = CAST({field_name} AS {});",
            field.field_type,
            dialect.sql_type(new_type)
        ))
    }
}

fn table_name(schema_name: &str) -> String {
    let sanitized: String = schema_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("metadata_record_{sanitized}")
}

fn add_column(table: &str, field: &FieldSnapshot, dialect: SqlDialect) -> String {
    let mut stmt = format!(
        "ALTER TABLE {table} ADD COLUMN {} {}",
        field.name,
        dialect.sql_type(field.field_type)
    );
    if field.required {
        if let Some(default) = &field.default {
            stmt.push_str(&format!(" NOT NULL DEFAULT '{default}'"));
        }
    }
    stmt.push(';');
    stmt
}

fn alter_column(table: &str, field: &FieldSnapshot, dialect: SqlDialect) -> Vec<String> {
    let sql_type = dialect.sql_type(field.field_type);
    match dialect {
        SqlDialect::Postgresql => {
            let mut stmts = vec![format!(
                "ALTER TABLE {table} ALTER COLUMN {} TYPE {sql_type} USING {}::{sql_type};",
                field.name, field.name
            )];
            if field.required {
                stmts.push(format!(
                    "ALTER TABLE {table} ALTER COLUMN {} SET NOT NULL;",
                    field.name
                ));
            } else {
                stmts.push(format!(
                    "ALTER TABLE {table} ALTER COLUMN {} DROP NOT NULL;",
                    field.name
                ));
            }
            stmts
        }
        SqlDialect::Mysql => {
            let nullability = if field.required { "NOT NULL" } else { "NULL" };
            vec![format!(
                "ALTER TABLE {table} MODIFY COLUMN {} {sql_type} {nullability};",
                field.name
            )]
        }
        SqlDialect::Sqlite => vec![format!(
            "-- SQLite cannot alter column {}; recreate the table to change its type to {sql_type}",
            field.name
        )],
    }
}

/// Pre-change risk reports, derived from live counts and the validation
/// engine's compatibility checks.
pub struct ImpactAnalyzer;

impl ImpactAnalyzer {
    pub async fn analyze_field_addition<S: Store>(
        store: &S,
        schema_id: &Id,
        spec: &FieldSpec,
    ) -> Result<AdditionImpact, SchemaError> {
        if store.get_schema(schema_id).await?.is_none() {
            return Err(SchemaError::not_found("schema", schema_id.clone()));
        }
        let affected_records = store.count_records(schema_id).await?;

        let mut recommendations = Vec::new();
        if spec.required && spec.default.is_none() {
            recommendations
                .push("provide a default value so existing records can be backfilled".to_string());
        }
        if affected_records > LARGE_SCHEMA_THRESHOLD {
            recommendations.push(format!(
                "{affected_records} records will be backfilled; schedule during low traffic"
            ));
        }

        Ok(AdditionImpact {
            field_name: spec.name.clone(),
            affected_records,
            estimated_time_secs: affected_records as f64 * SECONDS_PER_RECORD,
            estimated_storage_mb: affected_records as f64 * MEGABYTES_PER_RECORD,
            risk: if spec.required {
                RiskLevel::Medium
            } else {
                RiskLevel::Low
            },
            requires_default: spec.required,
            recommendations,
        })
    }

    pub async fn analyze_field_removal<S: Store>(
        store: &S,
        schema_id: &Id,
        field_name: &str,
    ) -> Result<RemovalImpact, SchemaError> {
        let field = store
            .get_active_field(schema_id, field_name)
            .await?
            .ok_or_else(|| SchemaError::not_found("field", field_name))?;
        let value_count = store.count_values_for_field(&field.id).await?;
        let non_null_values = store.count_non_null_values(&field.id).await?;

        let risk = if non_null_values > CRITICAL_VALUE_COUNT {
            RiskLevel::Critical
        } else if non_null_values > 0 {
            RiskLevel::High
        } else {
            RiskLevel::Low
        };

        let mut recommendations = Vec::new();
        if non_null_values > 0 {
            recommendations.push(format!(
                "{non_null_values} non-null value(s) would be lost; use a soft delete to keep them recoverable"
            ));
        }

        Ok(RemovalImpact {
            field_name: field.name,
            value_count,
            non_null_values,
            risk,
            soft_delete_recommended: non_null_values > 0,
            recommendations,
        })
    }

    pub async fn analyze_type_change<S: Store>(
        store: &S,
        schema_id: &Id,
        field_name: &str,
        new_type: FieldType,
    ) -> Result<TypeChangeImpact, SchemaError> {
        let field = store
            .get_active_field(schema_id, field_name)
            .await?
            .ok_or_else(|| SchemaError::not_found("field", field_name))?;

        let errors = ValidationEngine::validate_type_change(store, &field, new_type).await?;
        let compatible = errors.is_empty();
        let risk = if !compatible {
            RiskLevel::High
        } else if new_type == field.field_type {
            RiskLevel::Low
        } else {
            RiskLevel::Medium
        };
        // Everything converts back from text, so string targets are the one
        // reversible destination.
        let reversible = new_type == FieldType::String;

        let mut recommendations = Vec::new();
        if !compatible {
            recommendations.push("resolve the incompatible values before changing the type".to_string());
        }
        if compatible && !reversible && new_type != field.field_type {
            recommendations
                .push("conversion cannot be automatically reversed; snapshot the schema first".to_string());
        }

        Ok(TypeChangeImpact {
            field_name: field.name.clone(),
            from_type: field.field_type,
            to_type: new_type,
            compatible,
            errors,
            risk,
            reversible,
            recommendations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_are_sanitized() {
        assert_eq!(table_name("Product Catalog"), "metadata_record_product_catalog");
        assert_eq!(table_name("Photos"), "metadata_record_photos");
    }

    #[test]
    fn risk_levels_order() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::High < RiskLevel::Critical);
    }
}
