use crate::model::{
    generate_id, FieldConstraints, FieldType, Id, Schema, SchemaField,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Frozen copy of one field definition inside a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSnapshot {
    pub id: Id,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraints: Option<FieldConstraints>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub order: i32,
    pub deleted: bool,
}

impl From<&SchemaField> for FieldSnapshot {
    fn from(field: &SchemaField) -> Self {
        Self {
            id: field.id.clone(),
            name: field.name.clone(),
            field_type: field.field_type,
            required: field.required,
            default: field.default_value.clone(),
            constraints: field.constraints.clone(),
            description: field.description.clone(),
            order: field.order_index,
            deleted: field.state.is_deleted(),
        }
    }
}

/// Immutable, point-in-time full copy of a schema's field set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub schema_id: Id,
    pub name: String,
    pub version: i32,
    pub asset_type_id: Id,
    pub allow_additional_fields: bool,
    pub fields: Vec<FieldSnapshot>,
    pub taken_at: DateTime<Utc>,
}

impl SchemaSnapshot {
    /// Capture the current state of a schema and all of its field rows,
    /// soft-deleted ones included.
    pub fn capture(schema: &Schema, fields: &[SchemaField]) -> Self {
        Self {
            schema_id: schema.id.clone(),
            name: schema.name.clone(),
            version: schema.version,
            asset_type_id: schema.asset_type_id.clone(),
            allow_additional_fields: schema.allow_additional_fields,
            fields: fields.iter().map(FieldSnapshot::from).collect(),
            taken_at: Utc::now(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSnapshot> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields that count as present in this snapshot for diffing purposes.
    pub fn live_fields(&self) -> impl Iterator<Item = &FieldSnapshot> {
        self.fields.iter().filter(|f| !f.deleted)
    }
}

/// Append-only version log entry: a numbered snapshot plus a human summary.
/// `version_number` is monotonic per schema and independent of
/// `Schema::version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaVersion {
    pub id: Id,
    pub schema_id: Id,
    pub version_number: i32,
    pub snapshot: SchemaSnapshot,
    pub change_summary: String,
    pub created_by: Id,
    pub created_at: DateTime<Utc>,
}

impl SchemaVersion {
    pub fn new(
        schema_id: Id,
        version_number: i32,
        snapshot: SchemaSnapshot,
        change_summary: String,
        created_by: Id,
    ) -> Self {
        Self {
            id: generate_id(),
            schema_id,
            version_number,
            snapshot,
            change_summary,
            created_by,
            created_at: Utc::now(),
        }
    }
}

/// Kind of structural change recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    FieldAdded,
    FieldRemoved,
    FieldModified,
    Rollback,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Created => "created",
            ChangeKind::FieldAdded => "field_added",
            ChangeKind::FieldRemoved => "field_removed",
            ChangeKind::FieldModified => "field_modified",
            ChangeKind::Rollback => "rollback",
        }
    }

    pub fn parse(tag: &str) -> Option<ChangeKind> {
        match tag {
            "created" => Some(ChangeKind::Created),
            "field_added" => Some(ChangeKind::FieldAdded),
            "field_removed" => Some(ChangeKind::FieldRemoved),
            "field_modified" => Some(ChangeKind::FieldModified),
            "rollback" => Some(ChangeKind::Rollback),
            _ => None,
        }
    }
}

/// Append-only audit entry written alongside every structural mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub id: Id,
    pub schema_id: Id,
    pub change_type: ChangeKind,
    pub description: String,
    pub details: serde_json::Value,
    pub snapshot: SchemaSnapshot,
    pub changed_by: Id,
    pub created_at: DateTime<Utc>,
}

impl ChangeLogEntry {
    pub fn new(
        schema_id: Id,
        change_type: ChangeKind,
        description: String,
        details: serde_json::Value,
        snapshot: SchemaSnapshot,
        changed_by: Id,
    ) -> Self {
        Self {
            id: generate_id(),
            schema_id,
            change_type,
            description,
            details,
            snapshot,
            changed_by,
            created_at: Utc::now(),
        }
    }
}

/// Field-level difference between two snapshots.
///
/// `added` / `removed` are relative to the first snapshot: a field only in
/// the second is "added". `modified` maps field names to textual
/// descriptions of the attributes that changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionDiff {
    pub added_fields: Vec<String>,
    pub removed_fields: Vec<String>,
    pub modified_fields: BTreeMap<String, Vec<String>>,
    pub summary: DiffSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub total_changes: usize,
    pub additions: usize,
    pub removals: usize,
    pub modifications: usize,
}

impl VersionDiff {
    /// Compute the difference between two snapshots. Soft-deleted fields are
    /// treated as absent on both sides.
    pub fn between(from: &SchemaSnapshot, to: &SchemaSnapshot) -> Self {
        let from_fields: BTreeMap<&str, &FieldSnapshot> =
            from.live_fields().map(|f| (f.name.as_str(), f)).collect();
        let to_fields: BTreeMap<&str, &FieldSnapshot> =
            to.live_fields().map(|f| (f.name.as_str(), f)).collect();

        let added_fields: Vec<String> = to_fields
            .keys()
            .filter(|name| !from_fields.contains_key(*name))
            .map(|name| name.to_string())
            .collect();
        let removed_fields: Vec<String> = from_fields
            .keys()
            .filter(|name| !to_fields.contains_key(*name))
            .map(|name| name.to_string())
            .collect();

        let mut modified_fields = BTreeMap::new();
        for (name, before) in &from_fields {
            let Some(after) = to_fields.get(name) else {
                continue;
            };
            let mut changes = Vec::new();
            if before.field_type != after.field_type {
                changes.push(format!(
                    "type: {} -> {}",
                    before.field_type, after.field_type
                ));
            }
            if before.required != after.required {
                changes.push(format!(
                    "required: {} -> {}",
                    before.required, after.required
                ));
            }
            if before.constraints != after.constraints {
                changes.push("constraints changed".to_string());
            }
            if !changes.is_empty() {
                modified_fields.insert(name.to_string(), changes);
            }
        }

        let summary = DiffSummary {
            total_changes: added_fields.len() + removed_fields.len() + modified_fields.len(),
            additions: added_fields.len(),
            removals: removed_fields.len(),
            modifications: modified_fields.len(),
        };

        Self {
            added_fields,
            removed_fields,
            modified_fields,
            summary,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.summary.total_changes == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldSpec, FieldState};

    fn snapshot(fields: Vec<FieldSnapshot>) -> SchemaSnapshot {
        SchemaSnapshot {
            schema_id: "schema-1".to_string(),
            name: "Product".to_string(),
            version: 1,
            asset_type_id: "asset-1".to_string(),
            allow_additional_fields: true,
            fields,
            taken_at: Utc::now(),
        }
    }

    fn field(name: &str, ty: FieldType, required: bool) -> FieldSnapshot {
        let mut spec = FieldSpec::new(name, ty);
        spec.required = required;
        let mut f = SchemaField::from_spec("schema-1".to_string(), &spec, 0);
        f.state = FieldState::Active;
        FieldSnapshot::from(&f)
    }

    #[test]
    fn identical_snapshots_diff_empty() {
        let a = snapshot(vec![field("title", FieldType::String, true)]);
        let diff = VersionDiff::between(&a, &a.clone());
        assert!(diff.is_empty());
        assert!(diff.added_fields.is_empty());
        assert!(diff.removed_fields.is_empty());
        assert!(diff.modified_fields.is_empty());
    }

    #[test]
    fn added_removed_and_modified_fields() {
        let before = snapshot(vec![
            field("title", FieldType::String, true),
            field("price", FieldType::Float, false),
        ]);
        let after = snapshot(vec![
            field("title", FieldType::String, false),
            field("sku", FieldType::String, false),
        ]);

        let diff = VersionDiff::between(&before, &after);
        assert_eq!(diff.added_fields, vec!["sku".to_string()]);
        assert_eq!(diff.removed_fields, vec!["price".to_string()]);
        assert_eq!(
            diff.modified_fields.get("title"),
            Some(&vec!["required: true -> false".to_string()])
        );
        assert_eq!(diff.summary.total_changes, 3);
    }

    #[test]
    fn soft_deleted_fields_are_absent_from_diff() {
        let mut deleted = field("legacy", FieldType::String, false);
        deleted.deleted = true;
        let before = snapshot(vec![field("title", FieldType::String, true), deleted]);
        let after = snapshot(vec![field("title", FieldType::String, true)]);
        assert!(VersionDiff::between(&before, &after).is_empty());
    }
}
