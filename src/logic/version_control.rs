use crate::error::SchemaError;
use crate::model::{
    generate_id, ChangeKind, ChangeLogEntry, FieldState, Id, SchemaField, SchemaSnapshot,
    SchemaVersion, VersionDiff,
};
use crate::store::catalog::SchemaCatalog;
use crate::store::traits::{FieldWrite, SchemaMutation, Store};
use chrono::Utc;

/// Versions and audit entries returned per listing unless the caller asks
/// for fewer.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Result payload of a rollback attempt. `success=false` carries the reason
/// in `error`; infrastructure failures are raised instead.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RollbackOutcome {
    pub success: bool,
    pub from_version: i32,
    pub to_version: i32,
    pub changes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Snapshot history: lookups, diffs, rollback, manual checkpoints.
pub struct SchemaVersionControl;

impl SchemaVersionControl {
    pub async fn get_version<S: Store>(
        store: &S,
        schema_id: &Id,
        version_number: i32,
    ) -> Result<SchemaVersion, SchemaError> {
        store
            .get_version(schema_id, version_number)
            .await?
            .ok_or_else(|| {
                SchemaError::not_found("version", format!("{schema_id}@{version_number}"))
            })
    }

    pub async fn get_latest_version<S: Store>(
        store: &S,
        schema_id: &Id,
    ) -> Result<SchemaVersion, SchemaError> {
        store
            .latest_version(schema_id)
            .await?
            .ok_or_else(|| SchemaError::not_found("schema", schema_id.clone()))
    }

    /// Versions newest first.
    pub async fn list_versions<S: Store>(
        store: &S,
        schema_id: &Id,
        limit: Option<usize>,
    ) -> Result<Vec<SchemaVersion>, SchemaError> {
        Ok(store
            .list_versions(schema_id, limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
            .await?)
    }

    /// Field-level diff between two stored versions. Additions and removals
    /// are reported relative to the first version.
    pub async fn compare_versions<S: Store>(
        store: &S,
        schema_id: &Id,
        from_version: i32,
        to_version: i32,
    ) -> Result<VersionDiff, SchemaError> {
        let from = Self::get_version(store, schema_id, from_version).await?;
        let to = Self::get_version(store, schema_id, to_version).await?;
        Ok(VersionDiff::between(&from.snapshot, &to.snapshot))
    }

    /// Manual checkpoint: snapshot the current field set and append it as
    /// the next numbered version, outside any structural mutation.
    pub async fn create_snapshot<S: Store>(
        store: &S,
        schema_id: &Id,
        change_summary: String,
        created_by: &str,
    ) -> Result<SchemaVersion, SchemaError> {
        let schema = store
            .get_schema(schema_id)
            .await?
            .ok_or_else(|| SchemaError::not_found("schema", schema_id.clone()))?;
        let fields = store.list_fields(schema_id, true).await?;
        let next_number = store
            .latest_version(schema_id)
            .await?
            .map(|v| v.version_number + 1)
            .unwrap_or(1);

        let version = SchemaVersion::new(
            schema_id.clone(),
            next_number,
            SchemaSnapshot::capture(&schema, &fields),
            change_summary,
            created_by.to_string(),
        );
        store.insert_version(version.clone()).await?;
        Ok(version)
    }

    /// Audit trail for a schema, newest first.
    pub async fn get_change_history<S: Store>(
        store: &S,
        schema_id: &Id,
        limit: Option<usize>,
    ) -> Result<Vec<ChangeLogEntry>, SchemaError> {
        Ok(store
            .list_change_log(schema_id, limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
            .await?)
    }

    /// Audit entries that touched one field, matched on the `field_name`
    /// key of the entry's details payload.
    pub async fn get_field_history<S: Store>(
        store: &S,
        schema_id: &Id,
        field_name: &str,
    ) -> Result<Vec<ChangeLogEntry>, SchemaError> {
        let entries = store
            .list_change_log(schema_id, DEFAULT_HISTORY_LIMIT)
            .await?;
        Ok(entries
            .into_iter()
            .filter(|e| {
                e.details
                    .get("field_name")
                    .and_then(|v| v.as_str())
                    .map(|n| n == field_name)
                    .unwrap_or(false)
            })
            .collect())
    }

    /// Restore a schema's field structure to a stored version.
    ///
    /// The structural delta (restore/recreate, remove, overwrite) is applied
    /// as one atomic mutation together with a `rollback` audit entry; no new
    /// version is appended, so the history still shows where the schema has
    /// been. Stored values are not re-migrated: rollback rewinds structure,
    /// not data.
    pub async fn rollback<S: Store>(
        store: &S,
        catalog: &SchemaCatalog,
        schema_id: &Id,
        target_version: i32,
        preserve_data: bool,
        actor: &str,
    ) -> Result<RollbackOutcome, SchemaError> {
        let schema = store
            .get_schema(schema_id)
            .await?
            .ok_or_else(|| SchemaError::not_found("schema", schema_id.clone()))?;
        let from_version = store
            .latest_version(schema_id)
            .await?
            .map(|v| v.version_number)
            .unwrap_or(0);
        // A missing target is an expected condition reported in the outcome;
        // only infrastructure failures raise out of here.
        let Some(target) = store.get_version(schema_id, target_version).await? else {
            return Ok(RollbackOutcome {
                success: false,
                from_version,
                to_version: target_version,
                changes: vec![],
                error: Some(format!(
                    "version {target_version} does not exist for schema '{schema_id}'"
                )),
            });
        };

        let current_fields = store.list_fields(schema_id, true).await?;
        let current = SchemaSnapshot::capture(&schema, &current_fields);
        let diff = VersionDiff::between(&current, &target.snapshot);
        if diff.is_empty() {
            return Ok(RollbackOutcome {
                success: true,
                from_version,
                to_version: target_version,
                changes: vec![],
                error: None,
            });
        }

        let mut writes = Vec::new();
        let mut changes = Vec::new();
        // Track the resulting rows so the audit entry can snapshot the
        // post-rollback state.
        let mut result_fields = current_fields.clone();

        // Fields present in the target but not live now: un-delete the
        // soft-deleted row when one exists, otherwise recreate from the
        // target definition.
        for name in &diff.added_fields {
            let snap = target
                .snapshot
                .field(name)
                .ok_or_else(|| SchemaError::validation(format!("field '{name}' missing from target snapshot")))?;
            if let Some(deleted) = current_fields
                .iter()
                .find(|f| &f.name == name && f.state.is_deleted())
            {
                writes.push(FieldWrite::Restore {
                    field_id: deleted.id.clone(),
                });
                if let Some(row) = result_fields.iter_mut().find(|f| f.id == deleted.id) {
                    row.state = FieldState::Active;
                }
                changes.push(format!("restored field '{name}'"));
            } else {
                let now = Utc::now();
                let field = SchemaField {
                    id: generate_id(),
                    schema_id: schema_id.clone(),
                    name: snap.name.clone(),
                    field_type: snap.field_type,
                    required: snap.required,
                    default_value: snap.default.clone(),
                    constraints: snap.constraints.clone(),
                    description: snap.description.clone(),
                    order_index: snap.order,
                    state: FieldState::Active,
                    created_at: now,
                    updated_at: now,
                };
                result_fields.push(field.clone());
                writes.push(FieldWrite::Insert(field));
                changes.push(format!("recreated field '{name}'"));
            }
        }

        // Fields live now but absent from the target.
        for name in &diff.removed_fields {
            let Some(field) = current_fields
                .iter()
                .find(|f| &f.name == name && f.is_active())
            else {
                continue;
            };
            if preserve_data {
                writes.push(FieldWrite::SoftDelete {
                    field_id: field.id.clone(),
                });
                if let Some(row) = result_fields.iter_mut().find(|f| f.id == field.id) {
                    row.state = FieldState::Deleted;
                }
                changes.push(format!("removed field '{name}'"));
            } else {
                writes.push(FieldWrite::HardDelete {
                    field_id: field.id.clone(),
                });
                result_fields.retain(|f| f.id != field.id);
                changes.push(format!("permanently removed field '{name}'"));
            }
        }

        // Fields present on both sides: overwrite the live definition.
        for (name, attribute_changes) in &diff.modified_fields {
            let Some(field) = current_fields
                .iter()
                .find(|f| &f.name == name && f.is_active())
            else {
                continue;
            };
            let Some(snap) = target.snapshot.field(name) else {
                continue;
            };
            let mut updated = field.clone();
            updated.field_type = snap.field_type;
            updated.required = snap.required;
            updated.default_value = snap.default.clone();
            updated.constraints = snap.constraints.clone();
            updated.description = snap.description.clone();
            updated.order_index = snap.order;
            updated.touch();
            if let Some(row) = result_fields.iter_mut().find(|f| f.id == updated.id) {
                *row = updated.clone();
            }
            writes.push(FieldWrite::Update(updated));
            changes.push(format!(
                "reverted field '{}' ({})",
                name,
                attribute_changes.join(", ")
            ));
        }

        let log_entry = ChangeLogEntry::new(
            schema_id.clone(),
            ChangeKind::Rollback,
            format!("rolled back from version {from_version} to {target_version}"),
            serde_json::json!({
                "target_version": target_version,
                "preserve_data": preserve_data,
                "changes": changes,
            }),
            SchemaSnapshot::capture(&schema, &result_fields),
            actor.to_string(),
        );

        store
            .apply_mutation(SchemaMutation {
                schema_id: schema_id.clone(),
                new_schema: None,
                field_writes: writes,
                value_upserts: vec![],
                log_entry,
                version: None,
            })
            .await?;
        catalog.invalidate_schema(schema_id);

        log::info!(
            "rolled back schema {} from version {} to {} ({} change(s))",
            schema_id,
            from_version,
            target_version,
            changes.len()
        );

        Ok(RollbackOutcome {
            success: true,
            from_version,
            to_version: target_version,
            changes,
            error: None,
        })
    }
}
