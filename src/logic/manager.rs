use crate::error::SchemaError;
use crate::logic::validate::ValidationEngine;
use crate::model::{
    generate_id, ChangeKind, ChangeLogEntry, FieldConstraints, FieldSpec, FieldState, FieldType,
    FieldValue, ForkModifications, Id, NewSchema, Schema, SchemaDetails, SchemaField,
    SchemaSnapshot, SchemaStatistics, SchemaVersion, TypedValue,
};
use crate::store::catalog::SchemaCatalog;
use crate::store::traits::{FieldWrite, SchemaMutation, Store};
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Process-wide registry of per-schema locks, created lazily.
///
/// Holding a lock serializes structural changes to one schema while letting
/// unrelated schemas mutate concurrently. Locks are evicted explicitly when
/// a schema goes away, so the registry does not grow without bound.
#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: Mutex<HashMap<Id, Arc<tokio::sync::Mutex<()>>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_for(&self, id: &Id) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();
        locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    pub fn evict(&self, id: &Id) {
        self.locks.lock().remove(id);
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}

/// Requested attribute changes for `modify_field`. `None` leaves the
/// attribute untouched.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
pub struct FieldChanges {
    #[serde(default, rename = "type")]
    pub new_type: Option<FieldType>,
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub constraints: Option<FieldConstraints>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Orchestrates every structural schema change. The only component that
/// mutates schema and field rows; each operation runs under the schema's
/// lock and commits as one atomic mutation before invalidating the catalog.
pub struct SchemaManager<S: Store> {
    store: Arc<S>,
    catalog: Arc<SchemaCatalog>,
    locks: LockRegistry,
}

impl<S: Store> SchemaManager<S> {
    pub fn new(store: Arc<S>, catalog: Arc<SchemaCatalog>) -> Self {
        Self {
            store,
            catalog,
            locks: LockRegistry::new(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn catalog(&self) -> &Arc<SchemaCatalog> {
        &self.catalog
    }

    /// Drop the cached lock for a schema that is no longer mutated.
    pub fn evict_lock(&self, schema_id: &Id) {
        self.locks.evict(schema_id);
    }

    pub async fn get_schema(&self, schema_id: &Id) -> Result<SchemaDetails, SchemaError> {
        self.catalog
            .get_schema(self.store.as_ref(), schema_id)
            .await?
            .ok_or_else(|| SchemaError::not_found("schema", schema_id.clone()))
    }

    pub async fn get_fields(
        &self,
        schema_id: &Id,
        include_deleted: bool,
    ) -> Result<Vec<SchemaField>, SchemaError> {
        // NotFound for the schema itself, not an empty field list.
        if self
            .catalog
            .get_schema(self.store.as_ref(), schema_id)
            .await?
            .is_none()
        {
            return Err(SchemaError::not_found("schema", schema_id.clone()));
        }
        Ok(self
            .catalog
            .get_fields(self.store.as_ref(), schema_id, include_deleted)
            .await?)
    }

    pub async fn list_schemas(
        &self,
        asset_type_id: &Id,
        active_only: bool,
    ) -> Result<Vec<SchemaDetails>, SchemaError> {
        Ok(self
            .catalog
            .get_schemas_by_asset_type(self.store.as_ref(), asset_type_id, active_only)
            .await?)
    }

    pub async fn get_statistics(&self, schema_id: &Id) -> Result<SchemaStatistics, SchemaError> {
        Ok(self
            .catalog
            .get_schema_statistics(self.store.as_ref(), schema_id)
            .await?)
    }

    /// Create a schema with an ordered field set, allocating the next
    /// version number scoped to the asset type.
    pub async fn create_schema(
        &self,
        request: NewSchema,
        actor: &str,
    ) -> Result<SchemaDetails, SchemaError> {
        let asset_type = self
            .catalog
            .get_asset_type(self.store.as_ref(), &request.asset_type_id)
            .await?
            .ok_or_else(|| SchemaError::not_found("asset type", request.asset_type_id.clone()))?;

        let errors = ValidationEngine::validate_field_specs(&request.fields);
        if !errors.is_empty() {
            return Err(SchemaError::Validation(errors));
        }

        // Version allocation races with concurrent creates for the same
        // asset type, so it runs under the asset type's lock.
        let lock = self.locks.lock_for(&asset_type.id);
        let _guard = lock.lock().await;

        let version = self
            .store
            .max_schema_version(&asset_type.id)
            .await?
            .unwrap_or(0)
            + 1;
        let schema = Schema {
            id: generate_id(),
            name: request.name,
            version,
            asset_type_id: asset_type.id.clone(),
            parent_schema_id: request.parent_schema_id,
            allow_additional_fields: request.allow_additional_fields,
            is_active: true,
            created_by: actor.to_string(),
            created_at: Utc::now(),
        };
        let fields: Vec<SchemaField> = request
            .fields
            .iter()
            .enumerate()
            .map(|(i, spec)| SchemaField::from_spec(schema.id.clone(), spec, i as i32))
            .collect();

        let snapshot = SchemaSnapshot::capture(&schema, &fields);
        let log_entry = ChangeLogEntry::new(
            schema.id.clone(),
            ChangeKind::Created,
            format!("created schema '{}' with {} field(s)", schema.name, fields.len()),
            serde_json::json!({ "field_count": fields.len(), "schema_version": version }),
            snapshot.clone(),
            actor.to_string(),
        );
        let first_version = SchemaVersion::new(
            schema.id.clone(),
            1,
            snapshot,
            "initial version".to_string(),
            actor.to_string(),
        );

        self.store
            .apply_mutation(SchemaMutation {
                schema_id: schema.id.clone(),
                new_schema: Some(schema.clone()),
                field_writes: fields.iter().cloned().map(FieldWrite::Insert).collect(),
                value_upserts: vec![],
                log_entry,
                version: Some(first_version),
            })
            .await?;
        self.catalog.invalidate_asset_type(&asset_type.id);

        log::info!(
            "created schema '{}' ({}) for asset type {}",
            schema.name,
            schema.id,
            asset_type.id
        );
        Ok(SchemaDetails { schema, fields })
    }

    /// Add one field to an existing schema, backfilling a default value for
    /// every existing record when the field is required.
    pub async fn add_field(
        &self,
        schema_id: &Id,
        spec: FieldSpec,
        actor: &str,
    ) -> Result<SchemaField, SchemaError> {
        let lock = self.locks.lock_for(schema_id);
        let _guard = lock.lock().await;

        let schema = self
            .store
            .get_schema(schema_id)
            .await?
            .ok_or_else(|| SchemaError::not_found("schema", schema_id.clone()))?;
        if self
            .store
            .get_active_field(schema_id, &spec.name)
            .await?
            .is_some()
        {
            return Err(SchemaError::validation(format!(
                "field '{}' already exists on schema '{}'",
                spec.name, schema.name
            )));
        }

        let record_count = self.store.count_records(schema_id).await?;
        let report = ValidationEngine::validate_add_field(&spec, record_count);
        if !report.is_ok() {
            return Err(SchemaError::Validation(report.errors));
        }
        for warning in &report.warnings {
            log::warn!("add_field '{}' on {}: {}", spec.name, schema_id, warning);
        }

        let order_index = self.store.max_order_index(schema_id).await? + 1;
        let field = SchemaField::from_spec(schema_id.clone(), &spec, order_index);

        let mut value_upserts = Vec::new();
        if field.required && record_count > 0 {
            if let Some(default) = &field.default_value {
                let typed = TypedValue::coerce(&Value::String(default.clone()), field.field_type)
                    .map_err(|e| SchemaError::validation(e.to_string()))?;
                for record_id in self.store.list_record_ids(schema_id).await? {
                    let mut cell = FieldValue::new(record_id, field.id.clone());
                    cell.set_typed(typed.clone());
                    value_upserts.push(cell);
                }
            }
        }
        let backfilled = value_upserts.len();

        let mut all_fields = self.store.list_fields(schema_id, true).await?;
        all_fields.push(field.clone());
        let snapshot = SchemaSnapshot::capture(&schema, &all_fields);
        let log_entry = ChangeLogEntry::new(
            schema_id.clone(),
            ChangeKind::FieldAdded,
            format!("added field '{}' ({})", field.name, field.field_type),
            serde_json::json!({
                "field_name": field.name,
                "field_type": field.field_type,
                "required": field.required,
                "backfilled_records": backfilled,
            }),
            snapshot.clone(),
            actor.to_string(),
        );
        let version = self
            .next_version(schema_id, snapshot, actor, || {
                format!("added field '{}'", field.name)
            })
            .await?;

        self.store
            .apply_mutation(SchemaMutation {
                schema_id: schema_id.clone(),
                new_schema: None,
                field_writes: vec![FieldWrite::Insert(field.clone())],
                value_upserts,
                log_entry,
                version: Some(version),
            })
            .await?;
        self.catalog.invalidate_schema(schema_id);

        log::info!(
            "added field '{}' to schema {} (backfilled {} record(s))",
            field.name,
            schema_id,
            backfilled
        );
        Ok(field)
    }

    /// Remove a field. Soft delete by default; `permanent=true` also drops
    /// every stored value for the field and cannot be rolled back.
    pub async fn remove_field(
        &self,
        schema_id: &Id,
        field_name: &str,
        permanent: bool,
        actor: &str,
    ) -> Result<(), SchemaError> {
        let lock = self.locks.lock_for(schema_id);
        let _guard = lock.lock().await;

        let schema = self
            .store
            .get_schema(schema_id)
            .await?
            .ok_or_else(|| SchemaError::not_found("schema", schema_id.clone()))?;
        let field = self
            .store
            .get_active_field(schema_id, field_name)
            .await?
            .ok_or_else(|| SchemaError::not_found("field", field_name))?;

        let report =
            ValidationEngine::validate_field_removal(self.store.as_ref(), &field).await?;
        for warning in &report.warnings {
            log::warn!("remove_field '{}' on {}: {}", field.name, schema_id, warning);
        }

        let write = if permanent {
            FieldWrite::HardDelete {
                field_id: field.id.clone(),
            }
        } else {
            FieldWrite::SoftDelete {
                field_id: field.id.clone(),
            }
        };

        let mut all_fields = self.store.list_fields(schema_id, true).await?;
        if permanent {
            all_fields.retain(|f| f.id != field.id);
        } else if let Some(row) = all_fields.iter_mut().find(|f| f.id == field.id) {
            row.state = FieldState::Deleted;
        }
        let snapshot = SchemaSnapshot::capture(&schema, &all_fields);
        let log_entry = ChangeLogEntry::new(
            schema_id.clone(),
            ChangeKind::FieldRemoved,
            format!(
                "removed field '{}'{}",
                field.name,
                if permanent { " permanently" } else { "" }
            ),
            serde_json::json!({
                "field_name": field.name,
                "permanent": permanent,
            }),
            snapshot.clone(),
            actor.to_string(),
        );
        let version = self
            .next_version(schema_id, snapshot, actor, || {
                format!("removed field '{}'", field.name)
            })
            .await?;

        self.store
            .apply_mutation(SchemaMutation {
                schema_id: schema_id.clone(),
                new_schema: None,
                field_writes: vec![write],
                value_upserts: vec![],
                log_entry,
                version: Some(version),
            })
            .await?;
        self.catalog.invalidate_schema(schema_id);

        log::info!(
            "removed field '{}' from schema {} (permanent: {})",
            field.name,
            schema_id,
            permanent
        );
        Ok(())
    }

    /// Change a field's type and/or other attributes.
    ///
    /// A type change migrates every stored value through the codec under the
    /// new type inside the same mutation; if any value cannot convert, the
    /// operation fails and the declared type is unchanged. A request that
    /// changes nothing is a no-op with no audit entry or version.
    pub async fn modify_field(
        &self,
        schema_id: &Id,
        field_name: &str,
        changes: FieldChanges,
        actor: &str,
    ) -> Result<SchemaField, SchemaError> {
        let lock = self.locks.lock_for(schema_id);
        let _guard = lock.lock().await;

        let schema = self
            .store
            .get_schema(schema_id)
            .await?
            .ok_or_else(|| SchemaError::not_found("schema", schema_id.clone()))?;
        let field = self
            .store
            .get_active_field(schema_id, field_name)
            .await?
            .ok_or_else(|| SchemaError::not_found("field", field_name))?;

        let mut updated = field.clone();
        let mut change_notes = Vec::new();
        let mut value_upserts = Vec::new();

        if let Some(new_type) = changes.new_type {
            if new_type != field.field_type {
                let errors =
                    ValidationEngine::validate_type_change(self.store.as_ref(), &field, new_type)
                        .await?;
                if !errors.is_empty() {
                    return Err(SchemaError::Validation(errors));
                }
                // Migrate every stored value; a conversion failure aborts
                // before anything is written, leaving the type as it was.
                for cell in self
                    .store
                    .list_values_for_field(&field.id, None)
                    .await?
                {
                    let Some(value) = cell.get_value(field.field_type) else {
                        continue;
                    };
                    let converted = value
                        .convert_to(new_type)
                        .map_err(|e| SchemaError::validation(e.to_string()))?;
                    let mut migrated = cell.clone();
                    migrated.set_typed(converted);
                    value_upserts.push(migrated);
                }
                change_notes.push(format!("type: {} -> {}", field.field_type, new_type));
                updated.field_type = new_type;
            }
        }

        if let Some(required) = changes.required {
            if required != field.required {
                change_notes.push(format!("required: {} -> {}", field.required, required));
                updated.required = required;
            }
        }
        if let Some(default) = changes.default {
            if Some(&default) != field.default_value.as_ref() {
                if TypedValue::coerce(&Value::String(default.clone()), updated.field_type).is_err()
                {
                    return Err(SchemaError::validation(format!(
                        "default value '{}' is not a valid {}",
                        default, updated.field_type
                    )));
                }
                change_notes.push("default changed".to_string());
                updated.default_value = Some(default);
            }
        }
        if let Some(constraints) = changes.constraints {
            if Some(&constraints) != field.constraints.as_ref() {
                let errors = ValidationEngine::validate_constraints(
                    self.store.as_ref(),
                    &updated,
                    &constraints,
                )
                .await?;
                if !errors.is_empty() {
                    return Err(SchemaError::Validation(errors));
                }
                change_notes.push("constraints changed".to_string());
                updated.constraints = Some(constraints);
            }
        }
        if let Some(description) = changes.description {
            if Some(&description) != field.description.as_ref() {
                change_notes.push("description changed".to_string());
                updated.description = Some(description);
            }
        }

        if change_notes.is_empty() {
            return Ok(field);
        }
        updated.touch();

        let mut all_fields = self.store.list_fields(schema_id, true).await?;
        if let Some(row) = all_fields.iter_mut().find(|f| f.id == updated.id) {
            *row = updated.clone();
        }
        let snapshot = SchemaSnapshot::capture(&schema, &all_fields);
        let log_entry = ChangeLogEntry::new(
            schema_id.clone(),
            ChangeKind::FieldModified,
            format!("modified field '{}': {}", field.name, change_notes.join(", ")),
            serde_json::json!({
                "field_name": field.name,
                "changes": change_notes,
                "migrated_values": value_upserts.len(),
            }),
            snapshot.clone(),
            actor.to_string(),
        );
        let version = self
            .next_version(schema_id, snapshot, actor, || {
                format!("modified field '{}'", field.name)
            })
            .await?;

        self.store
            .apply_mutation(SchemaMutation {
                schema_id: schema_id.clone(),
                new_schema: None,
                field_writes: vec![FieldWrite::Update(updated.clone())],
                value_upserts,
                log_entry,
                version: Some(version),
            })
            .await?;
        self.catalog.invalidate_schema(schema_id);

        log::info!(
            "modified field '{}' on schema {}: {}",
            field.name,
            schema_id,
            change_notes.join(", ")
        );
        Ok(updated)
    }

    /// Create an independent copy of a schema, linked to the source through
    /// `parent_schema_id`, with optional field adjustments applied.
    pub async fn fork_schema(
        &self,
        schema_id: &Id,
        new_name: &str,
        modifications: Option<ForkModifications>,
        actor: &str,
    ) -> Result<SchemaDetails, SchemaError> {
        let source = self.get_schema(schema_id).await?;
        let modifications = modifications.unwrap_or_default();

        let mut specs: Vec<FieldSpec> = source
            .fields
            .iter()
            .filter(|f| f.is_active())
            .filter(|f| !modifications.remove_fields.contains(&f.name))
            .map(|f| FieldSpec {
                name: f.name.clone(),
                field_type: f.field_type,
                required: f.required,
                default: f.default_value.clone(),
                constraints: f.constraints.clone(),
                description: f.description.clone(),
            })
            .collect();
        specs.extend(modifications.add_fields);

        self.create_schema(
            NewSchema {
                name: new_name.to_string(),
                asset_type_id: source.schema.asset_type_id.clone(),
                fields: specs,
                allow_additional_fields: source.schema.allow_additional_fields,
                parent_schema_id: Some(schema_id.clone()),
            },
            actor,
        )
        .await
    }

    async fn next_version(
        &self,
        schema_id: &Id,
        snapshot: SchemaSnapshot,
        actor: &str,
        summary: impl FnOnce() -> String,
    ) -> Result<SchemaVersion, SchemaError> {
        let number = self
            .store
            .latest_version(schema_id)
            .await?
            .map(|v| v.version_number + 1)
            .unwrap_or(1);
        Ok(SchemaVersion::new(
            schema_id.clone(),
            number,
            snapshot,
            summary(),
            actor.to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_registry_creates_lazily_and_evicts() {
        let registry = LockRegistry::new();
        assert!(registry.is_empty());

        let a = registry.lock_for(&"schema-a".to_string());
        let a_again = registry.lock_for(&"schema-a".to_string());
        assert!(Arc::ptr_eq(&a, &a_again));
        registry.lock_for(&"schema-b".to_string());
        assert_eq!(registry.len(), 2);

        registry.evict(&"schema-a".to_string());
        assert_eq!(registry.len(), 1);
        // A fresh lock is handed out after eviction.
        let a_new = registry.lock_for(&"schema-a".to_string());
        assert!(!Arc::ptr_eq(&a, &a_new));
    }

    #[tokio::test]
    async fn lock_serializes_holders() {
        let registry = LockRegistry::new();
        let lock = registry.lock_for(&"schema-a".to_string());
        let guard = lock.lock().await;
        assert!(lock.try_lock().is_err());
        drop(guard);
        assert!(lock.try_lock().is_ok());
    }
}
