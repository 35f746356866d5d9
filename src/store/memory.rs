use crate::model::{
    AssetType, ChangeLogEntry, FieldState, FieldValue, Id, Record, Schema, SchemaField,
    SchemaVersion,
};
use crate::store::traits::{
    AssetTypeStore, ChangeLogStore, FieldStore, FieldWrite, MutationStore, RecordStore,
    SchemaMutation, SchemaStore, ValueStore, VersionStore,
};
use anyhow::{anyhow, Result};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Default)]
struct Inner {
    asset_types: HashMap<Id, AssetType>,
    schemas: HashMap<Id, Schema>,
    fields: HashMap<Id, SchemaField>,
    records: HashMap<Id, Record>,
    /// EAV cells keyed by (record_id, field_id).
    values: HashMap<(Id, Id), FieldValue>,
    versions: Vec<SchemaVersion>,
    change_log: Vec<ChangeLogEntry>,
}

/// In-memory store for tests and single-process embedding.
///
/// One mutex guards all state, so `apply_mutation` is trivially atomic:
/// the mutation either applies in full or, on a failed precondition, not at
/// all (preconditions are checked before any write).
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl AssetTypeStore for MemoryStore {
    async fn get_asset_type(&self, id: &Id) -> Result<Option<AssetType>> {
        Ok(self.inner.lock().asset_types.get(id).cloned())
    }

    async fn list_asset_types(&self) -> Result<Vec<AssetType>> {
        let inner = self.inner.lock();
        let mut out: Vec<_> = inner.asset_types.values().cloned().collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    async fn insert_asset_type(&self, asset_type: AssetType) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.asset_types.values().any(|at| at.name == asset_type.name) {
            return Err(anyhow!("asset type '{}' already exists", asset_type.name));
        }
        inner.asset_types.insert(asset_type.id.clone(), asset_type);
        Ok(())
    }
}

#[async_trait::async_trait]
impl SchemaStore for MemoryStore {
    async fn get_schema(&self, id: &Id) -> Result<Option<Schema>> {
        Ok(self.inner.lock().schemas.get(id).cloned())
    }

    async fn list_schemas_for_asset_type(
        &self,
        asset_type_id: &Id,
        active_only: bool,
    ) -> Result<Vec<Schema>> {
        let inner = self.inner.lock();
        let mut out: Vec<_> = inner
            .schemas
            .values()
            .filter(|s| &s.asset_type_id == asset_type_id && (!active_only || s.is_active))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(out)
    }

    async fn max_schema_version(&self, asset_type_id: &Id) -> Result<Option<i32>> {
        let inner = self.inner.lock();
        Ok(inner
            .schemas
            .values()
            .filter(|s| &s.asset_type_id == asset_type_id)
            .map(|s| s.version)
            .max())
    }
}

#[async_trait::async_trait]
impl FieldStore for MemoryStore {
    async fn get_active_field(&self, schema_id: &Id, name: &str) -> Result<Option<SchemaField>> {
        let inner = self.inner.lock();
        Ok(inner
            .fields
            .values()
            .find(|f| &f.schema_id == schema_id && f.name == name && f.is_active())
            .cloned())
    }

    async fn get_deleted_field(&self, schema_id: &Id, name: &str) -> Result<Option<SchemaField>> {
        let inner = self.inner.lock();
        Ok(inner
            .fields
            .values()
            .find(|f| &f.schema_id == schema_id && f.name == name && f.state.is_deleted())
            .cloned())
    }

    async fn get_field_by_id(&self, field_id: &Id) -> Result<Option<SchemaField>> {
        Ok(self.inner.lock().fields.get(field_id).cloned())
    }

    async fn list_fields(
        &self,
        schema_id: &Id,
        include_deleted: bool,
    ) -> Result<Vec<SchemaField>> {
        let inner = self.inner.lock();
        let mut out: Vec<_> = inner
            .fields
            .values()
            .filter(|f| &f.schema_id == schema_id && (include_deleted || f.is_active()))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            a.order_index
                .cmp(&b.order_index)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(out)
    }

    async fn max_order_index(&self, schema_id: &Id) -> Result<i32> {
        let inner = self.inner.lock();
        Ok(inner
            .fields
            .values()
            .filter(|f| &f.schema_id == schema_id)
            .map(|f| f.order_index)
            .max()
            .unwrap_or(0))
    }
}

#[async_trait::async_trait]
impl RecordStore for MemoryStore {
    async fn count_records(&self, schema_id: &Id) -> Result<u64> {
        let inner = self.inner.lock();
        Ok(inner
            .records
            .values()
            .filter(|r| &r.schema_id == schema_id)
            .count() as u64)
    }

    async fn list_record_ids(&self, schema_id: &Id) -> Result<Vec<Id>> {
        let inner = self.inner.lock();
        let mut out: Vec<_> = inner
            .records
            .values()
            .filter(|r| &r.schema_id == schema_id)
            .map(|r| r.id.clone())
            .collect();
        out.sort();
        Ok(out)
    }

    async fn insert_record(&self, record: Record) -> Result<()> {
        self.inner.lock().records.insert(record.id.clone(), record);
        Ok(())
    }
}

#[async_trait::async_trait]
impl ValueStore for MemoryStore {
    async fn get_value(&self, record_id: &Id, field_id: &Id) -> Result<Option<FieldValue>> {
        let inner = self.inner.lock();
        Ok(inner
            .values
            .get(&(record_id.clone(), field_id.clone()))
            .cloned())
    }

    async fn list_values_for_field(
        &self,
        field_id: &Id,
        limit: Option<usize>,
    ) -> Result<Vec<FieldValue>> {
        let inner = self.inner.lock();
        let mut out: Vec<_> = inner
            .values
            .values()
            .filter(|v| &v.field_id == field_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.record_id.cmp(&b.record_id));
        if let Some(limit) = limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    async fn count_values_for_field(&self, field_id: &Id) -> Result<u64> {
        let inner = self.inner.lock();
        Ok(inner
            .values
            .values()
            .filter(|v| &v.field_id == field_id)
            .count() as u64)
    }

    async fn count_non_null_values(&self, field_id: &Id) -> Result<u64> {
        let inner = self.inner.lock();
        Ok(inner
            .values
            .values()
            .filter(|v| &v.field_id == field_id && !v.is_null())
            .count() as u64)
    }

    async fn upsert_value(&self, value: FieldValue) -> Result<()> {
        let mut inner = self.inner.lock();
        inner
            .values
            .insert((value.record_id.clone(), value.field_id.clone()), value);
        Ok(())
    }
}

#[async_trait::async_trait]
impl VersionStore for MemoryStore {
    async fn get_version(
        &self,
        schema_id: &Id,
        version_number: i32,
    ) -> Result<Option<SchemaVersion>> {
        let inner = self.inner.lock();
        Ok(inner
            .versions
            .iter()
            .find(|v| &v.schema_id == schema_id && v.version_number == version_number)
            .cloned())
    }

    async fn latest_version(&self, schema_id: &Id) -> Result<Option<SchemaVersion>> {
        let inner = self.inner.lock();
        Ok(inner
            .versions
            .iter()
            .filter(|v| &v.schema_id == schema_id)
            .max_by_key(|v| v.version_number)
            .cloned())
    }

    async fn list_versions(&self, schema_id: &Id, limit: usize) -> Result<Vec<SchemaVersion>> {
        let inner = self.inner.lock();
        let mut out: Vec<_> = inner
            .versions
            .iter()
            .filter(|v| &v.schema_id == schema_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.version_number.cmp(&a.version_number));
        out.truncate(limit);
        Ok(out)
    }

    async fn insert_version(&self, version: SchemaVersion) -> Result<()> {
        let mut inner = self.inner.lock();
        // (schema_id, version_number) is unique, as in the relational layout.
        if inner
            .versions
            .iter()
            .any(|v| v.schema_id == version.schema_id && v.version_number == version.version_number)
        {
            return Err(anyhow!(
                "version {} already exists for schema '{}'",
                version.version_number,
                version.schema_id
            ));
        }
        inner.versions.push(version);
        Ok(())
    }
}

#[async_trait::async_trait]
impl ChangeLogStore for MemoryStore {
    async fn list_change_log(&self, schema_id: &Id, limit: usize) -> Result<Vec<ChangeLogEntry>> {
        let inner = self.inner.lock();
        let mut out: Vec<_> = inner
            .change_log
            .iter()
            .filter(|e| &e.schema_id == schema_id)
            .cloned()
            .collect();
        out.reverse();
        out.truncate(limit);
        Ok(out)
    }
}

#[async_trait::async_trait]
impl MutationStore for MemoryStore {
    async fn apply_mutation(&self, mutation: SchemaMutation) -> Result<()> {
        let mut inner = self.inner.lock();

        // Preconditions first, so a failure applies nothing.
        if mutation.new_schema.is_none() && !inner.schemas.contains_key(&mutation.schema_id) {
            return Err(anyhow!("schema '{}' does not exist", mutation.schema_id));
        }
        for write in &mutation.field_writes {
            let existing = match write {
                FieldWrite::Insert(_) => continue,
                FieldWrite::Update(field) => &field.id,
                FieldWrite::SoftDelete { field_id }
                | FieldWrite::Restore { field_id }
                | FieldWrite::HardDelete { field_id } => field_id,
            };
            if !inner.fields.contains_key(existing) {
                return Err(anyhow!("field '{}' does not exist", existing));
            }
        }
        if let Some(version) = &mutation.version {
            if inner.versions.iter().any(|v| {
                v.schema_id == version.schema_id && v.version_number == version.version_number
            }) {
                return Err(anyhow!(
                    "version {} already exists for schema '{}'",
                    version.version_number,
                    version.schema_id
                ));
            }
        }

        if let Some(schema) = mutation.new_schema {
            inner.schemas.insert(schema.id.clone(), schema);
        }

        for write in mutation.field_writes {
            match write {
                FieldWrite::Insert(field) | FieldWrite::Update(field) => {
                    inner.fields.insert(field.id.clone(), field);
                }
                FieldWrite::SoftDelete { field_id } => {
                    if let Some(field) = inner.fields.get_mut(&field_id) {
                        field.state = FieldState::Deleted;
                        field.updated_at = Utc::now();
                    }
                }
                FieldWrite::Restore { field_id } => {
                    if let Some(field) = inner.fields.get_mut(&field_id) {
                        field.state = FieldState::Active;
                        field.updated_at = Utc::now();
                    }
                }
                FieldWrite::HardDelete { field_id } => {
                    inner.fields.remove(&field_id);
                    inner.values.retain(|(_, fid), _| fid != &field_id);
                }
            }
        }

        for value in mutation.value_upserts {
            inner
                .values
                .insert((value.record_id.clone(), value.field_id.clone()), value);
        }

        inner.change_log.push(mutation.log_entry);
        if let Some(version) = mutation.version {
            inner.versions.push(version);
        }

        Ok(())
    }
}
