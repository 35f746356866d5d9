use crate::model::{
    AssetType, ChangeLogEntry, FieldValue, Id, Record, Schema, SchemaField, SchemaVersion,
};
use anyhow::Result;

/// A single write against the field table, applied inside a mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldWrite {
    Insert(SchemaField),
    /// Replace the row with this state (same id).
    Update(SchemaField),
    SoftDelete { field_id: Id },
    Restore { field_id: Id },
    /// Removes the row and every value stored against it.
    HardDelete { field_id: Id },
}

/// Unit of work for one structural schema change.
///
/// Carries everything a mutating operation produces: the optional new schema
/// row, field writes, value upserts (default backfill, type migration), the
/// audit log entry, and the version snapshot when one is due. Stores apply
/// the whole mutation atomically; a failure leaves zero observable change.
#[derive(Debug, Clone)]
pub struct SchemaMutation {
    pub schema_id: Id,
    pub new_schema: Option<Schema>,
    pub field_writes: Vec<FieldWrite>,
    pub value_upserts: Vec<FieldValue>,
    pub log_entry: ChangeLogEntry,
    pub version: Option<SchemaVersion>,
}

#[async_trait::async_trait]
pub trait AssetTypeStore: Send + Sync {
    async fn get_asset_type(&self, id: &Id) -> Result<Option<AssetType>>;
    async fn list_asset_types(&self) -> Result<Vec<AssetType>>;
    async fn insert_asset_type(&self, asset_type: AssetType) -> Result<()>;
}

#[async_trait::async_trait]
pub trait SchemaStore: Send + Sync {
    async fn get_schema(&self, id: &Id) -> Result<Option<Schema>>;
    async fn list_schemas_for_asset_type(
        &self,
        asset_type_id: &Id,
        active_only: bool,
    ) -> Result<Vec<Schema>>;
    /// Highest `Schema::version` allocated for an asset type, if any.
    async fn max_schema_version(&self, asset_type_id: &Id) -> Result<Option<i32>>;
}

#[async_trait::async_trait]
pub trait FieldStore: Send + Sync {
    /// Look up the active field with this name, ignoring soft-deleted rows.
    async fn get_active_field(&self, schema_id: &Id, name: &str) -> Result<Option<SchemaField>>;
    /// Look up a soft-deleted field with this name (rollback restore path).
    async fn get_deleted_field(&self, schema_id: &Id, name: &str) -> Result<Option<SchemaField>>;
    async fn get_field_by_id(&self, field_id: &Id) -> Result<Option<SchemaField>>;
    /// Fields ordered by `order_index`.
    async fn list_fields(&self, schema_id: &Id, include_deleted: bool)
        -> Result<Vec<SchemaField>>;
    async fn max_order_index(&self, schema_id: &Id) -> Result<i32>;
}

#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    async fn count_records(&self, schema_id: &Id) -> Result<u64>;
    async fn list_record_ids(&self, schema_id: &Id) -> Result<Vec<Id>>;
    /// Records are owned by the record read/write paths outside this crate;
    /// this exists for those paths and for test fixtures.
    async fn insert_record(&self, record: Record) -> Result<()>;
}

#[async_trait::async_trait]
pub trait ValueStore: Send + Sync {
    async fn get_value(&self, record_id: &Id, field_id: &Id) -> Result<Option<FieldValue>>;
    /// Values stored against a field, optionally capped (validation sampling).
    async fn list_values_for_field(
        &self,
        field_id: &Id,
        limit: Option<usize>,
    ) -> Result<Vec<FieldValue>>;
    async fn count_values_for_field(&self, field_id: &Id) -> Result<u64>;
    async fn count_non_null_values(&self, field_id: &Id) -> Result<u64>;
    /// Record read/write path: upsert one cell keyed by (record, field).
    async fn upsert_value(&self, value: FieldValue) -> Result<()>;
}

#[async_trait::async_trait]
pub trait VersionStore: Send + Sync {
    async fn get_version(&self, schema_id: &Id, version_number: i32)
        -> Result<Option<SchemaVersion>>;
    async fn latest_version(&self, schema_id: &Id) -> Result<Option<SchemaVersion>>;
    /// Versions newest first, capped at `limit`.
    async fn list_versions(&self, schema_id: &Id, limit: usize) -> Result<Vec<SchemaVersion>>;
    /// Manual checkpoint append, outside a structural mutation.
    async fn insert_version(&self, version: SchemaVersion) -> Result<()>;
}

#[async_trait::async_trait]
pub trait ChangeLogStore: Send + Sync {
    /// Audit entries newest first, capped at `limit`.
    async fn list_change_log(&self, schema_id: &Id, limit: usize) -> Result<Vec<ChangeLogEntry>>;
}

#[async_trait::async_trait]
pub trait MutationStore: Send + Sync {
    /// Apply one structural mutation atomically.
    async fn apply_mutation(&self, mutation: SchemaMutation) -> Result<()>;
}

pub trait Store:
    AssetTypeStore
    + SchemaStore
    + FieldStore
    + RecordStore
    + ValueStore
    + VersionStore
    + ChangeLogStore
    + MutationStore
    + Send
    + Sync
{
}

impl<T> Store for T where
    T: AssetTypeStore
        + SchemaStore
        + FieldStore
        + RecordStore
        + ValueStore
        + VersionStore
        + ChangeLogStore
        + MutationStore
        + Send
        + Sync
{
}
