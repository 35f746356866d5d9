use crate::model::{AssetType, Id, SchemaDetails, SchemaField, SchemaStatistics};
use crate::store::traits::Store;
use anyhow::Result;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Structured cache key: (entity kind, id) instead of composed strings, so
/// invalidation is exact rather than substring-matched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CacheKey {
    Schema(Id),
    Fields { schema_id: Id, include_deleted: bool },
    SchemaList { asset_type_id: Id, active_only: bool },
    Stats(Id),
    AssetType(Id),
    AssetTypes,
}

#[derive(Debug, Clone)]
enum CachedValue {
    Schema(SchemaDetails),
    Fields(Vec<SchemaField>),
    SchemaList(Vec<SchemaDetails>),
    Stats(SchemaStatistics),
    AssetType(AssetType),
    AssetTypes(Vec<AssetType>),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CachedValue,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_fresh(&self) -> bool {
        self.inserted_at.elapsed() < self.ttl
    }
}

/// Cache introspection snapshot.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CatalogStats {
    pub size: usize,
    pub metadata_ttl_secs: u64,
    pub stats_ttl_secs: u64,
}

/// Read-through, TTL-based cache over schema/field/asset-type metadata.
///
/// A lookup is a hit only while the entry is younger than its TTL; expired
/// entries are evicted on read and recomputed from the store. All access is
/// serialized behind one mutex, which is sufficient for a single process;
/// independent processes each carry their own cache and may observe
/// staleness up to the TTL.
#[derive(Debug)]
pub struct SchemaCatalog {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    metadata_ttl: Duration,
    stats_ttl: Duration,
}

impl SchemaCatalog {
    pub const DEFAULT_METADATA_TTL: Duration = Duration::from_secs(300);
    pub const DEFAULT_STATS_TTL: Duration = Duration::from_secs(60);

    pub fn new() -> Self {
        Self::with_ttls(Self::DEFAULT_METADATA_TTL, Self::DEFAULT_STATS_TTL)
    }

    pub fn with_ttls(metadata_ttl: Duration, stats_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            metadata_ttl,
            stats_ttl,
        }
    }

    /// Schema with its active fields, cached under the metadata TTL.
    pub async fn get_schema<S: Store>(
        &self,
        store: &S,
        schema_id: &Id,
    ) -> Result<Option<SchemaDetails>> {
        let key = CacheKey::Schema(schema_id.clone());
        if let Some(CachedValue::Schema(details)) = self.lookup(&key) {
            return Ok(Some(details));
        }

        let Some(schema) = store.get_schema(schema_id).await? else {
            return Ok(None);
        };
        let fields = store.list_fields(schema_id, false).await?;
        let details = SchemaDetails { schema, fields };
        self.insert(key, CachedValue::Schema(details.clone()), self.metadata_ttl);
        Ok(Some(details))
    }

    /// Fields of a schema, ordered, optionally including soft-deleted rows.
    pub async fn get_fields<S: Store>(
        &self,
        store: &S,
        schema_id: &Id,
        include_deleted: bool,
    ) -> Result<Vec<SchemaField>> {
        let key = CacheKey::Fields {
            schema_id: schema_id.clone(),
            include_deleted,
        };
        if let Some(CachedValue::Fields(fields)) = self.lookup(&key) {
            return Ok(fields);
        }

        let fields = store.list_fields(schema_id, include_deleted).await?;
        self.insert(key, CachedValue::Fields(fields.clone()), self.metadata_ttl);
        Ok(fields)
    }

    /// Single-field lookup; served from the store, not cached.
    pub async fn get_field<S: Store>(
        &self,
        store: &S,
        schema_id: &Id,
        name: &str,
    ) -> Result<Option<SchemaField>> {
        store.get_active_field(schema_id, name).await
    }

    pub async fn field_exists<S: Store>(
        &self,
        store: &S,
        schema_id: &Id,
        name: &str,
    ) -> Result<bool> {
        Ok(self.get_field(store, schema_id, name).await?.is_some())
    }

    pub async fn get_schemas_by_asset_type<S: Store>(
        &self,
        store: &S,
        asset_type_id: &Id,
        active_only: bool,
    ) -> Result<Vec<SchemaDetails>> {
        let key = CacheKey::SchemaList {
            asset_type_id: asset_type_id.clone(),
            active_only,
        };
        if let Some(CachedValue::SchemaList(schemas)) = self.lookup(&key) {
            return Ok(schemas);
        }

        let schemas = store
            .list_schemas_for_asset_type(asset_type_id, active_only)
            .await?;
        let mut details = Vec::with_capacity(schemas.len());
        for schema in schemas {
            let fields = store.list_fields(&schema.id, false).await?;
            details.push(SchemaDetails { schema, fields });
        }
        self.insert(
            key,
            CachedValue::SchemaList(details.clone()),
            self.metadata_ttl,
        );
        Ok(details)
    }

    pub async fn get_asset_type<S: Store>(
        &self,
        store: &S,
        asset_type_id: &Id,
    ) -> Result<Option<AssetType>> {
        let key = CacheKey::AssetType(asset_type_id.clone());
        if let Some(CachedValue::AssetType(at)) = self.lookup(&key) {
            return Ok(Some(at));
        }
        let Some(asset_type) = store.get_asset_type(asset_type_id).await? else {
            return Ok(None);
        };
        self.insert(
            key,
            CachedValue::AssetType(asset_type.clone()),
            self.metadata_ttl,
        );
        Ok(Some(asset_type))
    }

    pub async fn get_all_asset_types<S: Store>(&self, store: &S) -> Result<Vec<AssetType>> {
        if let Some(CachedValue::AssetTypes(list)) = self.lookup(&CacheKey::AssetTypes) {
            return Ok(list);
        }
        let list = store.list_asset_types().await?;
        self.insert(
            CacheKey::AssetTypes,
            CachedValue::AssetTypes(list.clone()),
            self.metadata_ttl,
        );
        Ok(list)
    }

    /// Usage statistics, cached under the shorter statistics TTL.
    pub async fn get_schema_statistics<S: Store>(
        &self,
        store: &S,
        schema_id: &Id,
    ) -> Result<SchemaStatistics> {
        let key = CacheKey::Stats(schema_id.clone());
        if let Some(CachedValue::Stats(stats)) = self.lookup(&key) {
            return Ok(stats);
        }

        let record_count = store.count_records(schema_id).await?;
        let field_count = store.list_fields(schema_id, false).await?.len();
        let stats = SchemaStatistics {
            schema_id: schema_id.clone(),
            record_count,
            field_count,
            computed_at: Utc::now(),
        };
        self.insert(key, CachedValue::Stats(stats.clone()), self.stats_ttl);
        Ok(stats)
    }

    /// Drop every entry derived from this schema. Schema lists are dropped
    /// wholesale because list membership is not tracked per schema.
    pub fn invalidate_schema(&self, schema_id: &Id) {
        let mut entries = self.entries.lock();
        entries.retain(|key, _| match key {
            CacheKey::Schema(id) | CacheKey::Stats(id) => id != schema_id,
            CacheKey::Fields { schema_id: id, .. } => id != schema_id,
            CacheKey::SchemaList { .. } => false,
            CacheKey::AssetType(_) | CacheKey::AssetTypes => true,
        });
    }

    /// Drop every entry derived from this asset type.
    pub fn invalidate_asset_type(&self, asset_type_id: &Id) {
        let mut entries = self.entries.lock();
        entries.retain(|key, _| match key {
            CacheKey::AssetType(id) => id != asset_type_id,
            CacheKey::SchemaList { asset_type_id: id, .. } => id != asset_type_id,
            CacheKey::AssetTypes => false,
            _ => true,
        });
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn stats(&self) -> CatalogStats {
        CatalogStats {
            size: self.entries.lock().len(),
            metadata_ttl_secs: self.metadata_ttl.as_secs(),
            stats_ttl_secs: self.stats_ttl.as_secs(),
        }
    }

    fn lookup(&self, key: &CacheKey) -> Option<CachedValue> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_fresh() => return Some(entry.value.clone()),
            Some(_) => {}
            None => return None,
        }
        entries.remove(key);
        None
    }

    fn insert(&self, key: CacheKey, value: CachedValue, ttl: Duration) {
        self.entries.lock().insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                ttl,
            },
        );
    }
}

impl Default for SchemaCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AssetType, FieldSpec, FieldType, Record, Schema, SchemaField};
    use crate::store::memory::MemoryStore;
    use crate::store::traits::{
        AssetTypeStore, MutationStore, RecordStore, SchemaMutation,
    };
    use crate::model::{ChangeKind, ChangeLogEntry, SchemaSnapshot, SchemaVersion};
    use crate::store::traits::FieldWrite;
    use chrono::Utc;

    async fn seed_schema(store: &MemoryStore) -> Id {
        let asset_type = AssetType::new("Image".to_string(), None);
        let asset_type_id = asset_type.id.clone();
        store.insert_asset_type(asset_type).await.unwrap();

        let schema = Schema {
            id: crate::model::generate_id(),
            name: "Photo".to_string(),
            version: 1,
            asset_type_id,
            parent_schema_id: None,
            allow_additional_fields: true,
            is_active: true,
            created_by: "tester".to_string(),
            created_at: Utc::now(),
        };
        let schema_id = schema.id.clone();
        let field = SchemaField::from_spec(
            schema_id.clone(),
            &FieldSpec::new("title", FieldType::String),
            0,
        );
        let snapshot = SchemaSnapshot::capture(&schema, &[field.clone()]);
        store
            .apply_mutation(SchemaMutation {
                schema_id: schema_id.clone(),
                new_schema: Some(schema),
                field_writes: vec![FieldWrite::Insert(field)],
                value_upserts: vec![],
                log_entry: ChangeLogEntry::new(
                    schema_id.clone(),
                    ChangeKind::Created,
                    "created".to_string(),
                    serde_json::json!({}),
                    snapshot.clone(),
                    "tester".to_string(),
                ),
                version: Some(SchemaVersion::new(
                    schema_id.clone(),
                    1,
                    snapshot,
                    "initial".to_string(),
                    "tester".to_string(),
                )),
            })
            .await
            .unwrap();
        schema_id
    }

    #[tokio::test]
    async fn read_through_and_exact_invalidation() {
        let store = MemoryStore::new();
        let catalog = SchemaCatalog::new();
        let schema_id = seed_schema(&store).await;

        let details = catalog.get_schema(&store, &schema_id).await.unwrap().unwrap();
        assert_eq!(details.fields.len(), 1);
        assert_eq!(catalog.stats().size, 1);

        catalog.invalidate_schema(&schema_id);
        assert_eq!(catalog.stats().size, 0);
    }

    #[tokio::test]
    async fn expired_entries_are_recomputed() {
        let store = MemoryStore::new();
        let catalog =
            SchemaCatalog::with_ttls(Duration::from_millis(0), Duration::from_millis(0));
        let schema_id = seed_schema(&store).await;

        catalog.get_fields(&store, &schema_id, false).await.unwrap();
        // Zero TTL: the entry is already stale and must be evicted on read.
        let fields = catalog.get_fields(&store, &schema_id, false).await.unwrap();
        assert_eq!(fields.len(), 1);
        assert!(catalog.stats().size <= 1);
    }

    #[tokio::test]
    async fn statistics_use_short_ttl_and_count_records() {
        let store = MemoryStore::new();
        let catalog = SchemaCatalog::new();
        let schema_id = seed_schema(&store).await;
        store
            .insert_record(Record::new(schema_id.clone()))
            .await
            .unwrap();

        let stats = catalog
            .get_schema_statistics(&store, &schema_id)
            .await
            .unwrap();
        assert_eq!(stats.record_count, 1);
        assert_eq!(stats.field_count, 1);
    }

    #[tokio::test]
    async fn asset_type_invalidation_drops_lists() {
        let store = MemoryStore::new();
        let catalog = SchemaCatalog::new();
        let schema_id = seed_schema(&store).await;
        let details = catalog.get_schema(&store, &schema_id).await.unwrap().unwrap();
        let asset_type_id = details.schema.asset_type_id.clone();

        catalog
            .get_schemas_by_asset_type(&store, &asset_type_id, true)
            .await
            .unwrap();
        catalog.get_all_asset_types(&store).await.unwrap();

        catalog.invalidate_asset_type(&asset_type_id);
        // Schema detail entry survives; the asset-type-derived entries do not.
        assert_eq!(catalog.stats().size, 1);
    }
}
