use schemaforge::{
    AssetType, FieldChanges, FieldSpec, FieldType, FieldValue, ImpactAnalyzer, MemoryStore,
    MigrationGenerator, NewSchema, Record, RiskLevel, SchemaCatalog, SchemaManager,
    SchemaVersionControl, SqlDialect, ValidationEngine,
};
use schemaforge::store::traits::{AssetTypeStore, RecordStore, ValueStore, VersionStore};
use schemaforge::ForkModifications;
use serde_json::json;
use std::sync::Arc;

const ACTOR: &str = "tester";

async fn manager() -> (SchemaManager<MemoryStore>, String) {
    let store = Arc::new(MemoryStore::new());
    let asset_type = AssetType::new("Catalog".to_string(), None);
    let asset_type_id = asset_type.id.clone();
    store.insert_asset_type(asset_type).await.unwrap();
    let mgr = SchemaManager::new(store, Arc::new(SchemaCatalog::new()));
    (mgr, asset_type_id)
}

fn product_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::new("title", FieldType::String).required(Some("Untitled")),
        FieldSpec::new("price", FieldType::Float),
    ]
}

async fn create_product(
    mgr: &SchemaManager<MemoryStore>,
    asset_type_id: &str,
) -> schemaforge::SchemaDetails {
    mgr.create_schema(
        NewSchema {
            name: "Product".to_string(),
            asset_type_id: asset_type_id.to_string(),
            fields: product_fields(),
            allow_additional_fields: true,
            parent_schema_id: None,
        },
        ACTOR,
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn create_schema_writes_initial_version_and_log() {
    let (mgr, asset_type_id) = manager().await;
    let schema = create_product(&mgr, &asset_type_id).await;

    assert_eq!(schema.schema.version, 1);
    assert_eq!(schema.fields.len(), 2);
    assert_eq!(schema.fields[0].name, "title");
    assert_eq!(schema.fields[0].order_index, 0);
    assert_eq!(schema.fields[1].order_index, 1);

    let latest = SchemaVersionControl::get_latest_version(mgr.store().as_ref(), &schema.schema.id)
        .await
        .unwrap();
    assert_eq!(latest.version_number, 1);

    let history =
        SchemaVersionControl::get_change_history(mgr.store().as_ref(), &schema.schema.id, None)
            .await
            .unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn invalid_field_names_reject_the_whole_schema() {
    let (mgr, asset_type_id) = manager().await;
    let err = mgr
        .create_schema(
            NewSchema {
                name: "Broken".to_string(),
                asset_type_id: asset_type_id.clone(),
                fields: vec![
                    FieldSpec::new("9starts_with_digit", FieldType::String),
                    FieldSpec::new("fine", FieldType::String),
                ],
                allow_additional_fields: true,
                parent_schema_id: None,
            },
            ACTOR,
        )
        .await
        .unwrap_err();
    assert!(err.is_validation());

    let schemas = mgr.list_schemas(&asset_type_id, false).await.unwrap();
    assert!(schemas.is_empty());
}

#[tokio::test]
async fn schema_versions_are_scoped_to_the_asset_type() {
    let (mgr, asset_type_id) = manager().await;
    let first = create_product(&mgr, &asset_type_id).await;
    let second = mgr
        .create_schema(
            NewSchema {
                name: "Product v2".to_string(),
                asset_type_id: asset_type_id.clone(),
                fields: product_fields(),
                allow_additional_fields: true,
                parent_schema_id: None,
            },
            ACTOR,
        )
        .await
        .unwrap();

    assert_eq!(first.schema.version, 1);
    assert_eq!(second.schema.version, 2);
}

#[tokio::test]
async fn add_field_then_compare_versions() {
    let (mgr, asset_type_id) = manager().await;
    let schema = create_product(&mgr, &asset_type_id).await;

    mgr.add_field(
        &schema.schema.id,
        FieldSpec::new("sku", FieldType::String),
        ACTOR,
    )
    .await
    .unwrap();

    let diff = SchemaVersionControl::compare_versions(mgr.store().as_ref(), &schema.schema.id, 1, 2)
        .await
        .unwrap();
    assert_eq!(diff.added_fields, vec!["sku".to_string()]);
    assert!(diff.removed_fields.is_empty());
    assert!(diff.modified_fields.is_empty());
}

#[tokio::test]
async fn comparing_a_version_with_itself_is_empty() {
    let (mgr, asset_type_id) = manager().await;
    let schema = create_product(&mgr, &asset_type_id).await;

    let diff = SchemaVersionControl::compare_versions(mgr.store().as_ref(), &schema.schema.id, 1, 1)
        .await
        .unwrap();
    assert!(diff.is_empty());
}

#[tokio::test]
async fn duplicate_active_field_is_rejected() {
    let (mgr, asset_type_id) = manager().await;
    let schema = create_product(&mgr, &asset_type_id).await;

    let err = mgr
        .add_field(
            &schema.schema.id,
            FieldSpec::new("title", FieldType::String),
            ACTOR,
        )
        .await
        .unwrap_err();
    assert!(err.is_validation());
}

#[tokio::test]
async fn required_field_backfills_existing_records() {
    let (mgr, asset_type_id) = manager().await;
    let schema = create_product(&mgr, &asset_type_id).await;

    let record = Record::new(schema.schema.id.clone());
    let record_id = record.id.clone();
    mgr.store().insert_record(record).await.unwrap();

    let field = mgr
        .add_field(
            &schema.schema.id,
            FieldSpec::new("status", FieldType::String).required(Some("active")),
            ACTOR,
        )
        .await
        .unwrap();

    let cell = mgr
        .store()
        .get_value(&record_id, &field.id)
        .await
        .unwrap()
        .expect("backfilled value");
    assert_eq!(cell.value_as_json(FieldType::String), Some(json!("active")));
}

#[tokio::test]
async fn required_field_without_default_fails_when_records_exist() {
    let (mgr, asset_type_id) = manager().await;
    let schema = create_product(&mgr, &asset_type_id).await;
    mgr.store()
        .insert_record(Record::new(schema.schema.id.clone()))
        .await
        .unwrap();

    let mut spec = FieldSpec::new("mandatory", FieldType::String);
    spec.required = true;
    let err = mgr.add_field(&schema.schema.id, spec, ACTOR).await.unwrap_err();
    assert!(err.is_validation());
}

#[tokio::test]
async fn soft_deleted_field_visibility() {
    let (mgr, asset_type_id) = manager().await;
    let schema = create_product(&mgr, &asset_type_id).await;

    mgr.remove_field(&schema.schema.id, "price", false, ACTOR)
        .await
        .unwrap();

    let active = mgr.get_fields(&schema.schema.id, false).await.unwrap();
    assert!(active.iter().all(|f| f.name != "price"));

    let all = mgr.get_fields(&schema.schema.id, true).await.unwrap();
    let price = all.iter().find(|f| f.name == "price").unwrap();
    assert!(price.state.is_deleted());
}

#[tokio::test]
async fn permanent_removal_drops_values() {
    let (mgr, asset_type_id) = manager().await;
    let schema = create_product(&mgr, &asset_type_id).await;
    let price = schema.active_field("price").unwrap().clone();

    let record = Record::new(schema.schema.id.clone());
    let record_id = record.id.clone();
    mgr.store().insert_record(record).await.unwrap();
    let mut cell = FieldValue::new(record_id.clone(), price.id.clone());
    cell.set_value(FieldType::Float, Some(&json!(9.99))).unwrap();
    mgr.store().upsert_value(cell).await.unwrap();

    mgr.remove_field(&schema.schema.id, "price", true, ACTOR)
        .await
        .unwrap();

    let all = mgr.get_fields(&schema.schema.id, true).await.unwrap();
    assert!(all.iter().all(|f| f.name != "price"));
    assert!(mgr
        .store()
        .get_value(&record_id, &price.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn rollback_removes_a_field_added_later() {
    let (mgr, asset_type_id) = manager().await;
    let schema = create_product(&mgr, &asset_type_id).await;
    mgr.add_field(
        &schema.schema.id,
        FieldSpec::new("sku", FieldType::String),
        ACTOR,
    )
    .await
    .unwrap();

    let outcome = SchemaVersionControl::rollback(
        mgr.store().as_ref(),
        mgr.catalog().as_ref(),
        &schema.schema.id,
        1,
        true,
        ACTOR,
    )
    .await
    .unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.from_version, 2);
    assert_eq!(outcome.to_version, 1);
    assert_eq!(outcome.changes.len(), 1);

    let active = mgr.get_fields(&schema.schema.id, false).await.unwrap();
    let names: Vec<_> = active.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["title", "price"]);
}

#[tokio::test]
async fn rollback_restores_a_soft_deleted_field() {
    let (mgr, asset_type_id) = manager().await;
    let schema = create_product(&mgr, &asset_type_id).await;
    mgr.add_field(
        &schema.schema.id,
        FieldSpec::new("sku", FieldType::String),
        ACTOR,
    )
    .await
    .unwrap();
    mgr.remove_field(&schema.schema.id, "sku", false, ACTOR)
        .await
        .unwrap();

    // Back to version 2, where sku was live.
    let outcome = SchemaVersionControl::rollback(
        mgr.store().as_ref(),
        mgr.catalog().as_ref(),
        &schema.schema.id,
        2,
        true,
        ACTOR,
    )
    .await
    .unwrap();
    assert!(outcome.success);
    assert!(outcome.changes.iter().any(|c| c.contains("restored")));

    let active = mgr.get_fields(&schema.schema.id, false).await.unwrap();
    assert!(active.iter().any(|f| f.name == "sku"));
}

#[tokio::test]
async fn add_remove_rollback_round_trip_matches_pre_add_state() {
    let (mgr, asset_type_id) = manager().await;
    let schema = create_product(&mgr, &asset_type_id).await;
    let pre_add: Vec<String> = mgr
        .get_fields(&schema.schema.id, false)
        .await
        .unwrap()
        .into_iter()
        .map(|f| f.name)
        .collect();

    mgr.add_field(
        &schema.schema.id,
        FieldSpec::new("sku", FieldType::String),
        ACTOR,
    )
    .await
    .unwrap();
    mgr.remove_field(&schema.schema.id, "sku", false, ACTOR)
        .await
        .unwrap();
    let active: Vec<String> = mgr
        .get_fields(&schema.schema.id, false)
        .await
        .unwrap()
        .into_iter()
        .map(|f| f.name)
        .collect();
    assert!(!active.contains(&"sku".to_string()));

    let outcome = SchemaVersionControl::rollback(
        mgr.store().as_ref(),
        mgr.catalog().as_ref(),
        &schema.schema.id,
        1,
        true,
        ACTOR,
    )
    .await
    .unwrap();
    assert!(outcome.success);

    let after: Vec<String> = mgr
        .get_fields(&schema.schema.id, false)
        .await
        .unwrap()
        .into_iter()
        .map(|f| f.name)
        .collect();
    assert_eq!(after, pre_add);
}

#[tokio::test]
async fn type_change_with_incompatible_values_fails_and_leaves_type() {
    let (mgr, asset_type_id) = manager().await;
    let schema = create_product(&mgr, &asset_type_id).await;
    let price = schema.active_field("price").unwrap().clone();

    let record = Record::new(schema.schema.id.clone());
    mgr.store().insert_record(record.clone()).await.unwrap();
    let mut cell = FieldValue::new(record.id.clone(), price.id.clone());
    cell.set_value(FieldType::Float, Some(&json!("3.14"))).unwrap();
    mgr.store().upsert_value(cell).await.unwrap();

    let err = mgr
        .modify_field(
            &schema.schema.id,
            "price",
            FieldChanges {
                new_type: Some(FieldType::Boolean),
                ..Default::default()
            },
            ACTOR,
        )
        .await
        .unwrap_err();
    assert!(err.is_validation());

    let fields = mgr.get_fields(&schema.schema.id, false).await.unwrap();
    let price = fields.iter().find(|f| f.name == "price").unwrap();
    assert_eq!(price.field_type, FieldType::Float);
}

#[tokio::test]
async fn type_change_migrates_stored_values() {
    let (mgr, asset_type_id) = manager().await;
    let schema = create_product(&mgr, &asset_type_id).await;
    let price = schema.active_field("price").unwrap().clone();

    let record = Record::new(schema.schema.id.clone());
    mgr.store().insert_record(record.clone()).await.unwrap();
    let mut cell = FieldValue::new(record.id.clone(), price.id.clone());
    cell.set_value(FieldType::Float, Some(&json!(3.5))).unwrap();
    mgr.store().upsert_value(cell).await.unwrap();

    let updated = mgr
        .modify_field(
            &schema.schema.id,
            "price",
            FieldChanges {
                new_type: Some(FieldType::String),
                ..Default::default()
            },
            ACTOR,
        )
        .await
        .unwrap();
    assert_eq!(updated.field_type, FieldType::String);

    let migrated = mgr
        .store()
        .get_value(&record.id, &price.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(migrated.value_as_json(FieldType::String), Some(json!("3.5")));
    // The old slot is cleared by the migration.
    assert_eq!(migrated.value_float, None);
}

#[tokio::test]
async fn modify_with_no_changes_is_a_no_op() {
    let (mgr, asset_type_id) = manager().await;
    let schema = create_product(&mgr, &asset_type_id).await;

    mgr.modify_field(&schema.schema.id, "price", FieldChanges::default(), ACTOR)
        .await
        .unwrap();

    let versions =
        SchemaVersionControl::list_versions(mgr.store().as_ref(), &schema.schema.id, None)
            .await
            .unwrap();
    assert_eq!(versions.len(), 1);
    let history =
        SchemaVersionControl::get_change_history(mgr.store().as_ref(), &schema.schema.id, None)
            .await
            .unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn fork_copies_fields_and_applies_modifications() {
    let (mgr, asset_type_id) = manager().await;
    let schema = create_product(&mgr, &asset_type_id).await;

    let fork = mgr
        .fork_schema(
            &schema.schema.id,
            "Product Variant",
            Some(ForkModifications {
                add_fields: vec![FieldSpec::new("variant", FieldType::String)],
                remove_fields: vec!["price".to_string()],
            }),
            ACTOR,
        )
        .await
        .unwrap();

    assert_eq!(fork.schema.parent_schema_id, Some(schema.schema.id.clone()));
    let names: Vec<_> = fork.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["title", "variant"]);
    // Forks allocate the next version for the asset type.
    assert_eq!(fork.schema.version, 2);
}

#[tokio::test]
async fn concurrent_adds_on_different_schemas_both_succeed() {
    let (mgr, asset_type_id) = manager().await;
    let mgr = Arc::new(mgr);
    let first = create_product(&mgr, &asset_type_id).await;
    let second = mgr
        .fork_schema(&first.schema.id, "Product B", None, ACTOR)
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        mgr.add_field(&first.schema.id, FieldSpec::new("sku", FieldType::String), ACTOR),
        mgr.add_field(&second.schema.id, FieldSpec::new("sku", FieldType::String), ACTOR),
    );
    a.unwrap();
    b.unwrap();
}

#[tokio::test]
async fn concurrent_adds_on_the_same_schema_serialize() {
    let (mgr, asset_type_id) = manager().await;
    let mgr = Arc::new(mgr);
    let schema = create_product(&mgr, &asset_type_id).await;

    let (a, b) = tokio::join!(
        mgr.add_field(&schema.schema.id, FieldSpec::new("alpha", FieldType::String), ACTOR),
        mgr.add_field(&schema.schema.id, FieldSpec::new("beta", FieldType::String), ACTOR),
    );
    let a = a.unwrap();
    let b = b.unwrap();

    // Serialized execution assigns distinct order indexes.
    assert_ne!(a.order_index, b.order_index);
    let versions =
        SchemaVersionControl::list_versions(mgr.store().as_ref(), &schema.schema.id, None)
            .await
            .unwrap();
    assert_eq!(versions.len(), 3);
    assert_eq!(versions[0].version_number, 3);
}

#[tokio::test]
async fn not_found_errors_are_distinct_from_validation() {
    let (mgr, _) = manager().await;
    let err = mgr
        .add_field(
            &"missing".to_string(),
            FieldSpec::new("x", FieldType::String),
            ACTOR,
        )
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(!err.is_validation());
}

#[tokio::test]
async fn catalog_reflects_mutations_immediately() {
    let (mgr, asset_type_id) = manager().await;
    let schema = create_product(&mgr, &asset_type_id).await;

    // Prime the cache, mutate, and read again through the cache.
    mgr.get_fields(&schema.schema.id, false).await.unwrap();
    mgr.add_field(
        &schema.schema.id,
        FieldSpec::new("sku", FieldType::String),
        ACTOR,
    )
    .await
    .unwrap();

    let fields = mgr.get_fields(&schema.schema.id, false).await.unwrap();
    assert!(fields.iter().any(|f| f.name == "sku"));

    let stats = mgr.get_statistics(&schema.schema.id).await.unwrap();
    assert_eq!(stats.field_count, 3);
    assert_eq!(stats.record_count, 0);
}

#[tokio::test]
async fn migration_script_tracks_the_version_diff() {
    let (mgr, asset_type_id) = manager().await;
    let schema = create_product(&mgr, &asset_type_id).await;
    mgr.add_field(
        &schema.schema.id,
        FieldSpec::new("sku", FieldType::String),
        ACTOR,
    )
    .await
    .unwrap();
    mgr.remove_field(&schema.schema.id, "price", false, ACTOR)
        .await
        .unwrap();

    let migration = MigrationGenerator::generate_migration(
        mgr.store().as_ref(),
        &schema.schema.id,
        1,
        3,
        SqlDialect::Postgresql,
    )
    .await
    .unwrap();

    assert!(migration.script.contains("BEGIN TRANSACTION;"));
    assert!(migration.script.contains("COMMIT;"));
    assert!(migration
        .script
        .contains("ADD COLUMN sku TEXT"));
    assert!(migration.script.contains("DROP COLUMN price;"));
    assert_eq!(migration.from_version, 1);
    assert_eq!(migration.to_version, 3);

    let rollback = MigrationGenerator::generate_rollback_script(
        mgr.store().as_ref(),
        &schema.schema.id,
        1,
        3,
        SqlDialect::Postgresql,
    )
    .await
    .unwrap();
    assert!(rollback.script.contains("DROP COLUMN sku;"));
}

#[tokio::test]
async fn full_schema_ddl_covers_active_fields() {
    let (mgr, asset_type_id) = manager().await;
    let schema = create_product(&mgr, &asset_type_id).await;

    let ddl = MigrationGenerator::generate_full_schema_ddl(
        mgr.store().as_ref(),
        &schema.schema.id,
        SqlDialect::Sqlite,
    )
    .await
    .unwrap();

    assert!(ddl.contains("CREATE TABLE metadata_record_product"));
    assert!(ddl.contains("price REAL"));
    assert!(ddl.contains("title TEXT NOT NULL"));
    assert!(ddl.contains("CREATE INDEX idx_metadata_record_product_record_id"));
}

#[tokio::test]
async fn impact_reports_rank_risk() {
    let (mgr, asset_type_id) = manager().await;
    let schema = create_product(&mgr, &asset_type_id).await;
    let price = schema.active_field("price").unwrap().clone();

    let record = Record::new(schema.schema.id.clone());
    mgr.store().insert_record(record.clone()).await.unwrap();
    let mut cell = FieldValue::new(record.id.clone(), price.id.clone());
    cell.set_value(FieldType::Float, Some(&json!(1.0))).unwrap();
    mgr.store().upsert_value(cell).await.unwrap();

    let addition = ImpactAnalyzer::analyze_field_addition(
        mgr.store().as_ref(),
        &schema.schema.id,
        &FieldSpec::new("status", FieldType::String).required(Some("active")),
    )
    .await
    .unwrap();
    assert_eq!(addition.risk, RiskLevel::Medium);
    assert_eq!(addition.affected_records, 1);

    let removal = ImpactAnalyzer::analyze_field_removal(
        mgr.store().as_ref(),
        &schema.schema.id,
        "price",
    )
    .await
    .unwrap();
    assert_eq!(removal.risk, RiskLevel::High);
    assert!(removal.soft_delete_recommended);

    let type_change = ImpactAnalyzer::analyze_type_change(
        mgr.store().as_ref(),
        &schema.schema.id,
        "price",
        FieldType::String,
    )
    .await
    .unwrap();
    assert!(type_change.compatible);
    assert!(type_change.reversible);
    assert_eq!(type_change.risk, RiskLevel::Medium);
}

#[tokio::test]
async fn manual_snapshot_appends_the_next_version() {
    let (mgr, asset_type_id) = manager().await;
    let schema = create_product(&mgr, &asset_type_id).await;

    let checkpoint = SchemaVersionControl::create_snapshot(
        mgr.store().as_ref(),
        &schema.schema.id,
        "pre-release checkpoint".to_string(),
        ACTOR,
    )
    .await
    .unwrap();
    assert_eq!(checkpoint.version_number, 2);
    assert_eq!(checkpoint.change_summary, "pre-release checkpoint");
}

#[tokio::test]
async fn field_history_filters_by_field_name() {
    let (mgr, asset_type_id) = manager().await;
    let schema = create_product(&mgr, &asset_type_id).await;
    mgr.add_field(
        &schema.schema.id,
        FieldSpec::new("sku", FieldType::String),
        ACTOR,
    )
    .await
    .unwrap();
    mgr.remove_field(&schema.schema.id, "sku", false, ACTOR)
        .await
        .unwrap();

    let history =
        SchemaVersionControl::get_field_history(mgr.store().as_ref(), &schema.schema.id, "sku")
            .await
            .unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|e| e.details["field_name"] == "sku"));
}

#[tokio::test]
async fn rollback_to_a_missing_version_reports_failure() {
    let (mgr, asset_type_id) = manager().await;
    let schema = create_product(&mgr, &asset_type_id).await;

    let outcome = SchemaVersionControl::rollback(
        mgr.store().as_ref(),
        mgr.catalog().as_ref(),
        &schema.schema.id,
        99,
        true,
        ACTOR,
    )
    .await
    .unwrap();
    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains("99"));

    // Nothing was touched.
    let fields = mgr.get_fields(&schema.schema.id, false).await.unwrap();
    assert_eq!(fields.len(), 2);
}

#[tokio::test]
async fn rollback_to_the_current_shape_is_a_no_op() {
    let (mgr, asset_type_id) = manager().await;
    let schema = create_product(&mgr, &asset_type_id).await;

    let outcome = SchemaVersionControl::rollback(
        mgr.store().as_ref(),
        mgr.catalog().as_ref(),
        &schema.schema.id,
        1,
        true,
        ACTOR,
    )
    .await
    .unwrap();
    assert!(outcome.success);
    assert!(outcome.changes.is_empty());

    let history =
        SchemaVersionControl::get_change_history(mgr.store().as_ref(), &schema.schema.id, None)
            .await
            .unwrap();
    // Only the creation entry; a no-op rollback writes no audit entry.
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn missing_required_field_is_flagged_despite_default() {
    let (mgr, asset_type_id) = manager().await;
    let schema = create_product(&mgr, &asset_type_id).await;
    let details = mgr.get_schema(&schema.schema.id).await.unwrap();

    // `title` is required with default "Untitled"; an empty payload must
    // still report it missing.
    let errors = ValidationEngine::validate_record_values(&details, &serde_json::Map::new());
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field, "title");
    assert!(errors[0].message.contains("required field is missing"));

    let mut payload = serde_json::Map::new();
    payload.insert("title".to_string(), json!("Gravel bike"));
    assert!(ValidationEngine::validate_record_values(&details, &payload).is_empty());
}

#[tokio::test]
async fn duplicate_version_numbers_are_rejected() {
    let (mgr, asset_type_id) = manager().await;
    let schema = create_product(&mgr, &asset_type_id).await;

    // Re-inserting version 1 under a fresh row id must hit the
    // (schema_id, version_number) uniqueness rule, not append silently.
    let mut duplicate =
        SchemaVersionControl::get_version(mgr.store().as_ref(), &schema.schema.id, 1)
            .await
            .unwrap();
    duplicate.id = schemaforge::generate_id();
    assert!(mgr.store().insert_version(duplicate).await.is_err());

    let versions =
        SchemaVersionControl::list_versions(mgr.store().as_ref(), &schema.schema.id, None)
            .await
            .unwrap();
    assert_eq!(versions.len(), 1);
}
