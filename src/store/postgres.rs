use anyhow::{anyhow, Context, Result};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Row};

use crate::model::{
    AssetType, ChangeKind, ChangeLogEntry, FieldConstraints, FieldState, FieldType, FieldValue,
    Id, Record, Schema, SchemaField, SchemaSnapshot, SchemaVersion,
};
use crate::store::traits::{
    AssetTypeStore, ChangeLogStore, FieldStore, FieldWrite, MutationStore, RecordStore,
    SchemaMutation, SchemaStore, ValueStore, VersionStore,
};

/// PostgreSQL-backed store. Every `apply_mutation` runs in one transaction.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS asset_types (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    created_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS schemas (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    version INTEGER NOT NULL,
    asset_type_id TEXT NOT NULL REFERENCES asset_types(id),
    parent_schema_id TEXT REFERENCES schemas(id),
    allow_additional_fields BOOLEAN NOT NULL,
    is_active BOOLEAN NOT NULL,
    created_by TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS schema_fields (
    id TEXT PRIMARY KEY,
    schema_id TEXT NOT NULL REFERENCES schemas(id),
    name TEXT NOT NULL,
    field_type TEXT NOT NULL,
    required BOOLEAN NOT NULL,
    default_value TEXT,
    constraints JSONB,
    description TEXT,
    order_index INTEGER NOT NULL,
    state TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);

-- The field-name uniqueness invariant holds among active fields only.
CREATE UNIQUE INDEX IF NOT EXISTS uq_schema_fields_active_name
    ON schema_fields(schema_id, name) WHERE state = 'active';

CREATE TABLE IF NOT EXISTS records (
    id TEXT PRIMARY KEY,
    schema_id TEXT NOT NULL REFERENCES schemas(id),
    created_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS field_values (
    id TEXT PRIMARY KEY,
    record_id TEXT NOT NULL REFERENCES records(id) ON DELETE CASCADE,
    field_id TEXT NOT NULL REFERENCES schema_fields(id) ON DELETE CASCADE,
    value_text TEXT,
    value_int BIGINT,
    value_float DOUBLE PRECISION,
    value_bool BOOLEAN,
    value_date TIMESTAMPTZ,
    value_json JSONB,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    UNIQUE (record_id, field_id)
);

CREATE TABLE IF NOT EXISTS schema_versions (
    id TEXT PRIMARY KEY,
    schema_id TEXT NOT NULL REFERENCES schemas(id),
    version_number INTEGER NOT NULL,
    snapshot JSONB NOT NULL,
    change_summary TEXT NOT NULL,
    created_by TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    UNIQUE (schema_id, version_number)
);

CREATE TABLE IF NOT EXISTS change_logs (
    id TEXT PRIMARY KEY,
    schema_id TEXT NOT NULL REFERENCES schemas(id),
    change_type TEXT NOT NULL,
    description TEXT NOT NULL,
    details JSONB NOT NULL,
    snapshot JSONB NOT NULL,
    changed_by TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL
);
"#;

impl PostgresStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    /// Create the relational layout if it does not exist yet.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(DDL)
            .execute(&self.pool)
            .await
            .context("Failed to create schema tables")?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn schema_from_row(row: &PgRow) -> Result<Schema> {
    Ok(Schema {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        version: row.try_get("version")?,
        asset_type_id: row.try_get("asset_type_id")?,
        parent_schema_id: row.try_get("parent_schema_id")?,
        allow_additional_fields: row.try_get("allow_additional_fields")?,
        is_active: row.try_get("is_active")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
    })
}

fn field_from_row(row: &PgRow) -> Result<SchemaField> {
    let type_tag: String = row.try_get("field_type")?;
    let field_type = FieldType::parse(&type_tag)
        .ok_or_else(|| anyhow!("unknown field type tag '{}'", type_tag))?;
    let state_tag: String = row.try_get("state")?;
    let state = match state_tag.as_str() {
        "active" => FieldState::Active,
        "deleted" => FieldState::Deleted,
        other => return Err(anyhow!("unknown field state '{}'", other)),
    };
    let constraints: Option<serde_json::Value> = row.try_get("constraints")?;
    let constraints = constraints
        .map(serde_json::from_value::<FieldConstraints>)
        .transpose()
        .context("Failed to decode field constraints")?;

    Ok(SchemaField {
        id: row.try_get("id")?,
        schema_id: row.try_get("schema_id")?,
        name: row.try_get("name")?,
        field_type,
        required: row.try_get("required")?,
        default_value: row.try_get("default_value")?,
        constraints,
        description: row.try_get("description")?,
        order_index: row.try_get("order_index")?,
        state,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn value_from_row(row: &PgRow) -> Result<FieldValue> {
    Ok(FieldValue {
        id: row.try_get("id")?,
        record_id: row.try_get("record_id")?,
        field_id: row.try_get("field_id")?,
        value_text: row.try_get("value_text")?,
        value_int: row.try_get("value_int")?,
        value_float: row.try_get("value_float")?,
        value_bool: row.try_get("value_bool")?,
        value_date: row.try_get("value_date")?,
        value_json: row.try_get("value_json")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn version_from_row(row: &PgRow) -> Result<SchemaVersion> {
    let snapshot: serde_json::Value = row.try_get("snapshot")?;
    Ok(SchemaVersion {
        id: row.try_get("id")?,
        schema_id: row.try_get("schema_id")?,
        version_number: row.try_get("version_number")?,
        snapshot: serde_json::from_value::<SchemaSnapshot>(snapshot)
            .context("Failed to decode version snapshot")?,
        change_summary: row.try_get("change_summary")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
    })
}

fn log_from_row(row: &PgRow) -> Result<ChangeLogEntry> {
    let tag: String = row.try_get("change_type")?;
    let change_type =
        ChangeKind::parse(&tag).ok_or_else(|| anyhow!("unknown change type '{}'", tag))?;
    let snapshot: serde_json::Value = row.try_get("snapshot")?;
    Ok(ChangeLogEntry {
        id: row.try_get("id")?,
        schema_id: row.try_get("schema_id")?,
        change_type,
        description: row.try_get("description")?,
        details: row.try_get("details")?,
        snapshot: serde_json::from_value::<SchemaSnapshot>(snapshot)
            .context("Failed to decode change log snapshot")?,
        changed_by: row.try_get("changed_by")?,
        created_at: row.try_get("created_at")?,
    })
}

async fn insert_field_row(conn: &mut PgConnection, field: &SchemaField) -> Result<()> {
    let constraints = field
        .constraints
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .context("Failed to encode field constraints")?;
    sqlx::query(
        r#"
        INSERT INTO schema_fields
            (id, schema_id, name, field_type, required, default_value, constraints,
             description, order_index, state, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(&field.id)
    .bind(&field.schema_id)
    .bind(&field.name)
    .bind(field.field_type.as_str())
    .bind(field.required)
    .bind(&field.default_value)
    .bind(constraints)
    .bind(&field.description)
    .bind(field.order_index)
    .bind(if field.state.is_deleted() { "deleted" } else { "active" })
    .bind(field.created_at)
    .bind(field.updated_at)
    .execute(conn)
    .await
    .context("Failed to insert schema field")?;
    Ok(())
}

async fn update_field_row(conn: &mut PgConnection, field: &SchemaField) -> Result<()> {
    let constraints = field
        .constraints
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .context("Failed to encode field constraints")?;
    sqlx::query(
        r#"
        UPDATE schema_fields SET
            name = $2, field_type = $3, required = $4, default_value = $5,
            constraints = $6, description = $7, order_index = $8, state = $9,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(&field.id)
    .bind(&field.name)
    .bind(field.field_type.as_str())
    .bind(field.required)
    .bind(&field.default_value)
    .bind(constraints)
    .bind(&field.description)
    .bind(field.order_index)
    .bind(if field.state.is_deleted() { "deleted" } else { "active" })
    .execute(conn)
    .await
    .context("Failed to update schema field")?;
    Ok(())
}

async fn set_field_state(conn: &mut PgConnection, field_id: &Id, state: &str) -> Result<()> {
    let result = sqlx::query(
        "UPDATE schema_fields SET state = $2, updated_at = NOW() WHERE id = $1",
    )
    .bind(field_id)
    .bind(state)
    .execute(conn)
    .await
    .context("Failed to change field state")?;
    if result.rows_affected() == 0 {
        return Err(anyhow!("field '{}' does not exist", field_id));
    }
    Ok(())
}

async fn upsert_value_row(conn: &mut PgConnection, value: &FieldValue) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO field_values
            (id, record_id, field_id, value_text, value_int, value_float,
             value_bool, value_date, value_json, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (record_id, field_id) DO UPDATE SET
            value_text = EXCLUDED.value_text,
            value_int = EXCLUDED.value_int,
            value_float = EXCLUDED.value_float,
            value_bool = EXCLUDED.value_bool,
            value_date = EXCLUDED.value_date,
            value_json = EXCLUDED.value_json,
            updated_at = NOW()
        "#,
    )
    .bind(&value.id)
    .bind(&value.record_id)
    .bind(&value.field_id)
    .bind(&value.value_text)
    .bind(value.value_int)
    .bind(value.value_float)
    .bind(value.value_bool)
    .bind(value.value_date)
    .bind(&value.value_json)
    .bind(value.created_at)
    .bind(value.updated_at)
    .execute(conn)
    .await
    .context("Failed to upsert field value")?;
    Ok(())
}

async fn insert_version_row(conn: &mut PgConnection, version: &SchemaVersion) -> Result<()> {
    let snapshot =
        serde_json::to_value(&version.snapshot).context("Failed to encode version snapshot")?;
    sqlx::query(
        r#"
        INSERT INTO schema_versions
            (id, schema_id, version_number, snapshot, change_summary, created_by, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(&version.id)
    .bind(&version.schema_id)
    .bind(version.version_number)
    .bind(snapshot)
    .bind(&version.change_summary)
    .bind(&version.created_by)
    .bind(version.created_at)
    .execute(conn)
    .await
    .context("Failed to insert schema version")?;
    Ok(())
}

#[async_trait::async_trait]
impl AssetTypeStore for PostgresStore {
    async fn get_asset_type(&self, id: &Id) -> Result<Option<AssetType>> {
        let row = sqlx::query(
            "SELECT id, name, description, created_at FROM asset_types WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch asset type")?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(AssetType {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            created_at: row.try_get("created_at")?,
        }))
    }

    async fn list_asset_types(&self) -> Result<Vec<AssetType>> {
        let rows = sqlx::query(
            "SELECT id, name, description, created_at FROM asset_types ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list asset types")?;

        rows.iter()
            .map(|row| {
                Ok(AssetType {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    description: row.try_get("description")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn insert_asset_type(&self, asset_type: AssetType) -> Result<()> {
        sqlx::query(
            "INSERT INTO asset_types (id, name, description, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(&asset_type.id)
        .bind(&asset_type.name)
        .bind(&asset_type.description)
        .bind(asset_type.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert asset type")?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl SchemaStore for PostgresStore {
    async fn get_schema(&self, id: &Id) -> Result<Option<Schema>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, version, asset_type_id, parent_schema_id,
                   allow_additional_fields, is_active, created_by, created_at
            FROM schemas WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch schema")?;

        row.as_ref().map(schema_from_row).transpose()
    }

    async fn list_schemas_for_asset_type(
        &self,
        asset_type_id: &Id,
        active_only: bool,
    ) -> Result<Vec<Schema>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, version, asset_type_id, parent_schema_id,
                   allow_additional_fields, is_active, created_by, created_at
            FROM schemas
            WHERE asset_type_id = $1 AND (NOT $2 OR is_active)
            ORDER BY version DESC
            "#,
        )
        .bind(asset_type_id)
        .bind(active_only)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list schemas")?;

        rows.iter().map(schema_from_row).collect()
    }

    async fn max_schema_version(&self, asset_type_id: &Id) -> Result<Option<i32>> {
        let row = sqlx::query("SELECT MAX(version) AS max FROM schemas WHERE asset_type_id = $1")
            .bind(asset_type_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to fetch max schema version")?;
        Ok(row.try_get("max")?)
    }
}

#[async_trait::async_trait]
impl FieldStore for PostgresStore {
    async fn get_active_field(&self, schema_id: &Id, name: &str) -> Result<Option<SchemaField>> {
        let row = sqlx::query(
            "SELECT * FROM schema_fields WHERE schema_id = $1 AND name = $2 AND state = 'active'",
        )
        .bind(schema_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch field")?;
        row.as_ref().map(field_from_row).transpose()
    }

    async fn get_deleted_field(&self, schema_id: &Id, name: &str) -> Result<Option<SchemaField>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM schema_fields
            WHERE schema_id = $1 AND name = $2 AND state = 'deleted'
            ORDER BY updated_at DESC LIMIT 1
            "#,
        )
        .bind(schema_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch deleted field")?;
        row.as_ref().map(field_from_row).transpose()
    }

    async fn get_field_by_id(&self, field_id: &Id) -> Result<Option<SchemaField>> {
        let row = sqlx::query("SELECT * FROM schema_fields WHERE id = $1")
            .bind(field_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch field by id")?;
        row.as_ref().map(field_from_row).transpose()
    }

    async fn list_fields(
        &self,
        schema_id: &Id,
        include_deleted: bool,
    ) -> Result<Vec<SchemaField>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM schema_fields
            WHERE schema_id = $1 AND ($2 OR state = 'active')
            ORDER BY order_index, created_at
            "#,
        )
        .bind(schema_id)
        .bind(include_deleted)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list fields")?;
        rows.iter().map(field_from_row).collect()
    }

    async fn max_order_index(&self, schema_id: &Id) -> Result<i32> {
        let row = sqlx::query(
            "SELECT COALESCE(MAX(order_index), 0) AS max FROM schema_fields WHERE schema_id = $1",
        )
        .bind(schema_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to fetch max order index")?;
        Ok(row.try_get("max")?)
    }
}

#[async_trait::async_trait]
impl RecordStore for PostgresStore {
    async fn count_records(&self, schema_id: &Id) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM records WHERE schema_id = $1")
            .bind(schema_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count records")?;
        let count: i64 = row.try_get("count")?;
        Ok(count as u64)
    }

    async fn list_record_ids(&self, schema_id: &Id) -> Result<Vec<Id>> {
        let rows = sqlx::query("SELECT id FROM records WHERE schema_id = $1 ORDER BY id")
            .bind(schema_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list record ids")?;
        rows.iter()
            .map(|row| Ok(row.try_get::<Id, _>("id")?))
            .collect()
    }

    async fn insert_record(&self, record: Record) -> Result<()> {
        sqlx::query("INSERT INTO records (id, schema_id, created_at) VALUES ($1, $2, $3)")
            .bind(&record.id)
            .bind(&record.schema_id)
            .bind(record.created_at)
            .execute(&self.pool)
            .await
            .context("Failed to insert record")?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ValueStore for PostgresStore {
    async fn get_value(&self, record_id: &Id, field_id: &Id) -> Result<Option<FieldValue>> {
        let row = sqlx::query("SELECT * FROM field_values WHERE record_id = $1 AND field_id = $2")
            .bind(record_id)
            .bind(field_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch field value")?;
        row.as_ref().map(value_from_row).transpose()
    }

    async fn list_values_for_field(
        &self,
        field_id: &Id,
        limit: Option<usize>,
    ) -> Result<Vec<FieldValue>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM field_values
            WHERE field_id = $1
            ORDER BY record_id
            LIMIT $2
            "#,
        )
        .bind(field_id)
        .bind(limit.map(|l| l as i64))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list field values")?;
        rows.iter().map(value_from_row).collect()
    }

    async fn count_values_for_field(&self, field_id: &Id) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM field_values WHERE field_id = $1")
            .bind(field_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count field values")?;
        let count: i64 = row.try_get("count")?;
        Ok(count as u64)
    }

    async fn count_non_null_values(&self, field_id: &Id) -> Result<u64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS count FROM field_values
            WHERE field_id = $1 AND (
                value_text IS NOT NULL OR value_int IS NOT NULL OR
                value_float IS NOT NULL OR value_bool IS NOT NULL OR
                value_date IS NOT NULL OR value_json IS NOT NULL
            )
            "#,
        )
        .bind(field_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to count non-null field values")?;
        let count: i64 = row.try_get("count")?;
        Ok(count as u64)
    }

    async fn upsert_value(&self, value: FieldValue) -> Result<()> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection")?;
        upsert_value_row(&mut conn, &value).await
    }
}

#[async_trait::async_trait]
impl VersionStore for PostgresStore {
    async fn get_version(
        &self,
        schema_id: &Id,
        version_number: i32,
    ) -> Result<Option<SchemaVersion>> {
        let row = sqlx::query(
            "SELECT * FROM schema_versions WHERE schema_id = $1 AND version_number = $2",
        )
        .bind(schema_id)
        .bind(version_number)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch schema version")?;
        row.as_ref().map(version_from_row).transpose()
    }

    async fn latest_version(&self, schema_id: &Id) -> Result<Option<SchemaVersion>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM schema_versions WHERE schema_id = $1
            ORDER BY version_number DESC LIMIT 1
            "#,
        )
        .bind(schema_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch latest schema version")?;
        row.as_ref().map(version_from_row).transpose()
    }

    async fn list_versions(&self, schema_id: &Id, limit: usize) -> Result<Vec<SchemaVersion>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM schema_versions WHERE schema_id = $1
            ORDER BY version_number DESC LIMIT $2
            "#,
        )
        .bind(schema_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list schema versions")?;
        rows.iter().map(version_from_row).collect()
    }

    async fn insert_version(&self, version: SchemaVersion) -> Result<()> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection")?;
        insert_version_row(&mut conn, &version).await
    }
}

#[async_trait::async_trait]
impl ChangeLogStore for PostgresStore {
    async fn list_change_log(&self, schema_id: &Id, limit: usize) -> Result<Vec<ChangeLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM change_logs WHERE schema_id = $1
            ORDER BY created_at DESC LIMIT $2
            "#,
        )
        .bind(schema_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list change log")?;
        rows.iter().map(log_from_row).collect()
    }
}

#[async_trait::async_trait]
impl MutationStore for PostgresStore {
    async fn apply_mutation(&self, mutation: SchemaMutation) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        if let Some(schema) = &mutation.new_schema {
            sqlx::query(
                r#"
                INSERT INTO schemas
                    (id, name, version, asset_type_id, parent_schema_id,
                     allow_additional_fields, is_active, created_by, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(&schema.id)
            .bind(&schema.name)
            .bind(schema.version)
            .bind(&schema.asset_type_id)
            .bind(&schema.parent_schema_id)
            .bind(schema.allow_additional_fields)
            .bind(schema.is_active)
            .bind(&schema.created_by)
            .bind(schema.created_at)
            .execute(tx.as_mut())
            .await
            .context("Failed to insert schema")?;
        }

        for write in &mutation.field_writes {
            match write {
                FieldWrite::Insert(field) => insert_field_row(tx.as_mut(), field).await?,
                FieldWrite::Update(field) => update_field_row(tx.as_mut(), field).await?,
                FieldWrite::SoftDelete { field_id } => {
                    set_field_state(tx.as_mut(), field_id, "deleted").await?
                }
                FieldWrite::Restore { field_id } => {
                    set_field_state(tx.as_mut(), field_id, "active").await?
                }
                FieldWrite::HardDelete { field_id } => {
                    // Values cascade via the FK.
                    let result = sqlx::query("DELETE FROM schema_fields WHERE id = $1")
                        .bind(field_id)
                        .execute(tx.as_mut())
                        .await
                        .context("Failed to delete schema field")?;
                    if result.rows_affected() == 0 {
                        return Err(anyhow!("field '{}' does not exist", field_id));
                    }
                }
            }
        }

        for value in &mutation.value_upserts {
            upsert_value_row(tx.as_mut(), value).await?;
        }

        let entry = &mutation.log_entry;
        let snapshot =
            serde_json::to_value(&entry.snapshot).context("Failed to encode log snapshot")?;
        sqlx::query(
            r#"
            INSERT INTO change_logs
                (id, schema_id, change_type, description, details, snapshot, changed_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.schema_id)
        .bind(entry.change_type.as_str())
        .bind(&entry.description)
        .bind(&entry.details)
        .bind(snapshot)
        .bind(&entry.changed_by)
        .bind(entry.created_at)
        .execute(tx.as_mut())
        .await
        .context("Failed to insert change log entry")?;

        if let Some(version) = &mutation.version {
            insert_version_row(tx.as_mut(), version).await?;
        }

        tx.commit().await.context("Failed to commit mutation")?;
        Ok(())
    }
}
