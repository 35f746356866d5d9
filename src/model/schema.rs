use crate::model::{generate_id, FieldType, Id};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named category of records (e.g. "Image"). Owns zero or more schemas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetType {
    pub id: Id,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AssetType {
    pub fn new(name: String, description: Option<String>) -> Self {
        Self {
            id: generate_id(),
            name,
            description,
            created_at: Utc::now(),
        }
    }
}

/// Versioned field-set definition bound to exactly one asset type.
///
/// A schema row is created once and then mutated in place; structural history
/// lives in the append-only `SchemaVersion` log, not in new schema rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub id: Id,
    pub name: String,
    /// Monotonic per asset type, allocated at creation and never changed.
    pub version: i32,
    pub asset_type_id: Id,
    /// Fork lineage: the schema this one was copied from, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_schema_id: Option<Id>,
    pub allow_additional_fields: bool,
    pub is_active: bool,
    pub created_by: Id,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle state of a field within its schema.
///
/// `Active -> Deleted` via remove, `Deleted -> Active` via rollback restore,
/// `Deleted -> absent` via permanent delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldState {
    Active,
    Deleted,
}

impl FieldState {
    pub fn is_deleted(&self) -> bool {
        matches!(self, FieldState::Deleted)
    }
}

/// Structured constraints attached to a field definition.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldConstraints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<serde_json::Value>>,
}

impl FieldConstraints {
    pub fn is_empty(&self) -> bool {
        self.min.is_none()
            && self.max.is_none()
            && self.min_length.is_none()
            && self.max_length.is_none()
            && self.regex.is_none()
            && self.enum_values.is_none()
    }
}

/// One named, typed attribute of a schema.
///
/// `(schema_id, name)` is unique among active fields only: a soft-deleted
/// field's name may be reused, but at most one field with a given name is
/// active at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    pub id: Id,
    pub schema_id: Id,
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    /// String-encoded default, coerced through the value codec when applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraints: Option<FieldConstraints>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub order_index: i32,
    pub state: FieldState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SchemaField {
    pub fn from_spec(schema_id: Id, spec: &FieldSpec, order_index: i32) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            schema_id,
            name: spec.name.clone(),
            field_type: spec.field_type,
            required: spec.required,
            default_value: spec.default.clone(),
            constraints: spec.constraints.clone(),
            description: spec.description.clone(),
            order_index,
            state: FieldState::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.state.is_deleted()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Incoming field definition, as supplied by external callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<FieldConstraints>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            default: None,
            constraints: None,
            description: None,
        }
    }

    pub fn required(mut self, default: Option<&str>) -> Self {
        self.required = true;
        self.default = default.map(str::to_string);
        self
    }

    pub fn with_constraints(mut self, constraints: FieldConstraints) -> Self {
        self.constraints = Some(constraints);
        self
    }
}

/// Create-schema request payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSchema {
    pub name: String,
    pub asset_type_id: Id,
    pub fields: Vec<FieldSpec>,
    #[serde(default = "default_allow_additional")]
    pub allow_additional_fields: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_schema_id: Option<Id>,
}

fn default_allow_additional() -> bool {
    true
}

/// Optional field adjustments applied while forking a schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForkModifications {
    #[serde(default)]
    pub add_fields: Vec<FieldSpec>,
    #[serde(default)]
    pub remove_fields: Vec<String>,
}

/// A schema together with its (ordered) fields, the shape most read paths
/// hand back to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDetails {
    #[serde(flatten)]
    pub schema: Schema,
    pub fields: Vec<SchemaField>,
}

impl SchemaDetails {
    pub fn active_field(&self, name: &str) -> Option<&SchemaField> {
        self.fields
            .iter()
            .find(|f| f.is_active() && f.name == name)
    }
}

/// A record row, referenced by the EAV layer but owned by the record
/// read/write paths outside this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: Id,
    pub schema_id: Id,
    pub created_at: DateTime<Utc>,
}

impl Record {
    pub fn new(schema_id: Id) -> Self {
        Self {
            id: generate_id(),
            schema_id,
            created_at: Utc::now(),
        }
    }
}

/// Usage statistics for one schema, served from the catalog with a short TTL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaStatistics {
    pub schema_id: Id,
    pub record_count: u64,
    pub field_count: usize,
    pub computed_at: DateTime<Utc>,
}
